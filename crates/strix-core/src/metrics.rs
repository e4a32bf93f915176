//! Prometheus metrics for the pipeline and ingest paths.

use once_cell::sync::Lazy;
use prometheus::{Counter, Encoder, Gauge, Histogram, TextEncoder};

pub static INGEST_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("strix_ingest_total", "Total events ingested").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static DROPPED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new(
        "strix_dropped_total",
        "Total events dropped due to backpressure",
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static MALFORMED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new(
        "strix_malformed_total",
        "Total malformed ingest payloads skipped",
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ANOMALY_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("strix_anomalies_total", "Total anomalies detected").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ALERTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    let c = Counter::new("strix_alerts_total", "Total alerts emitted").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static PROCESSING_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(prometheus::HistogramOpts::new(
        "strix_processing_duration_seconds",
        "Histogram of per-event processing latency",
    ))
    .unwrap();
    prometheus::register(Box::new(h.clone())).unwrap();
    h
});

pub static WINDOW_EVENTS: Lazy<Gauge> = Lazy::new(|| {
    let g = Gauge::new("strix_window_events", "Events held in the main window").unwrap();
    prometheus::register(Box::new(g.clone())).unwrap();
    g
});

/// Force-initialize every metric so they show up before first use.
pub fn init() {
    let _ = &*INGEST_TOTAL;
    let _ = &*DROPPED_TOTAL;
    let _ = &*MALFORMED_TOTAL;
    let _ = &*ANOMALY_TOTAL;
    let _ = &*ALERTS_TOTAL;
    let _ = &*PROCESSING_LATENCY;
    let _ = &*WINDOW_EVENTS;
}

/// Render the registry in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
