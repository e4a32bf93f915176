//! strixd: pipeline daemon with the dashboard status/control API.
//!
//! Loads the YAML configuration (fatal when missing), starts the pipeline,
//! and serves:
//! - GET  /health           liveness probe
//! - GET  /metrics          Prometheus text format
//! - GET  /stats            pipeline + detector + alert statistics
//! - GET  /alerts           recent alerts (`?count=50&level=critical`)
//! - GET  /events/recent    recent events (`?count=100`)
//! - POST /control/start    resume ingestion and processing
//! - POST /control/stop     cooperative stop, buffers preserved
//! - POST /control/reset    clear buffers and training state (stopped only)

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use strix_core::alert::AlertLevel;
use strix_core::metrics;
use strix_core::{AppConfig, Pipeline};

#[derive(Parser)]
#[command(name = "strixd")]
#[command(about = "Real-time telemetry anomaly-detection daemon")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "configs/config.yaml")]
    config: String,

    /// Override the dashboard API bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,

    /// Load the config but do not start the pipeline until /control/start
    #[arg(long)]
    paused: bool,
}

struct AppShared {
    pipeline: Mutex<Pipeline>,
}

#[derive(Deserialize)]
struct AlertsQuery {
    count: Option<usize>,
    level: Option<String>,
}

#[derive(Deserialize)]
struct EventsQuery {
    count: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log.clone())),
        )
        .init();

    info!("initializing strixd");
    metrics::init();

    let config = match AppConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration is required at startup");
            std::process::exit(1);
        }
    };

    let bind = cli.bind.unwrap_or_else(|| config.dashboard.bind.clone());
    let mut pipeline = Pipeline::new(config);

    if !cli.paused {
        if let Err(e) = pipeline.start() {
            error!(error = %e, "failed to start pipeline");
            std::process::exit(1);
        }
    }

    let shared = Arc::new(AppShared {
        pipeline: Mutex::new(pipeline),
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(stats_handler))
        .route("/alerts", get(alerts_handler))
        .route("/events/recent", get(events_handler))
        .route("/control/start", post(start_handler))
        .route("/control/stop", post(stop_handler))
        .route("/control/reset", post(reset_handler))
        .with_state(shared.clone());

    let listener = match TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %bind, error = %e, "failed to bind dashboard API");
            std::process::exit(1);
        }
    };
    info!(addr = %bind, "dashboard API listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await;
    if let Err(e) = serve_result {
        error!(error = %e, "server error");
    }

    shared
        .pipeline
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .stop();
    info!("pipeline drained, goodbye");
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn metrics_handler() -> String {
    metrics::render()
}

async fn stats_handler(State(shared): State<Arc<AppShared>>) -> Json<Value> {
    let pipeline = shared.pipeline.lock().unwrap_or_else(|p| p.into_inner());
    Json(json!(pipeline.stats()))
}

async fn alerts_handler(
    State(shared): State<Arc<AppShared>>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let level = match query.level.as_deref() {
        None => None,
        Some("info") => Some(AlertLevel::Info),
        Some("warning") => Some(AlertLevel::Warning),
        Some("critical") => Some(AlertLevel::Critical),
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("unknown alert level: {}", other),
            ))
        }
    };

    let core = {
        let pipeline = shared.pipeline.lock().unwrap_or_else(|p| p.into_inner());
        pipeline.core()
    };
    let core = core.lock().unwrap_or_else(|p| p.into_inner());
    let alerts = core.alerts().get_recent_alerts(query.count.unwrap_or(50), level);
    Ok(Json(json!(alerts)))
}

async fn events_handler(
    State(shared): State<Arc<AppShared>>,
    Query(query): Query<EventsQuery>,
) -> Json<Value> {
    let core = {
        let pipeline = shared.pipeline.lock().unwrap_or_else(|p| p.into_inner());
        pipeline.core()
    };
    let core = core.lock().unwrap_or_else(|p| p.into_inner());
    let events = core.window().get_recent_events(Some(query.count.unwrap_or(100)));
    Json(json!(events))
}

async fn start_handler(
    State(shared): State<Arc<AppShared>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let mut pipeline = shared.pipeline.lock().unwrap_or_else(|p| p.into_inner());
    pipeline
        .start()
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok(Json(json!({ "status": "started" })))
}

async fn stop_handler(State(shared): State<Arc<AppShared>>) -> Json<Value> {
    let mut pipeline = shared.pipeline.lock().unwrap_or_else(|p| p.into_inner());
    pipeline.stop();
    Json(json!({ "status": "stopped" }))
}

async fn reset_handler(
    State(shared): State<Arc<AppShared>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let mut pipeline = shared.pipeline.lock().unwrap_or_else(|p| p.into_inner());
    pipeline
        .reset()
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok(Json(json!({ "status": "reset" })))
}
