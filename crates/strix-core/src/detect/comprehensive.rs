//! Rule-and-statistics detector covering HTTP errors, performance,
//! resources, and suspicious traffic.
//!
//! Runs four independent passes per event against its own rolling state,
//! then reports the dominant finding: the highest-scoring critical one, or
//! the highest-scoring overall. Per-IP and per-endpoint tables are bounded
//! by the scored-eviction tracker.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::alert::AlertLevel;
use crate::detect::tracker::{BoundedTracker, TrackerConfig};
use crate::event::Event;
use crate::stats;

const RESPONSE_TIME_RING: usize = 1000;
const STATUS_CODE_RING: usize = 1000;
const RPS_RING: usize = 100;
const ERROR_RATE_RING: usize = 100;
const CPU_RING: usize = 500;
const MEMORY_RING: usize = 500;
const ENDPOINT_RT_RING: usize = 100;
const IP_REQUEST_RING: usize = 100;
const MAX_TRACKED_IPS: usize = 10_000;
const MAX_TRACKED_ENDPOINTS: usize = 1_000;

/// One firing rule.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyFinding {
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub anomaly_type: String,
    pub severity: AlertLevel,
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

fn finding(score: f64, kind: &str, severity: AlertLevel, context: Value) -> AnomalyFinding {
    AnomalyFinding {
        is_anomaly: true,
        anomaly_score: score,
        anomaly_type: kind.to_string(),
        severity,
        context: context.as_object().cloned().unwrap_or_default(),
    }
}

/// Aggregated result of the four passes.
#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveReport {
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub anomaly_type: String,
    pub severity: AlertLevel,
    pub details: Option<AnomalyFinding>,
    pub all_anomalies: Vec<AnomalyFinding>,
    pub anomaly_count: usize,
}

impl ComprehensiveReport {
    fn normal() -> Self {
        Self {
            is_anomaly: false,
            anomaly_score: 0.0,
            anomaly_type: "normal".to_string(),
            severity: AlertLevel::Info,
            details: None,
            all_anomalies: Vec::new(),
            anomaly_count: 0,
        }
    }
}

#[derive(Debug, Default)]
struct EndpointStats {
    count: u64,
    error_count: u64,
    response_times: VecDeque<f64>,
    last_seen: Option<String>,
}

#[derive(Debug, Default)]
struct IpStats {
    count: u64,
    endpoints: HashSet<String>,
    user_agents: HashSet<String>,
    last_seen: Option<String>,
    /// Epoch seconds of recent requests from this IP.
    request_epochs: VecDeque<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveStats {
    pub response_time_samples: usize,
    pub status_code_samples: usize,
    pub rps_samples: usize,
    pub error_rate_samples: usize,
    pub cpu_samples: usize,
    pub memory_samples: usize,
    pub tracked_ips: usize,
    pub tracked_endpoints: usize,
    pub ip_evictions: u64,
}

pub struct ComprehensiveDetector {
    response_time_history: VecDeque<f64>,
    status_code_history: VecDeque<i64>,
    rps_history: VecDeque<f64>,
    error_rate_history: VecDeque<f64>,
    cpu_history: VecDeque<f64>,
    memory_history: VecDeque<f64>,
    endpoint_stats: BoundedTracker<EndpointStats>,
    ip_requests: BoundedTracker<IpStats>,
}

impl Default for ComprehensiveDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ComprehensiveDetector {
    pub fn new() -> Self {
        Self {
            response_time_history: VecDeque::with_capacity(RESPONSE_TIME_RING),
            status_code_history: VecDeque::with_capacity(STATUS_CODE_RING),
            rps_history: VecDeque::with_capacity(RPS_RING),
            error_rate_history: VecDeque::with_capacity(ERROR_RATE_RING),
            cpu_history: VecDeque::with_capacity(CPU_RING),
            memory_history: VecDeque::with_capacity(MEMORY_RING),
            endpoint_stats: BoundedTracker::new(TrackerConfig {
                max_entries: MAX_TRACKED_ENDPOINTS,
                min_events_for_eviction: 5,
            }),
            ip_requests: BoundedTracker::new(TrackerConfig {
                max_entries: MAX_TRACKED_IPS,
                min_events_for_eviction: 5,
            }),
        }
    }

    // ------------------------------------------------------------------
    // (a) HTTP errors
    // ------------------------------------------------------------------

    /// 5xx is critical with score 1.0; 429 warns at 0.7; other 4xx at 0.5.
    pub fn detect_http_errors(&self, event: &Event) -> Option<AnomalyFinding> {
        let status_code = event.status_or_200();

        if status_code >= 500 {
            let error_message = match status_code {
                500 => "Internal Server Error".to_string(),
                501 => "Not Implemented".to_string(),
                502 => "Bad Gateway".to_string(),
                503 => "Service Unavailable".to_string(),
                504 => "Gateway Timeout".to_string(),
                505 => "HTTP Version Not Supported".to_string(),
                other => format!("Server Error {}", other),
            };
            return Some(finding(
                1.0,
                "http_server_error",
                AlertLevel::Critical,
                json!({
                    "status_code": status_code,
                    "error_message": error_message,
                    "endpoint": event.endpoint_or_unknown(),
                    "timestamp": event.timestamp.clone().unwrap_or_default(),
                }),
            ));
        }

        if status_code >= 400 {
            let error_message = match status_code {
                400 => "Bad Request".to_string(),
                401 => "Unauthorized".to_string(),
                403 => "Forbidden".to_string(),
                404 => "Not Found".to_string(),
                408 => "Request Timeout".to_string(),
                429 => "Too Many Requests".to_string(),
                other => format!("Client Error {}", other),
            };
            let score = if status_code == 429 { 0.7 } else { 0.5 };
            return Some(finding(
                score,
                "http_client_error",
                AlertLevel::Warning,
                json!({
                    "status_code": status_code,
                    "error_message": error_message,
                    "endpoint": event.endpoint_or_unknown(),
                    "timestamp": event.timestamp.clone().unwrap_or_default(),
                }),
            ));
        }

        None
    }

    // ------------------------------------------------------------------
    // (b) Performance
    // ------------------------------------------------------------------

    pub fn detect_performance_anomalies(
        &mut self,
        event: &Event,
        recent_events: &[Event],
    ) -> Vec<AnomalyFinding> {
        let mut anomalies = Vec::new();

        // Response-time spike and tail-latency blowup.
        if let Some(response_time) = event.response_time.filter(|rt| *rt > 0.0) {
            push_bounded(&mut self.response_time_history, response_time, RESPONSE_TIME_RING);

            if self.response_time_history.len() >= 10 {
                let history: Vec<f64> = self.response_time_history.iter().copied().collect();
                let recent_avg = stats::mean(&history[history.len() - 10..]);
                let historical_avg = if history.len() > 10 {
                    stats::mean(&history[..history.len() - 10])
                } else {
                    recent_avg
                };

                if historical_avg > 0.0 && recent_avg > historical_avg * 2.0 {
                    let increase_ratio = recent_avg / historical_avg;
                    anomalies.push(finding(
                        ((increase_ratio - 1.0) * 0.5).min(1.0),
                        "response_time_spike",
                        AlertLevel::Warning,
                        json!({
                            "current_avg": recent_avg,
                            "historical_avg": historical_avg,
                            "increase_ratio": increase_ratio,
                        }),
                    ));
                }

                if history.len() >= 20 {
                    let p95 = stats::percentile(&history, 95.0);
                    let p99 = stats::percentile(&history, 99.0);
                    if p99 > historical_avg * 3.0 {
                        anomalies.push(finding(
                            0.9,
                            "p99_latency_spike",
                            AlertLevel::Critical,
                            json!({ "p99": p99, "p95": p95, "avg": historical_avg }),
                        ));
                    }
                }
            }
        }

        // Request-rate spike / collapse from the last 10 events' span.
        if recent_events.len() >= 10 {
            let last10 = &recent_events[recent_events.len() - 10..];
            let first = last10.first().and_then(Event::epoch_seconds);
            let last = last10.last().and_then(Event::epoch_seconds);

            if let (Some(first), Some(last)) = (first, last) {
                let time_span = last - first;
                if time_span > 0.0 {
                    let current_rps = last10.len() as f64 / time_span;
                    push_bounded(&mut self.rps_history, current_rps, RPS_RING);

                    if self.rps_history.len() >= 5 {
                        let history: Vec<f64> = self.rps_history.iter().copied().collect();
                        let recent_rps = stats::mean(&history[history.len() - 3..]);
                        let historical_rps = stats::mean(&history[..history.len() - 3]);

                        if historical_rps > 0.0 && recent_rps > historical_rps * 2.0 {
                            anomalies.push(finding(
                                ((recent_rps / historical_rps - 1.0) * 0.3).min(1.0),
                                "rps_spike",
                                AlertLevel::Warning,
                                json!({
                                    "current_rps": recent_rps,
                                    "historical_rps": historical_rps,
                                }),
                            ));
                        } else if historical_rps > 0.0 && recent_rps < historical_rps * 0.3 {
                            anomalies.push(finding(
                                0.8,
                                "rps_drop",
                                AlertLevel::Critical,
                                json!({
                                    "current_rps": recent_rps,
                                    "historical_rps": historical_rps,
                                }),
                            ));
                        }
                    }
                }
            }
        }

        // Error-rate surge over the recent window.
        if recent_events.len() >= 10 {
            let error_count = recent_events
                .iter()
                .filter(|e| e.status_or_200() >= 400)
                .count();
            let current_error_rate = error_count as f64 / recent_events.len() as f64;
            push_bounded(&mut self.error_rate_history, current_error_rate, ERROR_RATE_RING);

            if self.error_rate_history.len() >= 5 {
                let history: Vec<f64> = self.error_rate_history.iter().copied().collect();
                let recent_rate = stats::mean(&history[history.len() - 3..]);
                let historical_rate = stats::mean(&history[..history.len() - 3]);

                if historical_rate < 0.1 && recent_rate > 0.2 {
                    let severity = if recent_rate > 0.5 {
                        AlertLevel::Critical
                    } else {
                        AlertLevel::Warning
                    };
                    anomalies.push(finding(
                        (recent_rate * 2.0).min(1.0),
                        "error_rate_spike",
                        severity,
                        json!({
                            "current_error_rate": recent_rate,
                            "historical_error_rate": historical_rate,
                        }),
                    ));
                }
            }
        }

        anomalies
    }

    // ------------------------------------------------------------------
    // (c) Resources
    // ------------------------------------------------------------------

    pub fn detect_resource_anomalies(&mut self, event: &Event) -> Vec<AnomalyFinding> {
        let mut anomalies = Vec::new();

        if let Some(cpu) = event.cpu_usage.filter(|v| *v > 0.0) {
            push_bounded(&mut self.cpu_history, cpu, CPU_RING);

            if self.cpu_history.len() >= 5 {
                let history: Vec<f64> = self.cpu_history.iter().copied().collect();
                let recent_avg = stats::mean(&history[history.len() - 3..]);
                let historical_avg = stats::mean(&history[..history.len() - 3]);

                if recent_avg > historical_avg * 1.5 && recent_avg > 70.0 {
                    let severity = if recent_avg < 90.0 {
                        AlertLevel::Warning
                    } else {
                        AlertLevel::Critical
                    };
                    anomalies.push(finding(
                        ((recent_avg - 70.0) / 30.0).min(1.0),
                        "cpu_spike",
                        severity,
                        json!({ "current_cpu": recent_avg, "historical_cpu": historical_avg }),
                    ));
                }

                if recent_avg >= 95.0 {
                    anomalies.push(finding(
                        1.0,
                        "cpu_saturated",
                        AlertLevel::Critical,
                        json!({ "cpu_usage": recent_avg }),
                    ));
                }
            }
        }

        if let Some(memory) = event.memory_usage.filter(|v| *v > 0.0) {
            push_bounded(&mut self.memory_history, memory, MEMORY_RING);

            if self.memory_history.len() >= 10 {
                let history: Vec<f64> = self.memory_history.iter().copied().collect();
                let recent_avg = stats::mean(&history[history.len() - 5..]);
                let historical_avg = stats::mean(&history[..history.len() - 5]);

                if recent_avg > historical_avg * 1.2 && recent_avg > 80.0 {
                    let severity = if recent_avg < 90.0 {
                        AlertLevel::Warning
                    } else {
                        AlertLevel::Critical
                    };
                    anomalies.push(finding(
                        ((recent_avg - 80.0) / 20.0).min(1.0),
                        "memory_leak",
                        severity,
                        json!({
                            "current_memory": recent_avg,
                            "historical_memory": historical_avg,
                        }),
                    ));
                }

                if recent_avg >= 95.0 {
                    anomalies.push(finding(
                        1.0,
                        "oom_imminent",
                        AlertLevel::Critical,
                        json!({ "memory_usage": recent_avg }),
                    ));
                }
            }
        }

        anomalies
    }

    // ------------------------------------------------------------------
    // (d) Security
    // ------------------------------------------------------------------

    pub fn detect_security_anomalies(
        &mut self,
        event: &Event,
        recent_events: &[Event],
    ) -> Vec<AnomalyFinding> {
        let mut anomalies = Vec::new();

        let ip = event.ip.as_deref().unwrap_or("unknown");
        if ip != "unknown" {
            let endpoint = event.endpoint_or_unknown().to_string();
            let user_agent = event.user_agent.as_deref().unwrap_or("unknown").to_string();
            let epoch = event.epoch_seconds();

            let ip_data = self.ip_requests.get_or_create(ip, IpStats::default);
            ip_data.count += 1;
            ip_data.endpoints.insert(endpoint);
            ip_data.user_agents.insert(user_agent);
            ip_data.last_seen = Some(Event::now_string());
            if let Some(epoch) = epoch {
                push_bounded(&mut ip_data.request_epochs, epoch, IP_REQUEST_RING);
            }

            let count = ip_data.count;
            let endpoints_accessed = ip_data.endpoints.len();

            if count > 50 {
                anomalies.push(finding(
                    (count as f64 / 100.0).min(1.0),
                    "suspicious_ip_activity",
                    AlertLevel::Warning,
                    json!({
                        "ip": ip,
                        "request_count": count,
                        "endpoints_accessed": endpoints_accessed,
                        "description": "excessive requests from a single IP",
                    }),
                ));
            }

            if ip_data.request_epochs.len() >= 10 {
                let epochs: Vec<f64> = ip_data.request_epochs.iter().copied().collect();
                let last10 = &epochs[epochs.len() - 10..];
                let time_span = last10[last10.len() - 1] - last10[0];

                if time_span > 0.0 && time_span < 10.0 {
                    let rps = 10.0 / time_span;
                    if rps > 5.0 {
                        anomalies.push(finding(
                            (rps / 10.0).min(1.0),
                            "rapid_request_pattern",
                            AlertLevel::Warning,
                            json!({
                                "ip": ip,
                                "rps": rps,
                                "description": "tight repeated-request pattern",
                            }),
                        ));
                    }
                }
            }
        }

        // Concentrated load on one endpoint within the last 50 events.
        let mut endpoint_counts: HashMap<&str, usize> = HashMap::new();
        let tail = &recent_events[recent_events.len().saturating_sub(50)..];
        for e in tail {
            *endpoint_counts.entry(e.endpoint_or_unknown()).or_insert(0) += 1;
        }
        for (endpoint, count) in endpoint_counts {
            if count > 30 {
                anomalies.push(finding(
                    (count as f64 / 50.0).min(1.0),
                    "endpoint_attack",
                    AlertLevel::Warning,
                    json!({
                        "endpoint": endpoint,
                        "request_count": count,
                        "description": "suspected focused load on one endpoint",
                    }),
                ));
            }
        }

        anomalies
    }

    // ------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------

    /// Run all four passes and pick the dominant finding: the
    /// highest-scoring critical one when any pass went critical, otherwise
    /// the highest-scoring finding of any severity.
    pub fn detect(&mut self, event: &Event, recent_events: &[Event]) -> ComprehensiveReport {
        self.update_endpoint_stats(event);
        push_bounded(&mut self.status_code_history, event.status_or_200(), STATUS_CODE_RING);

        let mut all_anomalies = Vec::new();
        if let Some(http_error) = self.detect_http_errors(event) {
            all_anomalies.push(http_error);
        }
        all_anomalies.extend(self.detect_performance_anomalies(event, recent_events));
        all_anomalies.extend(self.detect_resource_anomalies(event));
        all_anomalies.extend(self.detect_security_anomalies(event, recent_events));

        if all_anomalies.is_empty() {
            return ComprehensiveReport::normal();
        }

        let dominant = all_anomalies
            .iter()
            .filter(|a| a.severity == AlertLevel::Critical)
            .max_by(|a, b| a.anomaly_score.total_cmp(&b.anomaly_score))
            .or_else(|| {
                all_anomalies
                    .iter()
                    .max_by(|a, b| a.anomaly_score.total_cmp(&b.anomaly_score))
            })
            .cloned()
            .expect("non-empty anomaly list");

        ComprehensiveReport {
            is_anomaly: true,
            anomaly_score: dominant.anomaly_score,
            anomaly_type: dominant.anomaly_type.clone(),
            severity: dominant.severity,
            details: Some(dominant),
            anomaly_count: all_anomalies.len(),
            all_anomalies,
        }
    }

    fn update_endpoint_stats(&mut self, event: &Event) {
        let endpoint = event.endpoint_or_unknown().to_string();
        let is_error = event.status_or_200() >= 400;
        let response_time = event.response_time;
        let timestamp = event.timestamp.clone();

        let entry = self.endpoint_stats.get_or_create(&endpoint, EndpointStats::default);
        entry.count += 1;
        if is_error {
            entry.error_count += 1;
        }
        if let Some(rt) = response_time {
            push_bounded(&mut entry.response_times, rt, ENDPOINT_RT_RING);
        }
        entry.last_seen = timestamp;
    }

    pub fn stats(&self) -> ComprehensiveStats {
        ComprehensiveStats {
            response_time_samples: self.response_time_history.len(),
            status_code_samples: self.status_code_history.len(),
            rps_samples: self.rps_history.len(),
            error_rate_samples: self.error_rate_history.len(),
            cpu_samples: self.cpu_history.len(),
            memory_samples: self.memory_history.len(),
            tracked_ips: self.ip_requests.len(),
            tracked_endpoints: self.endpoint_stats.len(),
            ip_evictions: self.ip_requests.evictions(),
        }
    }

    pub fn reset(&mut self) {
        self.response_time_history.clear();
        self.status_code_history.clear();
        self.rps_history.clear();
        self.error_rate_history.clear();
        self.cpu_history.clear();
        self.memory_history.clear();
        self.endpoint_stats.clear();
        self.ip_requests.clear();
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, value: T, capacity: usize) {
    if ring.len() == capacity {
        ring.pop_front();
    }
    ring.push_back(value);
}
