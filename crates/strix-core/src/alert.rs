//! Alert creation, deduplication and storage.
//!
//! Detection results become alerts behind a threshold gate, except for HTTP
//! error status codes which short-circuit straight to an alert. Alerts live
//! in a bounded ring; a smaller ring of recent fingerprints suppresses
//! repeats.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::AlertConfig;
use crate::detect::Detection;
use crate::event::Event;

/// Recent fingerprints kept for duplicate suppression.
const FINGERPRINT_RING: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub details: Value,
    pub timestamp: String,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertStats {
    pub total_alerts: usize,
    pub level_counts: HashMap<String, usize>,
    pub unacknowledged: usize,
    pub alert_threshold: f64,
}

pub struct AlertManager {
    max_alerts: usize,
    alert_threshold: f64,
    alerts: VecDeque<Alert>,
    recent_fingerprints: VecDeque<u64>,
}

impl AlertManager {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            max_alerts: config.max_alerts.max(1),
            alert_threshold: config.threshold,
            alerts: VecDeque::with_capacity(config.max_alerts.max(1)),
            recent_fingerprints: VecDeque::with_capacity(FINGERPRINT_RING),
        }
    }

    /// Convert a detection result (and the event that produced it) into an
    /// alert. Returns the stored alert, or `None` when gated or suppressed.
    pub fn create_alert(&mut self, detection: &Detection, event: Option<&Event>) -> Option<Alert> {
        let mut is_anomaly = detection.is_anomaly;
        let mut anomaly_score = detection.anomaly_score;

        // HTTP error codes alert unconditionally.
        let is_http_error = event.map(|e| e.status_or_200() >= 400).unwrap_or(false);
        if is_http_error {
            is_anomaly = true;
            anomaly_score = if event.map(|e| e.status_or_200()).unwrap_or(200) >= 500 {
                1.0
            } else {
                0.8
            };
        }

        if !is_http_error && (!is_anomaly || anomaly_score < self.alert_threshold) {
            return None;
        }

        let message = self.build_message(detection, event, anomaly_score);
        let level = Self::determine_level(anomaly_score, is_anomaly);

        let mut details = json!({
            "anomaly_score": anomaly_score,
            "is_anomaly": is_anomaly,
            "method": detection.method,
            "detection_details": detection.details,
        });
        if let Some(event) = event {
            details["event"] = json!({
                "endpoint": event.endpoint_or_unknown(),
                "status_code": event.status_code,
                "timestamp": event.timestamp,
            });
        }

        let fingerprint = Self::fingerprint(&message, is_anomaly, anomaly_score);
        if self.recent_fingerprints.contains(&fingerprint) {
            debug!(message = %message, "duplicate alert suppressed");
            return None;
        }

        let alert = Alert {
            level,
            message: message.clone(),
            details,
            timestamp: Event::now_string(),
            acknowledged: false,
        };

        if self.alerts.len() == self.max_alerts {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert.clone());

        if self.recent_fingerprints.len() == FINGERPRINT_RING {
            self.recent_fingerprints.pop_front();
        }
        self.recent_fingerprints.push_back(fingerprint);

        info!(level = level.as_str(), message = %message, "alert created");
        Some(alert)
    }

    /// `message | is_anomaly | score(2dp)`, hashed.
    fn fingerprint(message: &str, is_anomaly: bool, anomaly_score: f64) -> u64 {
        let key = format!("{}|{}|{:.2}", message, is_anomaly, anomaly_score);
        xxh3_64(key.as_bytes())
    }

    fn determine_level(anomaly_score: f64, is_anomaly: bool) -> AlertLevel {
        if !is_anomaly {
            return AlertLevel::Info;
        }
        if anomaly_score >= 0.9 {
            AlertLevel::Critical
        } else if anomaly_score >= 0.7 {
            AlertLevel::Warning
        } else {
            AlertLevel::Info
        }
    }

    fn build_message(
        &self,
        detection: &Detection,
        event: Option<&Event>,
        anomaly_score: f64,
    ) -> String {
        if let Some(event) = event {
            let status_code = event.status_or_200();
            if status_code >= 400 {
                let status_msg = match status_code {
                    400 => "Bad Request".to_string(),
                    401 => "Unauthorized".to_string(),
                    403 => "Forbidden".to_string(),
                    404 => "Not Found".to_string(),
                    408 => "Request Timeout".to_string(),
                    418 => "I'm a teapot".to_string(),
                    429 => "Too Many Requests".to_string(),
                    500 => "Internal Server Error".to_string(),
                    502 => "Bad Gateway".to_string(),
                    503 => "Service Unavailable".to_string(),
                    504 => "Gateway Timeout".to_string(),
                    other => format!("HTTP {}", other),
                };
                return format!(
                    "[{}] HTTP 에러 발생: {} {}",
                    event.endpoint_or_unknown(),
                    status_code,
                    status_msg
                );
            }
        }

        let mut message = format!(
            "이상 탐지됨 (점수: {:.2}, 방법: {})",
            anomaly_score, detection.method
        );

        if let Some(event) = event {
            let status = event
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            message = format!(
                "[{}] {} (상태: {})",
                event.endpoint_or_unknown(),
                message,
                status
            );
        }

        let changepoint = &detection.details["changepoint"];
        if changepoint["has_changepoint"].as_bool() == Some(true) {
            let kind = changepoint["changepoint_type"]
                .as_str()
                .unwrap_or("unknown");
            message.push_str(&format!(" | 변화점: {}", kind));
        }

        message
    }

    /// Last `count` alerts in arrival order, optionally filtered by level.
    pub fn get_recent_alerts(&self, count: usize, level: Option<AlertLevel>) -> Vec<Alert> {
        let filtered: Vec<&Alert> = self
            .alerts
            .iter()
            .filter(|a| level.map(|l| a.level == l).unwrap_or(true))
            .collect();
        filtered
            .iter()
            .skip(filtered.len().saturating_sub(count))
            .map(|a| (*a).clone())
            .collect()
    }

    /// Acknowledge an alert by index from the newest (0 = most recent).
    pub fn acknowledge_alert(&mut self, index: usize) -> bool {
        let len = self.alerts.len();
        if index >= len {
            return false;
        }
        if let Some(alert) = self.alerts.get_mut(len - 1 - index) {
            alert.acknowledged = true;
            info!(index, "alert acknowledged");
            return true;
        }
        false
    }

    pub fn get_stats(&self) -> AlertStats {
        let mut level_counts: HashMap<String, usize> = HashMap::new();
        for alert in &self.alerts {
            *level_counts.entry(alert.level.as_str().to_string()).or_insert(0) += 1;
        }
        AlertStats {
            total_alerts: self.alerts.len(),
            level_counts,
            unacknowledged: self.alerts.iter().filter(|a| !a.acknowledged).count(),
            alert_threshold: self.alert_threshold,
        }
    }

    /// Drop alerts of one level, or everything (fingerprints included) when
    /// `level` is `None`.
    pub fn clear_alerts(&mut self, level: Option<AlertLevel>) {
        match level {
            Some(level) => self.alerts.retain(|a| a.level != level),
            None => {
                self.alerts.clear();
                self.recent_fingerprints.clear();
            }
        }
        info!(level = level.map(|l| l.as_str()).unwrap_or("all"), "alerts cleared");
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
