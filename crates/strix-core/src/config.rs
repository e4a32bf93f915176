//! Typed configuration.
//!
//! One YAML document with `stream`, `anomaly`, `alert`, `window` and
//! `dashboard` sections. Everything defaults so partial files work; a
//! missing file is fatal at daemon startup. Configuration is loaded once
//! and passed by handle to each constructor.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub anomaly: AnomalyConfig,
    pub alert: AlertConfig,
    pub window: WindowConfig,
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }
}

// ============================================================================
// STREAM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Mock,
    Socket,
    Websocket,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub mode: StreamMode,
    pub mock: MockConfig,
    pub socket: SocketConfig,
    pub websocket: WebsocketConfig,
    pub http: HttpPollConfig,
    /// Capacity of the producer -> pipeline channel.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::Mock,
            mock: MockConfig::default(),
            socket: SocketConfig::default(),
            websocket: WebsocketConfig::default(),
            http: HttpPollConfig::default(),
            channel_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub events_per_second: f64,
    pub anomaly_probability: f64,
    /// 0 means unbounded.
    pub duration_seconds: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            events_per_second: 10.0,
            anomaly_probability: 0.05,
            duration_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub host: String,
    pub port: u16,
    pub recv_timeout_secs: u64,
    pub reconnect_interval_secs: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8888,
            recv_timeout_secs: 5,
            reconnect_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsocketConfig {
    pub url: String,
    pub reconnect_interval_secs: u64,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765".to_string(),
            reconnect_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPollConfig {
    pub urls: Vec<String>,
    pub interval_secs: f64,
    pub timeout_secs: u64,
    pub method: String,
    pub headers: HashMap<String, String>,
}

impl Default for HttpPollConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            interval_secs: 1.0,
            timeout_secs: 5,
            method: "GET".to_string(),
            headers: HashMap::new(),
        }
    }
}

// ============================================================================
// ANOMALY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Zscore,
    IsolationForest,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub method: DetectionMethod,
    /// Feature names fed to the statistical detectors.
    pub features: Vec<String>,
    pub zscore: ZscoreConfig,
    pub isolation_forest: IsolationForestConfig,
    pub changepoint: ChangepointConfig,
    /// Feature maps accumulated before the forest is fitted.
    pub min_training_samples: usize,
    /// Bound on the retained training ring.
    pub max_training_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::Hybrid,
            features: vec![
                "rps".to_string(),
                "error_rate".to_string(),
                "response_time_mean".to_string(),
                "cpu_usage_mean".to_string(),
                "memory_usage_mean".to_string(),
            ],
            zscore: ZscoreConfig::default(),
            isolation_forest: IsolationForestConfig::default(),
            changepoint: ChangepointConfig::default(),
            min_training_samples: 50,
            max_training_samples: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZscoreConfig {
    pub threshold: f64,
    pub window_size: usize,
}

impl Default for ZscoreConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            window_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangepointConfig {
    pub enabled: bool,
    pub sensitivity: f64,
    pub min_change: f64,
    pub window_size: usize,
}

impl Default for ChangepointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: 0.3,
            min_change: 0.2,
            window_size: 50,
        }
    }
}

// ============================================================================
// ALERTS / WINDOWS / DASHBOARD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub max_alerts: usize,
    pub threshold: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_alerts: 1000,
            threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Main event ring capacity.
    pub capacity: usize,
    /// Default capacity for lazily-created named windows.
    pub named_capacity: usize,
    /// Recent-event count handed to the feature engineer per event.
    pub feature_window: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            named_capacity: 100,
            feature_window: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Bind address of the strixd status/control API.
    pub bind: String,
    pub refresh_secs: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9601".to_string(),
            refresh_secs: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.stream.mode, StreamMode::Mock);
        assert_eq!(cfg.anomaly.method, DetectionMethod::Hybrid);
        assert_eq!(cfg.anomaly.zscore.threshold, 3.0);
        assert_eq!(cfg.alert.threshold, 0.7);
        assert_eq!(cfg.window.capacity, 1000);
    }

    #[test]
    fn test_partial_yaml_overlays_defaults() {
        let yaml = r#"
stream:
  mode: socket
  socket:
    host: collector.internal
    port: 9999
anomaly:
  method: zscore
  zscore:
    threshold: 2.5
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.stream.mode, StreamMode::Socket);
        assert_eq!(cfg.stream.socket.host, "collector.internal");
        assert_eq!(cfg.stream.socket.port, 9999);
        assert_eq!(cfg.anomaly.method, DetectionMethod::Zscore);
        assert_eq!(cfg.anomaly.zscore.threshold, 2.5);
        // Untouched sections keep defaults.
        assert_eq!(cfg.anomaly.isolation_forest.n_estimators, 100);
        assert_eq!(cfg.window.named_capacity, 100);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::from_file("/definitely/not/here.yaml").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "stream:\n  mode: http\n  http:\n    urls: [\"http://a\", \"http://b\"]")
            .unwrap();
        let cfg = AppConfig::from_file(tmp.path()).unwrap();
        assert_eq!(cfg.stream.mode, StreamMode::Http);
        assert_eq!(cfg.stream.http.urls.len(), 2);
    }
}
