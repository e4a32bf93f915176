//! Canonical telemetry event record.
//!
//! Every field is optional: sources differ in what they can report, and a
//! missing or non-numeric value is skipped by consumers rather than coerced.
//! Unknown keys survive round-trips through the flattened extension map.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Canonical timestamp format, e.g. `2026-08-01 12:34:56.123456`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One telemetry record flowing through the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// HTTP status. Absent is treated as 200 by consumers; a non-numeric
    /// JSON value deserializes to `None`.
    #[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,

    /// Response latency in milliseconds.
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,

    /// Host CPU utilization, 0-100.
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,

    /// Host memory utilization, 0-100.
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,

    #[serde(default, alias = "remote_addr", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Source-side label. Informational only; never drives detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anomaly: Option<bool>,

    /// Unknown keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Timestamp parsed to epoch seconds, cached at ingestion so hot paths
    /// never re-parse the display string.
    #[serde(skip)]
    pub epoch: Option<f64>,
}

impl Event {
    /// Current local time in the canonical format.
    pub fn now_string() -> String {
        chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
    }

    /// Strictly parse a canonical timestamp to epoch seconds.
    pub fn parse_timestamp(value: &str) -> Result<f64, Error> {
        let naive = chrono::NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(
            |source| Error::Timestamp {
                value: value.to_string(),
                source,
            },
        )?;
        Ok(naive.and_utc().timestamp_micros() as f64 / 1e6)
    }

    /// Stamp a missing timestamp with the current time and cache the parsed
    /// epoch. Called once per event at ingestion.
    pub fn stamp(&mut self) {
        if self.timestamp.is_none() {
            self.timestamp = Some(Self::now_string());
        }
        if self.epoch.is_none() {
            self.epoch = self
                .timestamp
                .as_deref()
                .and_then(|ts| Self::parse_timestamp(ts).ok());
        }
    }

    /// Epoch seconds of this event: the ingestion cache, or a parse of the
    /// timestamp string for events that bypassed ingestion.
    pub fn epoch_seconds(&self) -> Option<f64> {
        self.epoch.or_else(|| {
            self.timestamp
                .as_deref()
                .and_then(|ts| Self::parse_timestamp(ts).ok())
        })
    }

    /// Fallible variant of [`Self::epoch_seconds`] for callers that must
    /// surface malformed timestamps (time-window queries).
    pub fn epoch_seconds_strict(&self) -> Result<f64, Error> {
        if let Some(epoch) = self.epoch {
            return Ok(epoch);
        }
        let ts = self.timestamp.as_deref().unwrap_or("");
        Self::parse_timestamp(ts)
    }

    /// Endpoint or `"unknown"`.
    pub fn endpoint_or_unknown(&self) -> &str {
        self.endpoint.as_deref().unwrap_or("unknown")
    }

    /// Status code with the absent-means-200 convention.
    pub fn status_or_200(&self) -> i64 {
        self.status_code.unwrap_or(200)
    }

    /// Numeric value of a named field, where the name is one of the known
    /// metric fields. Used by the feature engineer's field loop.
    pub fn numeric_field(&self, field: &str) -> Option<f64> {
        match field {
            "response_time" => self.response_time,
            "cpu_usage" => self.cpu_usage,
            "memory_usage" => self.memory_usage,
            _ => self.extra.get(field).and_then(Value::as_f64),
        }
    }
}

/// Accept any JSON value, keeping only numbers. Strings and other shapes are
/// dropped, never coerced.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_f64))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = "2026-08-01 10:20:30.123456";
        let epoch = Event::parse_timestamp(ts).unwrap();
        assert!(epoch > 0.0);

        let later = Event::parse_timestamp("2026-08-01 10:20:31.123456").unwrap();
        assert!((later - epoch - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_timestamp_rejects_deviations() {
        assert!(Event::parse_timestamp("2026-08-01T10:20:30.123456").is_err());
        assert!(Event::parse_timestamp("not a time").is_err());
    }

    #[test]
    fn test_lenient_numeric_fields() {
        let ev: Event = serde_json::from_str(
            r#"{"status_code": "oops", "response_time": 12.5, "cpu_usage": null}"#,
        )
        .unwrap();
        assert_eq!(ev.status_code, None);
        assert_eq!(ev.status_or_200(), 200);
        assert_eq!(ev.response_time, Some(12.5));
        assert_eq!(ev.cpu_usage, None);
    }

    #[test]
    fn test_remote_addr_alias_and_extra() {
        let ev: Event =
            serde_json::from_str(r#"{"remote_addr": "1.2.3.4", "region": "us-east"}"#).unwrap();
        assert_eq!(ev.ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(ev.extra.get("region").and_then(Value::as_str), Some("us-east"));
    }

    #[test]
    fn test_stamp_fills_and_caches() {
        let mut ev = Event::default();
        ev.stamp();
        assert!(ev.timestamp.is_some());
        assert!(ev.epoch.is_some());
        assert!(ev.epoch_seconds().is_some());
    }
}
