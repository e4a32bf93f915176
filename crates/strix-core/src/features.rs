//! Statistical feature extraction over event windows.
//!
//! Produces a flat name -> value map: request rate, error rate, and per
//! metric field the basic and rolling statistics the detectors consume.

use std::collections::HashMap;

use crate::event::Event;
use crate::preprocess::NUMERIC_FIELDS;
use crate::stats;

pub struct FeatureEngineer {
    /// Rolling-window size for the centered statistics.
    pub window_size: usize,
}

#[derive(Debug, Clone)]
pub struct RollingStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub var: Vec<f64>,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}

impl FeatureEngineer {
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    /// Requests per second over the window's timestamp span.
    ///
    /// With fewer than two parseable timestamps the count is taken over a
    /// one-second window; the span is floored at `time_window` so a tight
    /// burst cannot produce an unbounded rate.
    pub fn calculate_rps(&self, events: &[Event], time_window: f64) -> f64 {
        if events.is_empty() {
            return 0.0;
        }
        if events.len() < 2 {
            return 1.0;
        }

        let epochs: Vec<f64> = events.iter().filter_map(Event::epoch_seconds).collect();
        if epochs.len() < 2 {
            return events.len() as f64 / time_window;
        }

        let span = stats::max(&epochs) - stats::min(&epochs);
        if span == 0.0 {
            return events.len() as f64 / time_window;
        }
        events.len() as f64 / span.max(time_window)
    }

    /// Share of events with an (effective) status code of 400 or above.
    pub fn calculate_error_rate(&self, events: &[Event]) -> f64 {
        if events.is_empty() {
            return 0.0;
        }
        let errors = events.iter().filter(|e| e.status_or_200() >= 400).count();
        errors as f64 / events.len() as f64
    }

    pub fn calculate_moving_average(&self, values: &[f64], window: Option<usize>) -> Vec<f64> {
        let window = window.unwrap_or(self.window_size);
        if values.len() < window {
            return vec![stats::mean(values); values.len()];
        }
        stats::convolve_same(values, window)
    }

    pub fn calculate_ema(&self, values: &[f64], alpha: Option<f64>, window: Option<usize>) -> Vec<f64> {
        stats::ema(values, alpha, window.unwrap_or(self.window_size))
    }

    /// Centered rolling statistics with whole-series fill at the edges.
    pub fn calculate_rolling_stats(&self, values: &[f64], window: Option<usize>) -> RollingStats {
        let window = window.unwrap_or(self.window_size);
        RollingStats {
            mean: stats::rolling_centered(values, window, stats::mean),
            std: stats::rolling_centered(values, window, stats::std_dev),
            min: stats::rolling_centered(values, window, stats::min),
            max: stats::rolling_centered(values, window, stats::max),
            var: stats::rolling_centered(values, window, |w| {
                let s = stats::std_dev(w);
                s * s
            }),
        }
    }

    /// Rolling z-score of each value against its centered window; 0 where
    /// the rolling std is 0.
    pub fn calculate_spike_score(&self, values: &[f64], window: Option<usize>) -> Vec<f64> {
        if values.len() < 2 {
            return vec![0.0; values.len()];
        }
        let rolling = self.calculate_rolling_stats(values, window);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if rolling.std[i] > 0.0 {
                    (v - rolling.mean[i]) / rolling.std[i]
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Extract the feature map for a window of events. Empty input yields an
    /// empty map.
    pub fn extract_features(
        &self,
        events: &[Event],
        fields: Option<&[&str]>,
    ) -> HashMap<String, f64> {
        let mut features = HashMap::new();
        if events.is_empty() {
            return features;
        }
        let fields: Vec<&str> = fields
            .map(|f| f.to_vec())
            .unwrap_or_else(|| NUMERIC_FIELDS.to_vec());

        features.insert("rps".to_string(), self.calculate_rps(events, 1.0));
        features.insert("error_rate".to_string(), self.calculate_error_rate(events));
        features.insert("event_count".to_string(), events.len() as f64);

        for field in fields {
            let values: Vec<f64> = events
                .iter()
                .filter_map(|e| e.numeric_field(field))
                .collect();
            if values.is_empty() {
                continue;
            }

            features.insert(format!("{}_mean", field), stats::mean(&values));
            features.insert(format!("{}_std", field), stats::std_dev(&values));
            features.insert(format!("{}_min", field), stats::min(&values));
            features.insert(format!("{}_max", field), stats::max(&values));
            features.insert(format!("{}_median", field), stats::median(&values));

            if values.len() >= 2 {
                let rolling = self.calculate_rolling_stats(&values, None);
                let last = values.len() - 1;
                features.insert(format!("{}_rolling_mean", field), rolling.mean[last]);
                features.insert(format!("{}_rolling_std", field), rolling.std[last]);

                let spikes = self.calculate_spike_score(&values, None);
                features.insert(format!("{}_spike_score", field), spikes[last]);

                let ema = self.calculate_ema(&values, None, None);
                features.insert(format!("{}_ema", field), ema[last]);
            }
        }

        features
    }

    /// Features of a single event compared against a historical window:
    /// the raw value plus its z-score and deviation from the historical
    /// mean, and an `is_error` flag.
    pub fn extract_single_event_features(
        &self,
        event: &Event,
        historical_events: Option<&[Event]>,
    ) -> HashMap<String, f64> {
        let mut features = HashMap::new();

        if let Some(code) = event.status_code {
            features.insert("status_code".to_string(), code as f64);
        }

        match historical_events {
            Some(history) if !history.is_empty() => {
                let hist = self.extract_features(history, None);
                for field in NUMERIC_FIELDS {
                    if let Some(value) = event.numeric_field(field) {
                        let mean = hist
                            .get(&format!("{}_mean", field))
                            .copied()
                            .unwrap_or(value);
                        let std = hist.get(&format!("{}_std", field)).copied().unwrap_or(1.0);

                        features.insert(field.to_string(), value);
                        features.insert(
                            format!("{}_zscore", field),
                            if std > 0.0 { (value - mean) / std } else { 0.0 },
                        );
                        features.insert(format!("{}_deviation", field), value - mean);
                    }
                }
            }
            _ => {
                for field in NUMERIC_FIELDS {
                    if let Some(value) = event.numeric_field(field) {
                        features.insert(field.to_string(), value);
                    }
                }
            }
        }

        let is_error = event.status_or_200() >= 400;
        features.insert("is_error".to_string(), if is_error { 1.0 } else { 0.0 });

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: &str, status: i64, rt: f64) -> Event {
        Event {
            timestamp: Some(ts.to_string()),
            status_code: Some(status),
            response_time: Some(rt),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_input_is_empty() {
        let fe = FeatureEngineer::default();
        assert!(fe.extract_features(&[], None).is_empty());
        assert_eq!(fe.calculate_rps(&[], 1.0), 0.0);
        assert_eq!(fe.calculate_error_rate(&[]), 0.0);
    }

    #[test]
    fn test_rps_over_span() {
        let fe = FeatureEngineer::default();
        let events = vec![
            event("2026-08-01 10:00:00.000000", 200, 100.0),
            event("2026-08-01 10:00:01.000000", 200, 100.0),
            event("2026-08-01 10:00:02.000000", 200, 100.0),
        ];
        // 3 events over 2 seconds.
        assert!((fe.calculate_rps(&events, 1.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_rps_floors_span_at_time_window() {
        let fe = FeatureEngineer::default();
        let events = vec![
            event("2026-08-01 10:00:00.000000", 200, 100.0),
            event("2026-08-01 10:00:00.100000", 200, 100.0),
        ];
        // 0.1s span floored to 1s.
        assert!((fe.calculate_rps(&events, 1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rps_single_event() {
        let fe = FeatureEngineer::default();
        assert_eq!(fe.calculate_rps(&[event("2026-08-01 10:00:00.000000", 200, 1.0)], 1.0), 1.0);
    }

    #[test]
    fn test_error_rate() {
        let fe = FeatureEngineer::default();
        let events = vec![
            event("2026-08-01 10:00:00.000000", 200, 100.0),
            event("2026-08-01 10:00:01.000000", 500, 100.0),
            event("2026-08-01 10:00:02.000000", 404, 100.0),
            event("2026-08-01 10:00:03.000000", 201, 100.0),
        ];
        assert!((fe.calculate_error_rate(&events) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_extract_features_per_field() {
        let fe = FeatureEngineer::default();
        let events = vec![
            event("2026-08-01 10:00:00.000000", 200, 100.0),
            event("2026-08-01 10:00:01.000000", 200, 200.0),
        ];
        let features = fe.extract_features(&events, None);
        assert_eq!(features["event_count"], 2.0);
        assert!((features["response_time_mean"] - 150.0).abs() < 1e-9);
        assert!(features.contains_key("response_time_rolling_mean"));
        assert!(features.contains_key("response_time_spike_score"));
        assert!(features.contains_key("response_time_ema"));
        // No cpu samples -> no cpu features.
        assert!(!features.contains_key("cpu_usage_mean"));
    }

    #[test]
    fn test_spike_score_zero_std() {
        let fe = FeatureEngineer::default();
        let scores = fe.calculate_spike_score(&[5.0, 5.0, 5.0, 5.0], Some(2));
        assert!(scores.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_single_event_zscore() {
        let fe = FeatureEngineer::default();
        let history: Vec<Event> = (0..10)
            .map(|i| event(&format!("2026-08-01 10:00:0{}.000000", i % 10), 200, 100.0))
            .collect();
        let current = event("2026-08-01 10:00:11.000000", 200, 100.0);
        let features = fe.extract_single_event_features(&current, Some(&history));
        // Zero historical std -> zero z-score.
        assert_eq!(features["response_time_zscore"], 0.0);
        assert_eq!(features["response_time_deviation"], 0.0);
        assert_eq!(features["is_error"], 0.0);
    }
}
