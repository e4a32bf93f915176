//! Windowed change-point detection over a single feature's trail.
//!
//! Compares the first `window_size` values against the last `window_size`
//! values; with fewer than `2 * window_size` samples nothing is detected.
//! Four methods: spike, drop, pattern shift (mean + spread), and a
//! smoothed-delta scan. `auto` tries spike then drop and keeps the first
//! match per feature.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::ChangepointConfig;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangepointMethod {
    Auto,
    Spike,
    Drop,
    PatternShift,
    SmoothedDelta,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureChangepoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub idx: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangepointReport {
    pub has_changepoint: bool,
    pub changepoint_type: Option<String>,
    /// Largest change index across features; -1 when none detected.
    pub changepoint_idx: i64,
    pub details: HashMap<String, FeatureChangepoint>,
}

impl ChangepointReport {
    fn empty() -> Self {
        Self {
            has_changepoint: false,
            changepoint_type: None,
            changepoint_idx: -1,
            details: HashMap::new(),
        }
    }
}

pub struct ChangePointDetector {
    pub sensitivity: f64,
    pub min_change: f64,
    pub window_size: usize,
}

impl ChangePointDetector {
    pub fn new(config: &ChangepointConfig) -> Self {
        Self {
            sensitivity: config.sensitivity,
            min_change: config.min_change,
            window_size: config.window_size.max(1),
        }
    }

    /// Sharp increase: relative mean change above `min_change` and the
    /// current mean above `prev * (1 + sensitivity)`.
    pub fn detect_spike(&self, values: &[f64], threshold_multiplier: Option<f64>) -> (bool, i64) {
        if values.len() < self.window_size * 2 {
            return (false, -1);
        }
        let multiplier = threshold_multiplier.unwrap_or(1.0 + self.sensitivity);

        let prev_mean = stats::mean(&values[..self.window_size]);
        let current_mean = stats::mean(&values[values.len() - self.window_size..]);

        if prev_mean == 0.0 {
            return (false, -1);
        }
        let change_ratio = (current_mean - prev_mean) / prev_mean;

        if change_ratio > self.min_change && current_mean > prev_mean * multiplier {
            return (true, (values.len() - self.window_size) as i64);
        }
        (false, -1)
    }

    /// Sharp decrease, mirrored from [`Self::detect_spike`].
    pub fn detect_drop(&self, values: &[f64], threshold_multiplier: Option<f64>) -> (bool, i64) {
        if values.len() < self.window_size * 2 {
            return (false, -1);
        }
        let multiplier = threshold_multiplier.unwrap_or(1.0 - self.sensitivity);

        let prev_mean = stats::mean(&values[..self.window_size]);
        let current_mean = stats::mean(&values[values.len() - self.window_size..]);

        if prev_mean == 0.0 {
            return (false, -1);
        }
        let change_ratio = ((current_mean - prev_mean) / prev_mean).abs();

        if change_ratio > self.min_change && current_mean < prev_mean * multiplier {
            return (true, (values.len() - self.window_size) as i64);
        }
        (false, -1)
    }

    /// Joint mean + spread shift: the averaged relative changes exceed
    /// `min_change`.
    pub fn detect_pattern_shift(&self, values: &[f64]) -> (bool, i64) {
        if values.len() < self.window_size * 2 {
            return (false, -1);
        }

        let prev = &values[..self.window_size];
        let current = &values[values.len() - self.window_size..];

        let prev_mean = stats::mean(prev);
        let prev_std = stats::std_dev(prev);
        let current_mean = stats::mean(current);
        let current_std = stats::std_dev(current);

        let mean_change = (current_mean - prev_mean).abs() / (prev_mean + 1e-10);
        let std_change = (current_std - prev_std).abs() / (prev_std + 1e-10);
        let total_change = (mean_change + std_change) / 2.0;

        if total_change > self.min_change {
            return (true, (values.len() - self.window_size) as i64);
        }
        (false, -1)
    }

    /// Moving-average smoothed scan: a point whose absolute delta exceeds
    /// `mean(|delta|) + sensitivity * std(|delta|)`. Returns the most recent
    /// such point.
    pub fn detect_smoothed_delta(&self, values: &[f64], smoothing_window: usize) -> (bool, i64) {
        if values.len() < smoothing_window * 2 {
            return (false, -1);
        }

        let smoothed = stats::convolve_same(values, smoothing_window);
        let deltas: Vec<f64> = smoothed.windows(2).map(|w| w[1] - w[0]).collect();
        if deltas.is_empty() {
            return (false, -1);
        }

        let abs_deltas: Vec<f64> = deltas.iter().map(|d| d.abs()).collect();
        let threshold = stats::mean(&abs_deltas) + self.sensitivity * stats::std_dev(&abs_deltas);

        let last_large = abs_deltas
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > threshold)
            .map(|(i, _)| i)
            .next_back();

        match last_large {
            Some(idx) => (true, idx as i64),
            None => (false, -1),
        }
    }

    /// Scan every feature's trail. `auto` evaluates spike before drop and a
    /// match ends that feature's scan.
    pub fn detect(
        &self,
        feature_values: &HashMap<String, Vec<f64>>,
        method: ChangepointMethod,
    ) -> ChangepointReport {
        let mut report = ChangepointReport::empty();

        for (feature_name, values) in feature_values {
            if values.len() < self.window_size * 2 {
                continue;
            }

            if matches!(method, ChangepointMethod::Auto | ChangepointMethod::Spike) {
                let (detected, idx) = self.detect_spike(values, None);
                if detected {
                    record(&mut report, feature_name, "spike", idx);
                    continue;
                }
            }

            if matches!(method, ChangepointMethod::Auto | ChangepointMethod::Drop) {
                let (detected, idx) = self.detect_drop(values, None);
                if detected {
                    record(&mut report, feature_name, "drop", idx);
                    continue;
                }
            }

            if method == ChangepointMethod::PatternShift {
                let (detected, idx) = self.detect_pattern_shift(values);
                if detected {
                    record(&mut report, feature_name, "pattern_shift", idx);
                }
            }

            if method == ChangepointMethod::SmoothedDelta {
                let (detected, idx) = self.detect_smoothed_delta(values, 10);
                if detected {
                    record(&mut report, feature_name, "smoothed_delta", idx);
                }
            }
        }

        report
    }
}

fn record(report: &mut ChangepointReport, feature: &str, kind: &str, idx: i64) {
    report.has_changepoint = true;
    report.changepoint_type = Some(kind.to_string());
    report.changepoint_idx = report.changepoint_idx.max(idx);
    report.details.insert(
        feature.to_string(),
        FeatureChangepoint {
            kind: kind.to_string(),
            idx: idx.max(0) as usize,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(window: usize) -> ChangePointDetector {
        ChangePointDetector::new(&ChangepointConfig {
            enabled: true,
            sensitivity: 0.3,
            min_change: 0.2,
            window_size: window,
        })
    }

    fn trail(first: f64, second: f64, half: usize) -> Vec<f64> {
        let mut v = vec![first; half];
        v.extend(vec![second; half]);
        v
    }

    #[test]
    fn test_too_short_never_detects() {
        let det = detector(50);
        let values = vec![1.0; 99];
        assert_eq!(det.detect_spike(&values, None), (false, -1));
        assert_eq!(det.detect_drop(&values, None), (false, -1));
        assert_eq!(det.detect_pattern_shift(&values), (false, -1));
    }

    #[test]
    fn test_spike() {
        let det = detector(10);
        let values = trail(100.0, 300.0, 10);
        let (detected, idx) = det.detect_spike(&values, None);
        assert!(detected);
        assert_eq!(idx, 10);
        // No spike in a flat trail.
        assert!(!det.detect_spike(&trail(100.0, 100.0, 10), None).0);
    }

    #[test]
    fn test_drop() {
        let det = detector(10);
        let (detected, idx) = det.detect_drop(&trail(200.0, 20.0, 10), None);
        assert!(detected);
        assert_eq!(idx, 10);
    }

    #[test]
    fn test_zero_previous_mean_guard() {
        let det = detector(10);
        assert!(!det.detect_spike(&trail(0.0, 100.0, 10), None).0);
        assert!(!det.detect_drop(&trail(0.0, 100.0, 10), None).0);
    }

    #[test]
    fn test_pattern_shift_on_spread_change() {
        let det = detector(10);
        let mut values = vec![100.0; 10];
        // Same-ish mean, very different spread.
        for i in 0..10 {
            values.push(if i % 2 == 0 { 30.0 } else { 170.0 });
        }
        let (detected, _) = det.detect_pattern_shift(&values);
        assert!(detected);
    }

    #[test]
    fn test_smoothed_delta_finds_step() {
        let det = detector(10);
        let values = trail(10.0, 200.0, 30);
        let (detected, idx) = det.detect_smoothed_delta(&values, 10);
        assert!(detected);
        assert!(idx >= 0);
    }

    #[test]
    fn test_auto_prefers_spike_over_drop() {
        let det = detector(10);
        let mut trails = HashMap::new();
        trails.insert("rps".to_string(), trail(100.0, 300.0, 10));
        let report = det.detect(&trails, ChangepointMethod::Auto);
        assert!(report.has_changepoint);
        assert_eq!(report.changepoint_type.as_deref(), Some("spike"));
        assert_eq!(report.changepoint_idx, 10);
        assert_eq!(report.details["rps"].kind, "spike");
    }

    #[test]
    fn test_auto_detects_drop() {
        let det = detector(10);
        let mut trails = HashMap::new();
        trails.insert("response_time_mean".to_string(), trail(200.0, 20.0, 10));
        let report = det.detect(&trails, ChangepointMethod::Auto);
        assert_eq!(report.changepoint_type.as_deref(), Some("drop"));
    }

    #[test]
    fn test_detect_skips_short_features() {
        let det = detector(50);
        let mut trails = HashMap::new();
        trails.insert("rps".to_string(), vec![1.0; 60]);
        let report = det.detect(&trails, ChangepointMethod::Auto);
        assert!(!report.has_changepoint);
        assert_eq!(report.changepoint_idx, -1);
    }
}
