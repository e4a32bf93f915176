//! Univariate rolling z-score detection.
//!
//! One bounded history per detector instance. Each prediction scores the
//! incoming value against the history *before* appending it, so a value can
//! never dilute the baseline it is judged against.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::config::ZscoreConfig;
use crate::stats;

pub struct ZScoreDetector {
    pub threshold: f64,
    pub window_size: usize,
    history: VecDeque<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureZScore {
    pub is_anomaly: bool,
    pub z_score: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZScoreReport {
    pub is_anomaly: bool,
    /// `max |z| / threshold`, deliberately unclamped so callers can see how
    /// far past the threshold the worst feature landed.
    pub anomaly_score: f64,
    pub details: HashMap<String, FeatureZScore>,
}

impl ZScoreDetector {
    pub fn new(config: &ZscoreConfig) -> Self {
        Self {
            threshold: config.threshold,
            window_size: config.window_size.max(1),
            history: VecDeque::with_capacity(config.window_size.max(1)),
        }
    }

    /// Seed the history from prior observations, keeping the most recent
    /// `window_size` values.
    pub fn fit(&mut self, values: &[f64]) {
        self.history.clear();
        for v in values.iter().skip(values.len().saturating_sub(self.window_size)) {
            self.history.push_back(*v);
        }
    }

    /// Score one value against the current history, then absorb it.
    /// Returns `(is_anomaly, |z|)`; with fewer than 2 samples or zero
    /// deviation the value is absorbed without being flagged.
    pub fn predict(&mut self, value: f64) -> (bool, f64) {
        if self.history.len() < 2 {
            self.push(value);
            return (false, 0.0);
        }

        let history: Vec<f64> = self.history.iter().copied().collect();
        let mean = stats::mean(&history);
        let std = stats::std_dev(&history);

        if std == 0.0 {
            self.push(value);
            return (false, 0.0);
        }

        let z_score = ((value - mean) / std).abs();
        let is_anomaly = z_score > self.threshold;
        self.push(value);

        (is_anomaly, z_score)
    }

    fn push(&mut self, value: f64) {
        if self.history.len() == self.window_size {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }

    /// Run [`Self::predict`] over each named feature. A single flagged
    /// feature flags the whole report.
    pub fn detect(
        &mut self,
        features: &HashMap<String, f64>,
        feature_names: &[String],
    ) -> ZScoreReport {
        let mut details = HashMap::new();
        let mut max_z = 0.0f64;
        let mut anomaly_count = 0usize;

        for name in feature_names {
            let value = match features.get(name) {
                Some(v) => *v,
                None => continue,
            };

            let (is_anomaly, z_score) = self.predict(value);
            if is_anomaly {
                anomaly_count += 1;
            }
            max_z = max_z.max(z_score);

            details.insert(
                name.clone(),
                FeatureZScore {
                    is_anomaly,
                    z_score,
                    value,
                },
            );
        }

        ZScoreReport {
            is_anomaly: anomaly_count > 0,
            anomaly_score: max_z / self.threshold,
            details,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ZScoreDetector {
        ZScoreDetector::new(&ZscoreConfig {
            threshold: 3.0,
            window_size: 100,
        })
    }

    #[test]
    fn test_warmup_never_flags() {
        let mut det = detector();
        assert_eq!(det.predict(100.0), (false, 0.0));
        assert_eq!(det.predict(10_000.0), (false, 0.0));
    }

    #[test]
    fn test_zero_std_never_flags() {
        let mut det = detector();
        for _ in 0..10 {
            let (flag, z) = det.predict(50.0);
            assert!(!flag);
            assert_eq!(z, 0.0);
        }
    }

    #[test]
    fn test_outlier_flags_after_stable_history() {
        let mut det = detector();
        for i in 0..50 {
            det.predict(100.0 + (i % 5) as f64);
        }
        let (flag, z) = det.predict(1_000.0);
        assert!(flag);
        assert!(z > 3.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut det = ZScoreDetector::new(&ZscoreConfig {
            threshold: 3.0,
            window_size: 10,
        });
        for i in 0..100 {
            det.predict(i as f64);
        }
        assert_eq!(det.history_len(), 10);
    }

    #[test]
    fn test_detect_reports_per_feature() {
        let mut det = detector();
        // Build history for one feature stream.
        for i in 0..60 {
            let mut features = HashMap::new();
            features.insert("rps".to_string(), 10.0 + (i % 3) as f64);
            det.detect(&features, &["rps".to_string()]);
        }

        let mut features = HashMap::new();
        features.insert("rps".to_string(), 500.0);
        let report = det.detect(&features, &["rps".to_string()]);
        assert!(report.is_anomaly);
        assert!(report.anomaly_score > 1.0);
        assert!(report.details["rps"].is_anomaly);
    }

    #[test]
    fn test_missing_feature_is_skipped() {
        let mut det = detector();
        let features = HashMap::new();
        let report = det.detect(&features, &["rps".to_string()]);
        assert!(!report.is_anomaly);
        assert!(report.details.is_empty());
        assert_eq!(report.anomaly_score, 0.0);
    }

    #[test]
    fn test_fit_seeds_history() {
        let mut det = ZScoreDetector::new(&ZscoreConfig {
            threshold: 3.0,
            window_size: 5,
        });
        det.fit(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(det.history_len(), 5);
    }
}
