//! Detector ensemble.
//!
//! The manager routes feature maps to the configured detectors and fuses
//! their verdicts. Training is opportunistic: every detection call feeds the
//! bounded training ring, and the isolation forest is fitted once the ring
//! reaches the configured minimum. The change-point detector runs as an
//! overlay over recent feature trails; its result is attached to the details
//! without changing the top-level verdict.

pub mod changepoint;
pub mod comprehensive;
pub mod iforest;
pub mod tracker;
pub mod zscore;

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{AnomalyConfig, DetectionMethod};
use changepoint::{ChangePointDetector, ChangepointMethod};
use iforest::IsolationForestDetector;
use zscore::ZScoreDetector;

/// Samples a feature trail must reach before the change-point overlay runs.
const CHANGEPOINT_MIN_SAMPLES: usize = 100;

/// Fused detection result handed to the alert manager.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub method: String,
    pub details: Value,
}

impl Detection {
    pub fn neutral(method: &str) -> Self {
        Self {
            is_anomaly: false,
            anomaly_score: 0.0,
            method: method.to_string(),
            details: json!({}),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectorStats {
    pub method: String,
    pub training_samples: usize,
    pub zscore_history: usize,
    pub iforest_fitted: bool,
    pub changepoint_enabled: bool,
}

pub struct DetectorManager {
    method: DetectionMethod,
    feature_names: Vec<String>,
    zscore: ZScoreDetector,
    iforest: IsolationForestDetector,
    changepoint: Option<ChangePointDetector>,
    training_data: VecDeque<HashMap<String, f64>>,
    min_training_samples: usize,
    max_training_samples: usize,
}

impl DetectorManager {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            method: config.method,
            feature_names: config.features.clone(),
            zscore: ZScoreDetector::new(&config.zscore),
            iforest: IsolationForestDetector::new(&config.isolation_forest),
            changepoint: config
                .changepoint
                .enabled
                .then(|| ChangePointDetector::new(&config.changepoint)),
            training_data: VecDeque::with_capacity(config.max_training_samples.max(1)),
            min_training_samples: config.min_training_samples,
            max_training_samples: config.max_training_samples.max(1),
        }
    }

    fn method_name(&self) -> &'static str {
        match self.method {
            DetectionMethod::Zscore => "zscore",
            DetectionMethod::IsolationForest => "isolation_forest",
            DetectionMethod::Hybrid => "hybrid",
        }
    }

    /// Retain a numeric-only copy of the feature map and fit the forest once
    /// enough samples exist.
    fn add_training_data(&mut self, features: &HashMap<String, f64>) {
        if self.training_data.len() == self.max_training_samples {
            self.training_data.pop_front();
        }
        self.training_data.push_back(features.clone());

        if self.training_data.len() >= self.min_training_samples && !self.iforest.is_fitted {
            self.train();
        }
    }

    fn train(&mut self) {
        if self.training_data.len() < self.min_training_samples {
            warn!(
                have = self.training_data.len(),
                need = self.min_training_samples,
                "not enough training samples yet"
            );
            return;
        }

        let samples: Vec<HashMap<String, f64>> =
            self.training_data.iter().cloned().collect();
        self.iforest.fit(&samples, &self.feature_names);
        info!(samples = samples.len(), "isolation forest fitted");
    }

    /// Detect on a feature map according to the configured method.
    pub fn detect(&mut self, features: &HashMap<String, f64>) -> Detection {
        self.add_training_data(features);

        let mut result = Detection::neutral(self.method_name());
        let mut details = serde_json::Map::new();

        match self.method {
            DetectionMethod::Zscore => {
                let report = self.zscore.detect(features, &self.feature_names);
                result.is_anomaly = report.is_anomaly;
                result.anomaly_score = report.anomaly_score;
                details.insert("zscore".to_string(), json!(report));
            }
            DetectionMethod::IsolationForest => {
                if self.iforest.is_fitted {
                    let report = self.iforest.detect(features);
                    result.is_anomaly = report.is_anomaly;
                    result.anomaly_score = report.anomaly_score;
                    details.insert("isolation_forest".to_string(), json!(report));
                } else {
                    warn!("isolation forest not fitted yet; returning neutral result");
                }
            }
            DetectionMethod::Hybrid => {
                let zscore_report = self.zscore.detect(features, &self.feature_names);
                result.is_anomaly = zscore_report.is_anomaly;
                result.anomaly_score = zscore_report.anomaly_score;
                details.insert("zscore".to_string(), json!(zscore_report));

                if self.iforest.is_fitted {
                    let iforest_report = self.iforest.detect(features);
                    result.is_anomaly = result.is_anomaly || iforest_report.is_anomaly;
                    result.anomaly_score =
                        result.anomaly_score.max(iforest_report.anomaly_score);
                    details.insert("isolation_forest".to_string(), json!(iforest_report));
                }
            }
        }

        if let Some(changepoint) = &self.changepoint {
            if self.training_data.len() >= CHANGEPOINT_MIN_SAMPLES {
                let trails = self.feature_trails(CHANGEPOINT_MIN_SAMPLES);
                if !trails.is_empty() {
                    let report = changepoint.detect(&trails, ChangepointMethod::Auto);
                    if report.has_changepoint {
                        debug!(kind = ?report.changepoint_type, "change point in feature trail");
                    }
                    details.insert("changepoint".to_string(), json!(report));
                }
            }
        }

        result.details = Value::Object(details);
        result
    }

    /// Last `count` values of each configured feature, for features present
    /// in the oldest retained sample.
    fn feature_trails(&self, count: usize) -> HashMap<String, Vec<f64>> {
        let recent: Vec<&HashMap<String, f64>> = self
            .training_data
            .iter()
            .skip(self.training_data.len().saturating_sub(count))
            .collect();

        let mut trails = HashMap::new();
        if recent.is_empty() {
            return trails;
        }

        for name in &self.feature_names {
            if !recent[0].contains_key(name) {
                continue;
            }
            let values: Vec<f64> = recent
                .iter()
                .map(|sample| sample.get(name).copied().unwrap_or(0.0))
                .collect();
            trails.insert(name.clone(), values);
        }
        trails
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            method: self.method_name().to_string(),
            training_samples: self.training_data.len(),
            zscore_history: self.zscore.history_len(),
            iforest_fitted: self.iforest.is_fitted,
            changepoint_enabled: self.changepoint.is_some(),
        }
    }

    /// Drop all learned state: training ring, z-score history and the
    /// fitted forest.
    pub fn reset(&mut self) {
        self.training_data.clear();
        self.zscore.reset();
        self.iforest.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnomalyConfig;

    fn features(rps: f64, err: f64) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("rps".to_string(), rps);
        m.insert("error_rate".to_string(), err);
        m
    }

    fn config(method: DetectionMethod) -> AnomalyConfig {
        AnomalyConfig {
            method,
            features: vec!["rps".to_string(), "error_rate".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_iforest_only_neutral_before_fit() {
        let mut mgr = DetectorManager::new(&config(DetectionMethod::IsolationForest));
        let result = mgr.detect(&features(10.0, 0.0));
        assert!(!result.is_anomaly);
        assert_eq!(result.anomaly_score, 0.0);
        assert_eq!(result.method, "isolation_forest");
    }

    #[test]
    fn test_training_triggers_fit_once() {
        let mut mgr = DetectorManager::new(&config(DetectionMethod::Hybrid));
        for i in 0..49 {
            mgr.detect(&features(10.0 + (i % 5) as f64, 0.01));
            assert!(!mgr.stats().iforest_fitted);
        }
        mgr.detect(&features(10.0, 0.01));
        assert!(mgr.stats().iforest_fitted);
    }

    #[test]
    fn test_hybrid_fuses_or_and_max() {
        let mut mgr = DetectorManager::new(&config(DetectionMethod::Hybrid));
        for i in 0..120 {
            mgr.detect(&features(10.0 + (i % 7) as f64, 0.01));
        }
        let result = mgr.detect(&features(10_000.0, 0.9));
        assert!(result.is_anomaly);
        assert!(result.anomaly_score > 1.0);
        let details = result.details.as_object().unwrap();
        assert!(details.contains_key("zscore"));
        assert!(details.contains_key("isolation_forest"));
    }

    #[test]
    fn test_changepoint_overlay_does_not_flip_verdict() {
        let mut mgr = DetectorManager::new(&config(DetectionMethod::Zscore));
        // Flat then shifted trail: change point without a z-score outlier at
        // the decision moment.
        for _ in 0..60 {
            mgr.detect(&features(100.0, 0.0));
        }
        let mut last = Detection::neutral("zscore");
        for _ in 0..60 {
            last = mgr.detect(&features(20.0, 0.0));
        }
        let overlay = &last.details["changepoint"];
        assert_eq!(overlay["has_changepoint"], json!(true));
        // Overlay present while the fused verdict stayed quiet.
        assert!(!last.is_anomaly);
    }

    #[test]
    fn test_training_ring_is_bounded() {
        let mut cfg = config(DetectionMethod::Zscore);
        cfg.max_training_samples = 100;
        let mut mgr = DetectorManager::new(&cfg);
        for i in 0..500 {
            mgr.detect(&features(i as f64, 0.0));
        }
        assert_eq!(mgr.stats().training_samples, 100);
    }

    #[test]
    fn test_reset_clears_training() {
        let mut mgr = DetectorManager::new(&config(DetectionMethod::Hybrid));
        for _ in 0..60 {
            mgr.detect(&features(10.0, 0.0));
        }
        assert!(mgr.stats().iforest_fitted);
        mgr.reset();
        let stats = mgr.stats();
        assert_eq!(stats.training_samples, 0);
        assert!(!stats.iforest_fitted);
        assert_eq!(stats.zscore_history, 0);
    }
}
