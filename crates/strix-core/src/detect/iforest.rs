//! Isolation-forest detection for multivariate feature maps.
//!
//! An ensemble of random axis-parallel trees built over subsamples of the
//! training set. Outliers isolate in few splits, so a short average path
//! length maps to a score near 1. Scores live in [0, 1]; values above the
//! fitted threshold (never below 0.5) are anomalous.

use std::collections::HashMap;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;

use crate::config::IsolationForestConfig;
use crate::stats;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

pub struct IsolationForestDetector {
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub is_fitted: bool,
    feature_names: Vec<String>,
    trees: Vec<Node>,
    sample_size: usize,
    score_threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IForestReport {
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub is_fitted: bool,
    pub score_threshold: f64,
}

enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationForestDetector {
    pub fn new(config: &IsolationForestConfig) -> Self {
        Self {
            contamination: config.contamination,
            n_estimators: config.n_estimators.max(1),
            max_samples: config.max_samples.max(2),
            is_fitted: false,
            feature_names: Vec::new(),
            trees: Vec::new(),
            sample_size: 0,
            score_threshold: 0.5,
        }
    }

    /// Fit the forest over accumulated feature maps. Missing features
    /// contribute 0.0 to their vector slot.
    pub fn fit(&mut self, samples: &[HashMap<String, f64>], feature_names: &[String]) {
        self.feature_names = feature_names.to_vec();
        let points: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| self.assemble_vector(s))
            .collect();
        if points.len() < 2 || self.feature_names.is_empty() {
            return;
        }

        let mut rng = rand::rng();
        self.sample_size = self.max_samples.min(points.len());
        let height_limit = (self.sample_size as f64).log2().ceil().max(1.0) as usize;

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let subsample: Vec<&Vec<f64>> = points
                    .choose_multiple(&mut rng, self.sample_size)
                    .collect();
                build_tree(&subsample, 0, height_limit, &mut rng)
            })
            .collect();
        self.is_fitted = true;

        // Calibrate the decision threshold so roughly `contamination` of the
        // training set scores as anomalous, but never below the canonical
        // 0.5 boundary.
        let train_scores: Vec<f64> = points.iter().map(|p| self.raw_score(p)).collect();
        let quantile = (1.0 - self.contamination).clamp(0.0, 1.0) * 100.0;
        self.score_threshold = stats::percentile(&train_scores, quantile).max(0.5);
    }

    fn assemble_vector(&self, features: &HashMap<String, f64>) -> Vec<f64> {
        self.feature_names
            .iter()
            .map(|name| features.get(name).copied().unwrap_or(0.0))
            .collect()
    }

    fn raw_score(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let avg_path: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(point, tree, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        let norm = average_path_length(self.sample_size);
        if norm == 0.0 {
            return 0.0;
        }
        2f64.powf(-avg_path / norm)
    }

    /// Score one feature map. Before fitting this is a neutral no-op.
    pub fn detect(&self, features: &HashMap<String, f64>) -> IForestReport {
        if !self.is_fitted {
            return IForestReport {
                is_anomaly: false,
                anomaly_score: 0.0,
                is_fitted: false,
                score_threshold: self.score_threshold,
            };
        }

        let point = self.assemble_vector(features);
        let score = self.raw_score(&point);
        IForestReport {
            is_anomaly: score > self.score_threshold,
            anomaly_score: score,
            is_fitted: true,
            score_threshold: self.score_threshold,
        }
    }

    pub fn reset(&mut self) {
        self.is_fitted = false;
        self.trees.clear();
        self.sample_size = 0;
        self.score_threshold = 0.5;
    }
}

fn build_tree<R: Rng>(points: &[&Vec<f64>], depth: usize, limit: usize, rng: &mut R) -> Node {
    if depth >= limit || points.len() <= 1 {
        return Node::Leaf { size: points.len() };
    }

    let dims = points[0].len();
    // Only dimensions with spread can split the set.
    let splittable: Vec<usize> = (0..dims)
        .filter(|&d| {
            let lo = points.iter().map(|p| p[d]).fold(f64::INFINITY, f64::min);
            let hi = points.iter().map(|p| p[d]).fold(f64::NEG_INFINITY, f64::max);
            hi > lo
        })
        .collect();
    let feature = match splittable.choose(rng) {
        Some(d) => *d,
        None => return Node::Leaf { size: points.len() },
    };

    let lo = points.iter().map(|p| p[feature]).fold(f64::INFINITY, f64::min);
    let hi = points
        .iter()
        .map(|p| p[feature])
        .fold(f64::NEG_INFINITY, f64::max);
    let split = rng.random_range(lo..hi);

    let (left, right): (Vec<&Vec<f64>>, Vec<&Vec<f64>>) =
        points.iter().copied().partition(|p| p[feature] < split);

    Node::Internal {
        feature,
        split,
        left: Box::new(build_tree(&left, depth + 1, limit, rng)),
        right: Box::new(build_tree(&right, depth + 1, limit, rng)),
    }
}

fn path_length(point: &[f64], node: &Node, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Internal {
            feature,
            split,
            left,
            right,
        } => {
            if point.get(*feature).copied().unwrap_or(0.0) < *split {
                path_length(point, left, depth + 1)
            } else {
                path_length(point, right, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points,
/// the normalization constant from the isolation-forest paper.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
}
