//! Numeric preprocessing: clip -> smooth -> scale.
//!
//! The three transforms are independent and applied in that order. Scaler
//! parameters are recorded per field name so a later batch can be projected
//! with the same affine map. Degenerate inputs (zero range, zero std, zero
//! IQR) yield sentinel arrays instead of NaN.

use std::collections::HashMap;

use serde_json::Value;

use crate::event::Event;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipMethod {
    Iqr,
    Zscore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothMethod {
    MovingAverage,
    Ema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMethod {
    Minmax,
    Standard,
    Robust,
}

/// Fields the preprocessor and feature engineer treat as metrics.
pub const NUMERIC_FIELDS: [&str; 3] = ["response_time", "cpu_usage", "memory_usage"];

pub struct Preprocessor {
    pub clip_outliers: bool,
    pub smoothing_window: usize,
    pub scaling_method: Option<ScaleMethod>,
    scaler_params: HashMap<String, HashMap<String, f64>>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            clip_outliers: true,
            smoothing_window: 5,
            scaling_method: None,
            scaler_params: HashMap::new(),
        }
    }
}

impl Preprocessor {
    pub fn new(
        clip_outliers: bool,
        smoothing_window: usize,
        scaling_method: Option<ScaleMethod>,
    ) -> Self {
        Self {
            clip_outliers,
            smoothing_window,
            scaling_method,
            scaler_params: HashMap::new(),
        }
    }

    /// Clip outliers to IQR or z-score bounds.
    pub fn clip_outlier_values(
        &self,
        values: &[f64],
        method: ClipMethod,
        multiplier: f64,
    ) -> Vec<f64> {
        if values.is_empty() {
            return Vec::new();
        }

        match method {
            ClipMethod::Iqr => {
                let q1 = stats::percentile(values, 25.0);
                let q3 = stats::percentile(values, 75.0);
                let iqr = q3 - q1;
                let lower = q1 - multiplier * iqr;
                let upper = q3 + multiplier * iqr;
                values.iter().map(|v| v.clamp(lower, upper)).collect()
            }
            ClipMethod::Zscore => {
                let mean = stats::mean(values);
                let std = stats::std_dev(values);
                if std == 0.0 {
                    return values.to_vec();
                }
                let lower = mean - multiplier * std;
                let upper = mean + multiplier * std;
                values
                    .iter()
                    .map(|v| {
                        let z = ((v - mean) / std).abs();
                        if z > multiplier { v.clamp(lower, upper) } else { *v }
                    })
                    .collect()
            }
        }
    }

    /// Smooth with a same-length moving average or an EMA seeded from the
    /// first value.
    pub fn smooth(&self, values: &[f64], method: SmoothMethod, window: Option<usize>) -> Vec<f64> {
        if values.is_empty() {
            return Vec::new();
        }
        let window = window.unwrap_or(self.smoothing_window);

        match method {
            SmoothMethod::MovingAverage => {
                if values.len() < window {
                    return values.to_vec();
                }
                stats::convolve_same(values, window)
            }
            SmoothMethod::Ema => {
                if values.len() < 2 {
                    return values.to_vec();
                }
                stats::ema(values, None, window)
            }
        }
    }

    /// Scale values, recording the parameters under `field_name`.
    pub fn scale(
        &mut self,
        values: &[f64],
        field_name: &str,
        method: Option<ScaleMethod>,
    ) -> Vec<f64> {
        if values.is_empty() {
            return Vec::new();
        }
        let method = match method.or(self.scaling_method) {
            Some(m) => m,
            None => return values.to_vec(),
        };

        match method {
            ScaleMethod::Minmax => {
                let min = stats::min(values);
                let max = stats::max(values);
                if max == min {
                    return vec![0.0; values.len()];
                }
                self.scaler_params.insert(
                    field_name.to_string(),
                    HashMap::from([("min".to_string(), min), ("max".to_string(), max)]),
                );
                values.iter().map(|v| (v - min) / (max - min)).collect()
            }
            ScaleMethod::Standard => {
                let mean = stats::mean(values);
                let std = stats::std_dev(values);
                if std == 0.0 {
                    return vec![0.5; values.len()];
                }
                self.scaler_params.insert(
                    field_name.to_string(),
                    HashMap::from([("mean".to_string(), mean), ("std".to_string(), std)]),
                );
                values.iter().map(|v| (v - mean) / std).collect()
            }
            ScaleMethod::Robust => {
                let median = stats::median(values);
                let q75 = stats::percentile(values, 75.0);
                let q25 = stats::percentile(values, 25.0);
                let iqr = q75 - q25;
                if iqr == 0.0 {
                    return vec![0.0; values.len()];
                }
                self.scaler_params.insert(
                    field_name.to_string(),
                    HashMap::from([("median".to_string(), median), ("iqr".to_string(), iqr)]),
                );
                values.iter().map(|v| (v - median) / iqr).collect()
            }
        }
    }

    /// Recorded scaler parameters for a field, if any.
    pub fn scaler_params(&self, field_name: &str) -> Option<&HashMap<String, f64>> {
        self.scaler_params.get(field_name)
    }

    /// Preprocess a single event. Scalar metric values are preserved as-is
    /// (window-level transforms handle them later) with the original copied
    /// to `<field>_original` in the extension map. Array values that arrive
    /// under a metric name in the extension map get the full
    /// clip/smooth/scale treatment.
    pub fn preprocess_event(&mut self, event: &Event) -> Event {
        let mut processed = event.clone();

        for field in NUMERIC_FIELDS {
            if let Some(value) = event.numeric_field(field) {
                processed.extra.insert(
                    format!("{}_original", field),
                    Value::from(value),
                );
                continue;
            }

            let array = event
                .extra
                .get(field)
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_f64).collect::<Vec<f64>>());
            if let Some(mut values) = array {
                if self.clip_outliers {
                    values = self.clip_outlier_values(&values, ClipMethod::Iqr, 1.5);
                }
                if self.smoothing_window > 1 {
                    values = self.smooth(&values, SmoothMethod::MovingAverage, None);
                }
                if self.scaling_method.is_some() {
                    values = self.scale(&values, field, None);
                }
                processed
                    .extra
                    .insert(field.to_string(), Value::from(values));
            }
        }

        processed
    }

    /// Preprocess a batch of events into per-field numeric columns. Missing
    /// or non-numeric entries become the column mean (0 when the whole
    /// column is missing), then clip / smooth / scale apply.
    pub fn preprocess_batch(
        &mut self,
        events: &[Event],
        fields: Option<&[&str]>,
    ) -> HashMap<String, Vec<f64>> {
        let mut columns = HashMap::new();
        if events.is_empty() {
            return columns;
        }
        let fields: Vec<&str> = fields
            .map(|f| f.to_vec())
            .unwrap_or_else(|| NUMERIC_FIELDS.to_vec());

        for field in fields {
            let raw: Vec<Option<f64>> =
                events.iter().map(|ev| ev.numeric_field(field)).collect();
            if raw.iter().all(Option::is_none) {
                continue;
            }

            let present: Vec<f64> = raw.iter().filter_map(|v| *v).collect();
            let fill = stats::mean(&present);
            let mut values: Vec<f64> = raw.iter().map(|v| v.unwrap_or(fill)).collect();

            if self.clip_outliers {
                values = self.clip_outlier_values(&values, ClipMethod::Iqr, 1.5);
            }
            if self.smoothing_window > 1 && values.len() > self.smoothing_window {
                values = self.smooth(&values, SmoothMethod::MovingAverage, None);
            }
            if self.scaling_method.is_some() {
                values = self.scale(&values, field, None);
            }

            columns.insert(field.to_string(), values);
        }

        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iqr_clip_bounds_extremes() {
        let pre = Preprocessor::default();
        let mut values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        values.push(10_000.0);
        let clipped = pre.clip_outlier_values(&values, ClipMethod::Iqr, 1.5);
        assert!(clipped.iter().copied().fold(f64::NEG_INFINITY, f64::max) < 10_000.0);
        // Interior values untouched.
        assert_eq!(clipped[0], 100.0);
    }

    #[test]
    fn test_zscore_clip_zero_std_is_identity() {
        let pre = Preprocessor::default();
        let values = vec![5.0; 10];
        assert_eq!(pre.clip_outlier_values(&values, ClipMethod::Zscore, 3.0), values);
    }

    #[test]
    fn test_smooth_short_input_passthrough() {
        let pre = Preprocessor::default();
        let values = vec![1.0, 2.0];
        assert_eq!(pre.smooth(&values, SmoothMethod::MovingAverage, Some(5)), values);
    }

    #[test]
    fn test_ema_smoothing() {
        let pre = Preprocessor::default();
        let out = pre.smooth(&[10.0, 20.0, 30.0], SmoothMethod::Ema, Some(3));
        assert_eq!(out[0], 10.0);
        assert!(out[1] > 10.0 && out[1] < 20.0);
    }

    #[test]
    fn test_minmax_scale_and_degenerate() {
        let mut pre = Preprocessor::default();
        let out = pre.scale(&[0.0, 5.0, 10.0], "rt", Some(ScaleMethod::Minmax));
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
        assert_eq!(pre.scaler_params("rt").unwrap()["max"], 10.0);

        let flat = pre.scale(&[3.0, 3.0], "flat", Some(ScaleMethod::Minmax));
        assert_eq!(flat, vec![0.0, 0.0]);
    }

    #[test]
    fn test_standard_scale_degenerate_is_half() {
        let mut pre = Preprocessor::default();
        let out = pre.scale(&[2.0, 2.0, 2.0], "x", Some(ScaleMethod::Standard));
        assert_eq!(out, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_robust_scale() {
        let mut pre = Preprocessor::default();
        let out = pre.scale(&[1.0, 2.0, 3.0, 4.0, 100.0], "y", Some(ScaleMethod::Robust));
        // Median maps to zero.
        assert!(out.iter().any(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_preprocess_event_preserves_scalars() {
        let mut pre = Preprocessor::default();
        let ev = Event {
            response_time: Some(120.0),
            ..Default::default()
        };
        let processed = pre.preprocess_event(&ev);
        assert_eq!(processed.response_time, Some(120.0));
        assert_eq!(
            processed.extra.get("response_time_original").and_then(Value::as_f64),
            Some(120.0)
        );
    }

    #[test]
    fn test_preprocess_batch_fills_missing_with_mean() {
        let mut pre = Preprocessor {
            clip_outliers: false,
            smoothing_window: 1,
            scaling_method: None,
            scaler_params: HashMap::new(),
        };
        let events = vec![
            Event { response_time: Some(100.0), ..Default::default() },
            Event::default(),
            Event { response_time: Some(200.0), ..Default::default() },
        ];
        let columns = pre.preprocess_batch(&events, None);
        let col = &columns["response_time"];
        assert_eq!(col.len(), 3);
        assert!((col[1] - 150.0).abs() < 1e-9);
        assert!(!columns.contains_key("cpu_usage"));
    }
}
