//! Shared descriptive-statistics helpers.
//!
//! Small building blocks used by the preprocessor, the feature engineer and
//! the detectors. All of them are total: empty input yields 0.0 (or an empty
//! vector) rather than NaN.

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0.0 for fewer than one sample.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Linear-interpolation percentile over an unsorted slice, `p` in [0, 100].
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Median via [`percentile`].
pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Minimum; 0.0 for an empty slice.
pub fn min(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Maximum; 0.0 for an empty slice.
pub fn max(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Moving average as a same-length convolution with a box kernel.
///
/// Matches zero-padded "same" convolution semantics: the window is centered
/// on each index and out-of-range taps contribute zero, so values taper
/// toward the edges.
pub fn convolve_same(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() || window == 0 {
        return values.to_vec();
    }
    let weight = 1.0 / window as f64;
    let half = (window - 1) / 2;

    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let start = i.saturating_sub(half);
        let end = (i + window - half).min(values.len());
        let sum: f64 = values[start..end].iter().sum();
        out.push(sum * weight);
    }
    out
}

/// Centered rolling statistic with whole-series fill where the window does
/// not fully fit. `stat` receives each complete centered window.
pub fn rolling_centered<F>(values: &[f64], window: usize, stat: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let fill = stat(values);
    if values.len() < window || window == 0 {
        return vec![fill; values.len()];
    }

    // Window covering [i - (w-1)/2, i + w/2], the centered-label convention.
    let left = (window - 1) / 2;
    let right = window / 2;

    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i >= left && i + right < values.len() {
            out.push(stat(&values[i - left..=i + right]));
        } else {
            out.push(fill);
        }
    }
    out
}

/// Exponential moving average seeded from the first value.
/// `alpha` defaults to `2 / (window + 1)` when not given.
pub fn ema(values: &[f64], alpha: Option<f64>, window: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let alpha = alpha.unwrap_or(2.0 / (window as f64 + 1.0));

    let mut out = Vec::with_capacity(values.len());
    out.push(values[0]);
    for i in 1..values.len() {
        let prev = out[i - 1];
        out.push(alpha * values[i] + (1.0 - alpha) * prev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_std() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
        assert!((std_dev(&[2.0, 4.0]) - 1.0).abs() < 1e-12);
        assert_eq!(std_dev(&[5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 4.0);
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
        assert!((median(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_convolve_same_length_and_edges() {
        let v = [1.0, 1.0, 1.0, 1.0, 1.0];
        let out = convolve_same(&v, 3);
        assert_eq!(out.len(), v.len());
        // Interior taps see the full kernel, edges taper.
        assert!((out[2] - 1.0).abs() < 1e-12);
        assert!(out[0] < 1.0);
    }

    #[test]
    fn test_rolling_centered_fill() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = rolling_centered(&v, 3, mean);
        // Center positions get the window mean, edges the whole-series mean.
        assert!((out[2] - 3.0).abs() < 1e-12);
        assert!((out[0] - 3.0).abs() < 1e-12);

        let short = rolling_centered(&[1.0, 2.0], 5, mean);
        assert_eq!(short, vec![1.5, 1.5]);
    }

    #[test]
    fn test_ema_seeded_from_first() {
        let out = ema(&[10.0, 20.0], Some(0.5), 0);
        assert_eq!(out[0], 10.0);
        assert!((out[1] - 15.0).abs() < 1e-12);
        assert!(ema(&[], None, 5).is_empty());
    }
}
