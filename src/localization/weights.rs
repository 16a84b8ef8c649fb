//! Importance-weight bookkeeping shared by the particle filters

use rand::Rng;

/// Fold per-particle log-likelihoods into normalized weights (log-sum-exp)
///
/// Returns `false` and leaves `weights` untouched when every particle has
/// zero likelihood.
pub(crate) fn apply_log_likelihoods(weights: &mut [f64], log_likelihoods: &[f64]) -> bool {
    let log_w: Vec<f64> = weights
        .iter()
        .zip(log_likelihoods)
        .map(|(w, ll)| if *w > 0.0 { w.ln() + ll } else { f64::NEG_INFINITY })
        .collect();
    let max = log_w.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return false;
    }
    let sum: f64 = log_w.iter().map(|lw| (lw - max).exp()).sum();
    for (w, lw) in weights.iter_mut().zip(&log_w) {
        *w = (lw - max).exp() / sum;
    }
    true
}

pub(crate) fn normalize(weights: &mut [f64]) -> bool {
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0) {
        return false;
    }
    for w in weights.iter_mut() {
        *w /= sum;
    }
    true
}

pub(crate) fn effective_sample_size(weights: &[f64]) -> f64 {
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq > 0.0 {
        1.0 / sum_sq
    } else {
        0.0
    }
}

/// Low-variance (systematic) resampling; returns the surviving particle indices
pub(crate) fn low_variance_indices<R: Rng>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let step = 1.0 / n as f64;
    let mut r = rng.gen::<f64>() * step;
    let mut cumulative = weights[0];
    let mut idx = 0;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        while r > cumulative && idx < n - 1 {
            idx += 1;
            cumulative += weights[idx];
        }
        out.push(idx);
        r += step;
    }
    out
}

/// Weighted mean and standard deviation of a scalar
pub(crate) fn weighted_stats(values: &[f64], weights: &[f64]) -> (f64, f64) {
    let mean: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    let var: f64 = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum();
    (mean, var.max(0.0).sqrt())
}
