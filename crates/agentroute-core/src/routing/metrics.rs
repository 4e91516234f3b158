//! Numeric helpers shared by both engines
//!
//! Softmax with max-subtraction, plus the distribution metrics used to
//! report expert load balance.

/// Softmax over a row, stabilized by subtracting the row maximum
///
/// An empty row yields an empty vector. A row containing non-finite values
/// falls back to the uniform distribution.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        let uniform = 1.0 / values.len() as f64;
        return vec![uniform; values.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Softmax probability of a single index
pub fn softmax_at(values: &[f64], index: usize) -> f64 {
    softmax(values).get(index).copied().unwrap_or(0.0)
}

/// In-place temperature-scaled softmax for the gating network's f32 buffers
pub fn softmax_in_place(values: &mut [f32], temperature: f32) {
    if values.is_empty() {
        return;
    }
    let t = if temperature > 0.0 { temperature } else { 1.0 };
    let max = values
        .iter()
        .map(|v| v / t)
        .fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v / t - max).exp();
        sum += *v;
    }
    if !sum.is_finite() || sum <= 0.0 {
        let uniform = 1.0 / values.len() as f32;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    values.iter_mut().for_each(|v| *v /= sum);
}

/// Shannon entropy (natural log) of a probability vector
pub fn entropy(probabilities: &[f32]) -> f32 {
    probabilities
        .iter()
        .filter(|p| **p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}

/// Gini coefficient of a count distribution
///
/// 0 means perfectly even; values approach 1 as a single bucket takes
/// everything. An all-zero distribution is reported as 0.
pub fn gini(counts: &[u64]) -> f64 {
    let n = counts.len();
    let total: u64 = counts.iter().sum();
    if n == 0 || total == 0 {
        return 0.0;
    }
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, &c)| (2.0 * (i as f64 + 1.0) - n as f64 - 1.0) * c as f64)
        .sum();
    weighted / (n as f64 * total as f64)
}

/// Coefficient of variation (population std / mean) of a count distribution
pub fn coefficient_of_variation(counts: &[u64]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<u64>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}
