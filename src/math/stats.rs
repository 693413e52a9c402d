//! Sample statistics.
//!
//! Percentiles use linear interpolation between closest ranks, i.e. the
//! position of percentile `q` in a sorted sample of length `n` is
//! `q / 100 * (n - 1)`.

/// Percentile `q` (in `[0, 100]`) of an ascending-sorted, non-empty slice.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Several percentiles of an unsorted sample of finite values.
pub fn percentiles(values: &[f64], qs: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    qs.iter().map(|&q| percentile_sorted(&sorted, q)).collect()
}
