//! Initial walker positions.
//!
//! Walkers start uniformly inside the adapted limits. Age-like parameters are
//! stored as `log10(age)`; drawing uniformly in log space would put most
//! walkers on very young stars, so those are drawn uniformly in linear age
//! and converted afterwards. This only affects the starting ensemble; the
//! prior used while sampling stays flat.

use rand::Rng;

use crate::domain::Limit;
use crate::error::FitError;

/// Parameter name used by the grids for `log10(age / yr)`.
pub const LOG_AGE: &str = "log_Age";

pub fn is_log_age(name: &str) -> bool {
    name.eq_ignore_ascii_case(LOG_AGE)
}

/// Draw `nwalkers` starting positions, one vector per walker.
pub fn initial_positions<R: Rng>(
    rng: &mut R,
    parameters: &[String],
    limits: &[Limit],
    nwalkers: usize,
) -> Result<Vec<Vec<f64>>, FitError> {
    if parameters.len() != limits.len() {
        return Err(FitError::invalid(format!(
            "{} parameters but {} limits.",
            parameters.len(),
            limits.len()
        )));
    }

    let mut columns = Vec::with_capacity(parameters.len());
    for (name, limit) in parameters.iter().zip(limits) {
        if !(limit.is_finite() && limit.min <= limit.max) {
            return Err(FitError::invalid(format!(
                "Cannot place walkers for {name}: limit [{}, {}] is not a finite range.",
                limit.min, limit.max
            )));
        }

        let column: Vec<f64> = if is_log_age(name) {
            let (lo, hi) = (10f64.powf(limit.min), 10f64.powf(limit.max));
            (0..nwalkers)
                .map(|_| rng.gen_range(lo..=hi).log10().clamp(limit.min, limit.max))
                .collect()
        } else {
            (0..nwalkers)
                .map(|_| rng.gen_range(limit.min..=limit.max))
                .collect()
        };
        columns.push(column);
    }

    Ok((0..nwalkers)
        .map(|w| columns.iter().map(|c| c[w]).collect())
        .collect())
}
