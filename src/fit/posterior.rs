//! Probability model: flat box prior + Gaussian chi-square likelihood.
//!
//! The likelihood of parameters `θ` given observations `y ± σ` is
//!
//! ```text
//! ln L(θ | y) = -χ² / 2,   χ² = Σ ((model_i(θ) - y_i) / σ_i)²
//! ```
//!
//! where `model(θ)` is interpolated from the track grid. The grid may carry
//! more variables than were observed (derived quantities such as radius); only
//! the leading `len(y)` entries enter `χ²`, but the full vector is returned as
//! the draw's blob.

use std::sync::Arc;

use crate::domain::Limit;
use crate::error::FitError;
use crate::grid::TrackGrid;

/// Flat prior: `0` inside every limit, `-inf` as soon as one value is outside.
pub fn log_prior(theta: &[f64], limits: &[Limit]) -> f64 {
    for (value, limit) in theta.iter().zip(limits) {
        if !limit.contains(*value) {
            return f64::NEG_INFINITY;
        }
    }
    0.0
}

/// `χ²` over the leading `observed.len()` entries of `synthetic`.
///
/// NaN when the synthetic vector is too short to cover the observations.
pub fn chi_square(synthetic: &[f64], observed: &[f64], observed_err: &[f64]) -> f64 {
    if synthetic.len() < observed.len() {
        return f64::NAN;
    }
    synthetic
        .iter()
        .zip(observed)
        .zip(observed_err)
        .map(|((s, y), e)| ((s - y) / e).powi(2))
        .sum()
}

/// Log-likelihood and the full interpolated vector at `theta`.
pub fn log_likelihood(
    grid: &TrackGrid,
    theta: &[f64],
    observed: &[f64],
    observed_err: &[f64],
) -> (f64, Vec<f64>) {
    let synthetic = grid.interpolate(theta);
    let chi2 = chi_square(&synthetic, observed, observed_err);
    (-chi2 / 2.0, synthetic)
}

/// Prior + likelihood. Rejected points carry no blob.
///
/// The prior is checked first so that points outside the limits never reach
/// the interpolator.
pub fn log_posterior(
    grid: &TrackGrid,
    theta: &[f64],
    observed: &[f64],
    observed_err: &[f64],
    limits: &[Limit],
) -> (f64, Option<Vec<f64>>) {
    let lp = log_prior(theta, limits);
    if !lp.is_finite() {
        return (f64::NEG_INFINITY, None);
    }

    let (ll, blob) = log_likelihood(grid, theta, observed, observed_err);
    if !ll.is_finite() {
        return (f64::NEG_INFINITY, None);
    }

    (lp + ll, Some(blob))
}

/// The posterior of one run: a shared grid, the observations and the limits.
#[derive(Debug, Clone)]
pub struct PosteriorModel {
    grid: Arc<TrackGrid>,
    observed: Vec<f64>,
    observed_err: Vec<f64>,
    limits: Vec<Limit>,
}

impl PosteriorModel {
    pub fn new(
        grid: Arc<TrackGrid>,
        observed: Vec<f64>,
        observed_err: Vec<f64>,
        limits: Vec<Limit>,
    ) -> Result<Self, FitError> {
        if observed.len() != observed_err.len() {
            return Err(FitError::invalid(format!(
                "{} observed values but {} errors.",
                observed.len(),
                observed_err.len()
            )));
        }
        if observed.len() > grid.variables().len() {
            return Err(FitError::invalid(format!(
                "{} observables but the grid only provides {} variables.",
                observed.len(),
                grid.variables().len()
            )));
        }
        if let Some(e) = observed_err.iter().find(|e| !(e.is_finite() && **e > 0.0)) {
            return Err(FitError::invalid(format!(
                "Observation errors must be finite and > 0 (got {e})."
            )));
        }
        if limits.len() != grid.parameters().len() {
            return Err(FitError::invalid(format!(
                "{} limits for {} grid parameters.",
                limits.len(),
                grid.parameters().len()
            )));
        }
        Ok(Self {
            grid,
            observed,
            observed_err,
            limits,
        })
    }

    pub fn grid(&self) -> &TrackGrid {
        &self.grid
    }

    pub fn limits(&self) -> &[Limit] {
        &self.limits
    }

    /// Length of every accepted draw's blob.
    pub fn blob_len(&self) -> usize {
        self.grid.variables().len()
    }

    pub fn evaluate(&self, theta: &[f64]) -> (f64, Option<Vec<f64>>) {
        log_posterior(&self.grid, theta, &self.observed, &self.observed_err, &self.limits)
    }
}
