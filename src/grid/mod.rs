//! Interpolatable parameter → observable grids.
//!
//! Responsibilities:
//!
//! - the `Interpolator` contract the posterior model evaluates against
//! - `TrackGrid`: an interpolator plus the parameter/variable names it was built for
//! - building grids from track tables (`builder`) with the default `PixelGrid`
//!
//! A grid is immutable once built and is shared as `Arc<TrackGrid>`, so any
//! number of walkers can evaluate it concurrently without locking.

use std::sync::{Arc, PoisonError, RwLock};

use rayon::prelude::*;

use crate::domain::Limit;
use crate::error::FitError;

pub mod builder;
pub mod pixel;

pub use builder::*;
pub use pixel::*;

/// Evaluates observables at parameter coordinates.
///
/// Implementations must return NaN (component-wise) outside their populated
/// coverage instead of failing, and must be safe to query from many threads.
pub trait Interpolator: Send + Sync + std::fmt::Debug {
    fn n_dims(&self) -> usize;

    fn n_values(&self) -> usize;

    /// Realized coordinates along one axis, ascending.
    fn axis_values(&self, axis: usize) -> &[f64];

    fn query(&self, coords: &[f64]) -> Vec<f64>;

    fn query_many(&self, points: &[Vec<f64>]) -> Vec<Vec<f64>> {
        points.par_iter().map(|p| self.query(p)).collect()
    }
}

/// An interpolator labelled with the names of its axes and values.
#[derive(Debug)]
pub struct TrackGrid {
    parameters: Vec<String>,
    variables: Vec<String>,
    interpolator: Box<dyn Interpolator>,
}

impl TrackGrid {
    pub fn new(
        parameters: Vec<String>,
        variables: Vec<String>,
        interpolator: Box<dyn Interpolator>,
    ) -> Result<Self, FitError> {
        if interpolator.n_dims() != parameters.len() || interpolator.n_values() != variables.len() {
            return Err(FitError::invalid(format!(
                "Interpolator shape ({} dims, {} values) does not match {} parameters / {} variables.",
                interpolator.n_dims(),
                interpolator.n_values(),
                parameters.len(),
                variables.len()
            )));
        }
        // Extents and tracks read the first and last value of every axis.
        if (0..parameters.len()).any(|d| interpolator.axis_values(d).is_empty()) {
            return Err(FitError::EmptyGrid);
        }
        Ok(Self {
            parameters,
            variables,
            interpolator,
        })
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn axis_values(&self, axis: usize) -> &[f64] {
        self.interpolator.axis_values(axis)
    }

    /// Realized `[min, max]` per parameter axis.
    pub fn extents(&self) -> Vec<Limit> {
        (0..self.parameters.len())
            .map(|d| {
                let axis = self.axis_values(d);
                Limit::new(axis[0], axis[axis.len() - 1])
            })
            .collect()
    }

    pub fn interpolate(&self, coords: &[f64]) -> Vec<f64> {
        self.interpolator.query(coords)
    }

    pub fn interpolate_many(&self, points: &[Vec<f64>]) -> Vec<Vec<f64>> {
        self.interpolator.query_many(points)
    }

    /// Interpolated values paired with their variable names.
    pub fn interpolate_named(&self, coords: &[f64]) -> Vec<(String, f64)> {
        self.variables
            .iter()
            .cloned()
            .zip(self.interpolate(coords))
            .collect()
    }

    /// Evaluate the grid along every realized value of `axis`, holding the
    /// other coordinates of `point` fixed.
    ///
    /// With `axis` = phase this yields an evolutionary track for a fixed
    /// initial mass and metallicity.
    pub fn track(&self, point: &[f64], axis: usize) -> Result<Vec<(f64, Vec<f64>)>, FitError> {
        if point.len() != self.parameters.len() || axis >= self.parameters.len() {
            return Err(FitError::invalid(format!(
                "Track needs {} coordinates and an axis below {}.",
                self.parameters.len(),
                self.parameters.len()
            )));
        }
        let points: Vec<Vec<f64>> = self
            .axis_values(axis)
            .iter()
            .map(|&x| {
                let mut p = point.to_vec();
                p[axis] = x;
                p
            })
            .collect();
        let values = self.interpolate_many(&points);
        Ok(points.into_iter().map(|p| p[axis]).zip(values).collect())
    }
}

static DEFAULT_GRID: RwLock<Option<Arc<TrackGrid>>> = RwLock::new(None);

/// Register `grid` as the process-wide default.
pub fn set_default_grid(grid: Arc<TrackGrid>) {
    *DEFAULT_GRID.write().unwrap_or_else(PoisonError::into_inner) = Some(grid);
}

pub fn clear_default_grid() {
    *DEFAULT_GRID.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// The grid last passed to `set_default_grid`, if any.
pub fn default_grid() -> Option<Arc<TrackGrid>> {
    DEFAULT_GRID
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
