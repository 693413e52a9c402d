//! Pixel-type grid: scattered track points placed on a regular axis lattice.
//!
//! Every parameter axis holds the sorted unique coordinates that occur in the
//! input rows. The lattice is the cartesian product of those axes; cells with
//! no input row stay empty (NaN). Evolutionary tracks are irregular, so the
//! lattice is typically sparse.
//!
//! Queries use multilinear interpolation over the `2^D` cells surrounding the
//! coordinate. A query is NaN when it lies outside an axis range or when any
//! cell with non-zero weight is empty.

use nalgebra::DMatrix;

use super::Interpolator;
use crate::error::FitError;

/// Upper bound on the number of stored `f64` values (2 GiB).
const MAX_GRID_VALUES: usize = 1 << 28;

#[derive(Debug, Clone)]
pub struct PixelGrid {
    axes: Vec<Vec<f64>>,
    /// Row-major cell strides, last axis fastest.
    strides: Vec<usize>,
    n_values: usize,
    cells: Vec<f64>,
}

impl PixelGrid {
    /// Build a grid from `rows × D` parameter and `rows × V` variable matrices.
    ///
    /// Rows sharing the same coordinates overwrite each other; the last wins.
    pub fn from_scattered(parameters: &DMatrix<f64>, variables: &DMatrix<f64>) -> Result<Self, FitError> {
        let n_rows = parameters.nrows();
        if n_rows == 0 || parameters.ncols() == 0 {
            return Err(FitError::EmptyGrid);
        }
        if variables.nrows() != n_rows {
            return Err(FitError::invalid(format!(
                "Parameter matrix has {n_rows} rows but variable matrix has {}.",
                variables.nrows()
            )));
        }
        if parameters.iter().any(|v| !v.is_finite()) {
            return Err(FitError::invalid("Grid coordinates must be finite."));
        }

        let axes: Vec<Vec<f64>> = parameters
            .column_iter()
            .map(|col| {
                let mut axis: Vec<f64> = col.iter().copied().collect();
                axis.sort_by(f64::total_cmp);
                axis.dedup();
                axis
            })
            .collect();

        let n_values = variables.ncols();
        let mut strides = vec![1usize; axes.len()];
        for d in (0..axes.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1]
                .checked_mul(axes[d + 1].len())
                .ok_or_else(|| too_large(&axes, n_values))?;
        }
        let total = strides[0]
            .checked_mul(axes[0].len())
            .and_then(|cells| cells.checked_mul(n_values.max(1)))
            .ok_or_else(|| too_large(&axes, n_values))?;
        if total > MAX_GRID_VALUES {
            return Err(too_large(&axes, n_values));
        }

        let mut cells = vec![f64::NAN; total];
        for r in 0..n_rows {
            let mut cell = 0usize;
            for (d, axis) in axes.iter().enumerate() {
                let x = parameters[(r, d)];
                // Every coordinate is on its own axis by construction.
                let i = axis.binary_search_by(|v| v.total_cmp(&x)).unwrap_or(0);
                cell += i * strides[d];
            }
            let base = cell * n_values;
            for v in 0..n_values {
                cells[base + v] = variables[(r, v)];
            }
        }

        Ok(Self {
            axes,
            strides,
            n_values,
            cells,
        })
    }

    /// Number of lattice cells holding data.
    pub fn filled_cells(&self) -> usize {
        if self.n_values == 0 {
            return 0;
        }
        self.cells
            .chunks(self.n_values)
            .filter(|c| c.iter().any(|v| !v.is_nan()))
            .count()
    }

    pub fn total_cells(&self) -> usize {
        self.axes.iter().map(Vec::len).product()
    }

    fn cell(&self, index: usize) -> &[f64] {
        &self.cells[index * self.n_values..(index + 1) * self.n_values]
    }
}

fn too_large(axes: &[Vec<f64>], n_values: usize) -> FitError {
    let shape: Vec<String> = axes.iter().map(|a| a.len().to_string()).collect();
    FitError::GridTooLarge(format!(
        "lattice {} x {n_values} values exceeds {MAX_GRID_VALUES}; narrow the parameter limits",
        shape.join(" x ")
    ))
}

impl Interpolator for PixelGrid {
    fn n_dims(&self) -> usize {
        self.axes.len()
    }

    fn n_values(&self) -> usize {
        self.n_values
    }

    fn axis_values(&self, axis: usize) -> &[f64] {
        &self.axes[axis]
    }

    fn query(&self, coords: &[f64]) -> Vec<f64> {
        let nan = vec![f64::NAN; self.n_values];
        if coords.len() != self.axes.len() {
            return nan;
        }

        // Lower bracket index and fractional offset per axis.
        let mut lower = Vec::with_capacity(coords.len());
        let mut frac = Vec::with_capacity(coords.len());
        for (axis, &x) in self.axes.iter().zip(coords) {
            let (first, last) = (axis[0], axis[axis.len() - 1]);
            if !(x >= first && x <= last) {
                return nan;
            }
            if axis.len() == 1 {
                lower.push(0);
                frac.push(0.0);
                continue;
            }
            let i = axis.partition_point(|v| *v <= x);
            let lo = (i - 1).min(axis.len() - 2);
            lower.push(lo);
            frac.push((x - axis[lo]) / (axis[lo + 1] - axis[lo]));
        }

        let mut out = vec![0.0; self.n_values];
        for corner in 0..(1usize << coords.len()) {
            let mut weight = 1.0;
            let mut cell = 0usize;
            for d in 0..coords.len() {
                let upper = (corner >> d) & 1 == 1;
                weight *= if upper { frac[d] } else { 1.0 - frac[d] };
                cell += (lower[d] + usize::from(upper)) * self.strides[d];
            }
            // Zero-weight corners may lie past the axis end or be empty.
            if weight == 0.0 {
                continue;
            }
            for (acc, v) in out.iter_mut().zip(self.cell(cell)) {
                *acc += weight * v;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2d() -> PixelGrid {
        // f(x, y) = x + 10 y on a full 3 x 2 lattice, second value = 1.
        let params = DMatrix::from_row_slice(
            6,
            2,
            &[0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0],
        );
        let vars = DMatrix::from_row_slice(
            6,
            2,
            &[0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 10.0, 1.0, 11.0, 1.0, 12.0, 1.0],
        );
        PixelGrid::from_scattered(&params, &vars).unwrap()
    }

    #[test]
    fn single_point_grid_returns_stored_value() {
        let params = DMatrix::from_row_slice(1, 1, &[1.0]);
        let vars = DMatrix::from_row_slice(1, 1, &[2.0]);
        let grid = PixelGrid::from_scattered(&params, &vars).unwrap();
        assert_eq!(grid.query(&[1.0]), vec![2.0]);
        assert!(grid.query(&[1.5])[0].is_nan());
    }

    #[test]
    fn grid_points_round_trip() {
        let grid = grid_2d();
        assert_eq!(grid.query(&[2.0, 1.0]), vec![12.0, 1.0]);
        assert_eq!(grid.query(&[0.0, 0.0]), vec![0.0, 1.0]);
        assert_eq!(grid.query(&[1.0, 1.0]), vec![11.0, 1.0]);
    }

    #[test]
    fn multilinear_between_points() {
        let grid = grid_2d();
        let v = grid.query(&[1.5, 0.25]);
        assert!((v[0] - 4.0).abs() < 1e-12);
        assert!((v[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn outside_coverage_is_nan() {
        let grid = grid_2d();
        assert!(grid.query(&[-0.1, 0.5]).iter().all(|v| v.is_nan()));
        assert!(grid.query(&[1.0, 1.5]).iter().all(|v| v.is_nan()));
        assert!(grid.query(&[f64::NAN, 0.5]).iter().all(|v| v.is_nan()));
        assert!(grid.query(&[1.0]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sparse_cells_only_poison_their_neighbourhood() {
        // L-shaped coverage: (0,0), (1,0), (0,1); cell (1,1) is empty.
        let params = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let vars = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let grid = PixelGrid::from_scattered(&params, &vars).unwrap();

        assert_eq!(grid.filled_cells(), 3);
        assert_eq!(grid.total_cells(), 4);
        assert_eq!(grid.query(&[1.0, 0.0]), vec![2.0]);
        assert!((grid.query(&[0.5, 0.0])[0] - 1.5).abs() < 1e-12);
        assert!(grid.query(&[0.5, 0.5])[0].is_nan());
    }

    #[test]
    fn empty_input_is_rejected() {
        let params = DMatrix::<f64>::zeros(0, 2);
        let vars = DMatrix::<f64>::zeros(0, 1);
        assert!(matches!(
            PixelGrid::from_scattered(&params, &vars),
            Err(FitError::EmptyGrid)
        ));
    }
}
