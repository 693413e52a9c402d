//! Grid construction from track tables.
//!
//! Given:
//! - the kept track tables
//! - ordered parameter names (grid axes) and variable names (grid values)
//! - explicit inclusive range filters on any table column
//!
//! we:
//! - mask the rows of every table by all filters (logical AND)
//! - stack the surviving parameter/variable columns into two matrices
//! - hand the matrices to a grid-construction function (`PixelGrid` by default)
//! - recompute the parameter limits from what the grid actually realized

use nalgebra::DMatrix;

use super::{Interpolator, PixelGrid, TrackGrid};
use crate::domain::{ColumnFilters, Limit};
use crate::error::FitError;
use crate::io::TrackTable;

/// Filtered, stacked grid input: `rows × params` and `rows × vars`.
#[derive(Debug, Clone)]
pub struct GridInputs {
    pub parameters: DMatrix<f64>,
    pub variables: DMatrix<f64>,
}

/// Apply the column filters and stack the surviving rows of every table.
pub fn stack_tables(
    tables: &[TrackTable],
    parameters: &[String],
    variables: &[String],
    filters: &ColumnFilters,
) -> Result<GridInputs, FitError> {
    let mut par_rows: Vec<f64> = Vec::new();
    let mut var_rows: Vec<f64> = Vec::new();
    let mut n_rows = 0usize;

    for table in tables {
        let filter_columns = filters
            .iter()
            .map(|(name, limit)| table.column(name).map(|col| (col, *limit)))
            .collect::<Result<Vec<_>, FitError>>()?;
        let par_columns = parameters
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<Vec<_>, FitError>>()?;
        let var_columns = variables
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<Vec<_>, FitError>>()?;

        let mut kept = 0usize;
        for row in 0..table.n_rows() {
            let in_range = filter_columns
                .iter()
                .all(|(col, limit)| limit.contains(col[row]));
            // Rows without finite coordinates cannot be placed on an axis.
            let placeable = par_columns.iter().all(|col| col[row].is_finite());
            if !(in_range && placeable) {
                continue;
            }
            par_rows.extend(par_columns.iter().map(|col| col[row]));
            var_rows.extend(var_columns.iter().map(|col| col[row]));
            kept += 1;
        }

        if kept == 0 {
            log::debug!("skipping {}: no rows within the column filters", table.name);
            continue;
        }
        log::debug!("kept {kept} of {} rows from {}", table.n_rows(), table.name);
        n_rows += kept;
    }

    if n_rows == 0 {
        return Err(FitError::EmptyGrid);
    }

    Ok(GridInputs {
        parameters: DMatrix::from_row_slice(n_rows, parameters.len(), &par_rows),
        variables: DMatrix::from_row_slice(n_rows, variables.len(), &var_rows),
    })
}

/// Build a grid with the default `PixelGrid` interpolator.
pub fn build_grid(
    tables: &[TrackTable],
    parameters: &[String],
    variables: &[String],
    filters: &ColumnFilters,
) -> Result<TrackGrid, FitError> {
    build_grid_with(tables, parameters, variables, filters, |p, v| {
        let pixels = PixelGrid::from_scattered(p, v)?;
        log::debug!(
            "pixel grid: {} of {} lattice cells filled",
            pixels.filled_cells(),
            pixels.total_cells()
        );
        Ok(Box::new(pixels) as Box<dyn Interpolator>)
    })
}

/// Build a grid with a caller-supplied grid-construction function.
pub fn build_grid_with<F>(
    tables: &[TrackTable],
    parameters: &[String],
    variables: &[String],
    filters: &ColumnFilters,
    construct: F,
) -> Result<TrackGrid, FitError>
where
    F: FnOnce(&DMatrix<f64>, &DMatrix<f64>) -> Result<Box<dyn Interpolator>, FitError>,
{
    if parameters.is_empty() {
        return Err(FitError::invalid("At least one grid parameter is required."));
    }
    let inputs = stack_tables(tables, parameters, variables, filters)?;
    let interpolator = construct(&inputs.parameters, &inputs.variables)?;

    let grid = TrackGrid::new(parameters.to_vec(), variables.to_vec(), interpolator)?;
    let shape: Vec<String> = (0..parameters.len())
        .map(|d| format!("{}={}", parameters[d], grid.axis_values(d).len()))
        .collect();
    log::info!(
        "grid built from {} track points: axes [{}], {} variables",
        inputs.parameters.nrows(),
        shape.join(", "),
        variables.len()
    );
    Ok(grid)
}

/// Limits matching the realized grid, clipped to the requested limits.
///
/// Grid construction can shrink the usable range (e.g. sparse coverage at
/// high metallicity), so sampling must use these rather than the requested
/// values. The result is always contained in `requested`.
pub fn adapt_limits(grid: &TrackGrid, requested: &[Limit]) -> Result<Vec<Limit>, FitError> {
    if requested.len() != grid.parameters().len() {
        return Err(FitError::invalid(format!(
            "Got {} limits for {} grid parameters.",
            requested.len(),
            grid.parameters().len()
        )));
    }
    grid.extents()
        .iter()
        .zip(requested)
        .zip(grid.parameters())
        .map(|((realized, wanted), name)| {
            realized.intersect(wanted).ok_or_else(|| {
                FitError::invalid(format!(
                    "Requested {name} range [{}, {}] does not overlap the grid range [{}, {}].",
                    wanted.min, wanted.max, realized.min, realized.max
                ))
            })
        })
        .collect()
}
