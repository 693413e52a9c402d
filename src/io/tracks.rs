//! Evolution-track table discovery and reading.
//!
//! Each model family ships one Parquet file per metallicity bin, e.g.
//! `MIST_vvcrit0.0_feh_m0.25.parquet`. The signed metallicity is encoded in the
//! filename (`m` = negative, `p` = positive), which lets us drop whole bins
//! before touching their contents.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float64Type};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use regex::Regex;

use crate::domain::{Limit, ModelFamily};
use crate::error::FitError;

/// A track file found on disk, not yet read.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFile {
    pub path: PathBuf,
    pub metallicity: f64,
}

/// All files of one family, sorted by metallicity.
#[derive(Debug, Clone)]
pub struct TrackSet {
    /// Family actually used (unknown names resolve to MIST).
    pub family: ModelFamily,
    pub files: Vec<TrackFile>,
}

/// One metallicity bin read into memory: named `f64` columns of equal length.
#[derive(Debug, Clone)]
pub struct TrackTable {
    pub name: String,
    pub metallicity: f64,
    columns: BTreeMap<String, Vec<f64>>,
    n_rows: usize,
}

impl TrackTable {
    /// Build a table from in-memory columns.
    pub fn from_columns(
        name: impl Into<String>,
        metallicity: f64,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, FitError> {
        let name = name.into();
        let n_rows = columns.values().next().map_or(0, Vec::len);
        if let Some((col, _)) = columns.iter().find(|(_, v)| v.len() != n_rows) {
            return Err(FitError::invalid(format!(
                "Column '{col}' in table '{name}' has a different length than the others."
            )));
        }
        Ok(Self {
            name,
            metallicity,
            columns,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&[f64], FitError> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| FitError::MissingColumn {
                column: name.to_string(),
                table: self.name.clone(),
            })
    }
}

/// Filename pattern of a family's track files, capturing sign and magnitude
/// of the metallicity.
pub fn metallicity_pattern(family: ModelFamily) -> Result<Regex, FitError> {
    let pattern = format!(r"^{}([mp])(\d+\.\d+)\.parquet$", regex::escape(family.file_prefix()));
    Regex::new(&pattern)
        .map_err(|e| FitError::invalid(format!("Bad track filename pattern for '{}': {e}", family.name())))
}

/// Parse the signed metallicity out of a track filename.
pub fn parse_metallicity(file_name: &str, pattern: &Regex) -> Option<f64> {
    let caps = pattern.captures(file_name)?;
    let magnitude: f64 = caps[2].parse().ok()?;
    Some(if &caps[1] == "m" { -magnitude } else { magnitude })
}

/// List the track files of a family in `dir`, sorted by metallicity.
pub fn list_tracks(dir: &Path, family_name: &str) -> Result<TrackSet, FitError> {
    let (family, known) = ModelFamily::from_name(family_name);
    if !known {
        log::warn!(
            "Unknown evolution model '{family_name}', falling back to '{}'.",
            family.name()
        );
    }

    let pattern = metallicity_pattern(family)?;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(metallicity) = parse_metallicity(file_name, &pattern) {
            files.push(TrackFile { path, metallicity });
        }
    }
    files.sort_by(|a, b| a.metallicity.total_cmp(&b.metallicity));

    Ok(TrackSet { family, files })
}

/// Keep only the files whose metallicity lies inside `range` (inclusive).
pub fn select_tracks(set: &TrackSet, dir: &Path, range: Limit) -> Result<Vec<TrackFile>, FitError> {
    let kept: Vec<TrackFile> = set
        .files
        .iter()
        .filter(|f| range.contains(f.metallicity))
        .cloned()
        .collect();

    log::debug!(
        "{} of {} '{}' track files within metallicity [{}, {}]",
        kept.len(),
        set.files.len(),
        set.family.name(),
        range.min,
        range.max
    );

    if kept.is_empty() {
        return Err(FitError::NoMatchingFiles {
            family: set.family.name().to_string(),
            dir: dir.display().to_string(),
            min: range.min,
            max: range.max,
        });
    }
    Ok(kept)
}

/// Read the requested columns of one track file.
///
/// Only the requested columns are decoded. Numeric columns of any width are
/// converted to `f64`; nulls become NaN.
pub fn read_track_table(track: &TrackFile, columns: &[String]) -> Result<TrackTable, FitError> {
    let table_name = track.path.display().to_string();
    let file = File::open(&track.path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let schema = builder.schema().clone();
    let mut roots = Vec::with_capacity(columns.len());
    for col in columns {
        let idx = schema.index_of(col).map_err(|_| FitError::MissingColumn {
            column: col.clone(),
            table: table_name.clone(),
        })?;
        if !schema.field(idx).data_type().is_numeric() {
            return Err(FitError::invalid(format!(
                "Column '{col}' in '{table_name}' is not numeric ({}).",
                schema.field(idx).data_type()
            )));
        }
        roots.push(idx);
    }
    roots.sort_unstable();
    roots.dedup();

    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder.with_projection(mask).build()?;

    let mut data: BTreeMap<String, Vec<f64>> =
        columns.iter().map(|c| (c.clone(), Vec::new())).collect();

    for batch in reader {
        let batch = batch?;
        for (name, out) in data.iter_mut() {
            let array = batch
                .column_by_name(name)
                .ok_or_else(|| FitError::MissingColumn {
                    column: name.clone(),
                    table: table_name.clone(),
                })?;
            let cast = arrow::compute::cast(array.as_ref(), &DataType::Float64)?;
            let values = cast.as_primitive::<Float64Type>();
            out.reserve(values.len());
            for i in 0..values.len() {
                out.push(if values.is_null(i) { f64::NAN } else { values.value(i) });
            }
        }
    }

    TrackTable::from_columns(table_name, track.metallicity, data)
}

/// Discover, filter and read the track tables of a family.
pub fn load_tracks(
    dir: &Path,
    family_name: &str,
    metallicity: Limit,
    columns: &[String],
) -> Result<(ModelFamily, Vec<TrackTable>), FitError> {
    let set = list_tracks(dir, family_name)?;
    let kept = select_tracks(&set, dir, metallicity)?;

    let mut tables = Vec::with_capacity(kept.len());
    for track in &kept {
        let table = read_track_table(track, columns)?;
        log::debug!(
            "read {} rows from {} ([M/H] = {:+.2})",
            table.n_rows(),
            track.path.display(),
            track.metallicity
        );
        tables.push(table);
    }
    Ok((set.family, tables))
}
