//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - loaded from a JSON run configuration
//! - used in-memory during sampling
//! - exported to JSON/CSV for downstream plotting

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fit parameters of the bundled evolution grids, in axis order.
pub const DEFAULT_PARAMETERS: [&str; 3] = ["mass_init", "M_H_init", "phase"];

/// Column holding the initial metallicity; used to pre-filter files by name.
pub const METALLICITY_COLUMN: &str = "M_H_init";

/// Inclusive `[min, max]` range on a parameter or table column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub min: f64,
    pub max: f64,
}

impl Limit {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Overlap of two ranges, `None` when they are disjoint.
    pub fn intersect(&self, other: &Limit) -> Option<Limit> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(Limit { min, max })
    }
}

/// Explicit per-column range filters applied while building a grid.
///
/// Keys may name any table column, not only fit parameters.
pub type ColumnFilters = BTreeMap<String, Limit>;

/// Stellar evolution model families with a known file naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// MESA Isochrones & Stellar Tracks, v/vcrit = 0.0.
    Mist,
    /// Yale Potsdam Stellar Isochrones.
    Yapsi,
}

impl ModelFamily {
    /// Resolve a family by name.
    ///
    /// Unknown names fall back to MIST. The resolved family is returned so the
    /// caller always knows which grid was used.
    pub fn from_name(name: &str) -> (ModelFamily, bool) {
        match name.trim().to_ascii_lowercase().as_str() {
            "mist" => (ModelFamily::Mist, true),
            "yapsi" => (ModelFamily::Yapsi, true),
            _ => (ModelFamily::Mist, false),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::Mist => "mist",
            ModelFamily::Yapsi => "yapsi",
        }
    }

    /// Filename prefix preceding the signed metallicity token.
    pub fn file_prefix(self) -> &'static str {
        match self {
            ModelFamily::Mist => "MIST_vvcrit0.0_feh_",
            ModelFamily::Yapsi => "YaPSI_feh_",
        }
    }
}

/// One observed quantity entering the likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    pub name: String,
    pub value: f64,
    pub error: f64,
}

/// Percentile triple used for credible intervals (`[0, 100]` scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl Default for Percentiles {
    /// ≈1σ interval around the median.
    fn default() -> Self {
        Self {
            low: 16.0,
            mid: 50.0,
            high: 84.0,
        }
    }
}

impl Percentiles {
    pub fn is_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.low)
            && (0.0..=100.0).contains(&self.high)
            && self.low <= self.mid
            && self.mid <= self.high
    }
}

fn default_model() -> String {
    ModelFamily::Mist.name().to_string()
}

fn default_parameters() -> Vec<String> {
    DEFAULT_PARAMETERS.iter().map(|p| p.to_string()).collect()
}

fn default_nwalkers() -> usize {
    100
}

fn default_nsteps() -> usize {
    1000
}

fn default_nrelax() -> usize {
    100
}

fn default_scale() -> f64 {
    2.0
}

/// A full run's configuration as understood by the pipeline.
///
/// Loaded from JSON and/or derived from CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_parameters")]
    pub parameters: Vec<String>,
    /// Requested limits keyed by parameter name; missing means unbounded.
    #[serde(default)]
    pub limits: BTreeMap<String, Limit>,
    #[serde(default)]
    pub observables: Vec<Observable>,
    /// Grid variables carried along in every draw but not fitted.
    #[serde(default)]
    pub derived: Vec<String>,
    #[serde(default = "default_nwalkers")]
    pub nwalkers: usize,
    #[serde(default = "default_nsteps")]
    pub nsteps: usize,
    #[serde(default = "default_nrelax")]
    pub nrelax: usize,
    /// Stretch-move scale parameter.
    #[serde(default = "default_scale")]
    pub a: f64,
    #[serde(default)]
    pub percentiles: Percentiles,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    /// Register the freshly built grid as the process-wide default.
    #[serde(default)]
    pub set_default: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            parameters: default_parameters(),
            limits: BTreeMap::new(),
            observables: Vec::new(),
            derived: Vec::new(),
            nwalkers: default_nwalkers(),
            nsteps: default_nsteps(),
            nrelax: default_nrelax(),
            a: default_scale(),
            percentiles: Percentiles::default(),
            seed: None,
            models_dir: None,
            set_default: false,
        }
    }
}

impl RunConfig {
    /// Requested limits in parameter order.
    pub fn requested_limits(&self) -> Vec<Limit> {
        self.parameters
            .iter()
            .map(|p| self.limits.get(p).copied().unwrap_or_else(Limit::unbounded))
            .collect()
    }

    /// Grid variables: the fitted observables first, then derived extras.
    pub fn variables(&self) -> Vec<String> {
        let mut out: Vec<String> = self.observables.iter().map(|o| o.name.clone()).collect();
        for name in &self.derived {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }
}

/// Draws that survived burn-in discard and the finiteness filter.
///
/// Each row holds the fit parameters followed by the grid variables, in the
/// order given by `names`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetainedSample {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub log_probs: Vec<f64>,
}

impl RetainedSample {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[idx]).collect()
    }
}

/// Credible-interval summary of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub best: f64,
    pub median: f64,
    pub minus_error: f64,
    pub plus_error: f64,
}

impl Estimate {
    /// Estimate of a field without any finite value.
    pub fn undefined() -> Self {
        Self {
            best: f64::NAN,
            median: f64::NAN,
            minus_error: f64::NAN,
            plus_error: f64::NAN,
        }
    }
}

/// Per-field estimates, in the retained sample's column order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSummary {
    pub fields: Vec<(String, Estimate)>,
}

impl ResultSummary {
    pub fn get(&self, name: &str) -> Option<&Estimate> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }
}
