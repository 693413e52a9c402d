//! Command-line parsing for the MCMC stellar parameter estimator.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the sampling/grid code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{Limit, Observable};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "emcmass",
    version,
    about = "Stellar mass, age and metallicity from evolution-track grids via MCMC"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample the posterior for a set of observations and print the estimates.
    Fit(FitArgs),
    /// Print one evolutionary track interpolated from the grid.
    Track(TrackArgs),
    /// List the track files of a model family.
    Files(FilesArgs),
}

/// Options shared by every subcommand that reads track files.
#[derive(Debug, Parser, Clone)]
pub struct ModelArgs {
    /// Directory holding the track files (default: $EMCMASS_MODELS_DIR or ./Models).
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    /// Model family (mist, yapsi). Unknown names fall back to mist.
    #[arg(long)]
    pub model: Option<String>,
}

/// Options for a posterior run. Flags override the JSON config.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub models: ModelArgs,

    /// JSON run configuration.
    #[arg(short = 'c', long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Observed quantity as NAME:VALUE:ERROR (repeatable, in grid order).
    #[arg(long = "obs", value_name = "NAME:VALUE:ERROR", value_parser = parse_observable)]
    pub observables: Vec<Observable>,

    /// Extra grid variable to carry along in every draw (repeatable).
    #[arg(long = "derived", value_name = "NAME")]
    pub derived: Vec<String>,

    /// Fit parameter (repeatable, axis order). Default: mass_init, M_H_init, phase.
    #[arg(long = "param", value_name = "NAME")]
    pub parameters: Vec<String>,

    /// Parameter limit as NAME=MIN,MAX (repeatable).
    #[arg(long = "limit", value_name = "NAME=MIN,MAX", value_parser = parse_limit)]
    pub limits: Vec<(String, Limit)>,

    /// Number of walkers.
    #[arg(short = 'w', long)]
    pub nwalkers: Option<usize>,

    /// Number of retained steps.
    #[arg(short = 'n', long)]
    pub nsteps: Option<usize>,

    /// Number of burn-in steps discarded before summarizing.
    #[arg(long)]
    pub nrelax: Option<usize>,

    /// Stretch-move scale parameter (> 1).
    #[arg(short = 'a', long = "scale")]
    pub a: Option<f64>,

    /// Percentiles for the credible interval as LOW,MID,HIGH.
    #[arg(long, value_name = "LOW,MID,HIGH", value_parser = parse_percentiles)]
    pub percentiles: Option<[f64; 3]>,

    /// Random seed for walker initialization and sampling.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Export retained draws to CSV.
    #[arg(long = "export-samples", value_name = "CSV")]
    pub export_samples: Option<PathBuf>,

    /// Export every walker state (burn-in and rejected draws included) to CSV.
    #[arg(long = "export-chain", value_name = "CSV")]
    pub export_chain: Option<PathBuf>,

    /// Export a JSON run report.
    #[arg(long = "export-report", value_name = "JSON")]
    pub export_report: Option<PathBuf>,
}

/// Options for printing a single track.
#[derive(Debug, Parser, Clone)]
pub struct TrackArgs {
    #[command(flatten)]
    pub models: ModelArgs,

    /// Grid parameter and its fixed value as NAME=VALUE (repeatable, axis order).
    #[arg(long = "at", value_name = "NAME=VALUE", value_parser = parse_assignment, required = true)]
    pub at: Vec<(String, f64)>,

    /// Parameter stepped along the track.
    #[arg(long, default_value = "phase")]
    pub along: String,

    /// Grid variable to print (repeatable).
    #[arg(long = "var", value_name = "NAME", required = true)]
    pub variables: Vec<String>,

    /// Column filter as NAME=MIN,MAX (repeatable).
    #[arg(long = "limit", value_name = "NAME=MIN,MAX", value_parser = parse_limit)]
    pub limits: Vec<(String, Limit)>,
}

/// Options for listing track files.
#[derive(Debug, Parser, Clone)]
pub struct FilesArgs {
    #[command(flatten)]
    pub models: ModelArgs,

    /// Only list files with metallicity in MIN,MAX.
    #[arg(long, value_name = "MIN,MAX", value_parser = parse_range)]
    pub feh: Option<Limit>,
}

fn parse_number(s: &str, what: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid {what} '{s}'"))
}

/// `log_L:0.25:0.05` → observable.
pub fn parse_observable(s: &str) -> Result<Observable, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [name, value, error] = parts.as_slice() else {
        return Err(format!("expected NAME:VALUE:ERROR, got '{s}'"));
    };
    if name.trim().is_empty() {
        return Err(format!("missing name in '{s}'"));
    }
    Ok(Observable {
        name: name.trim().to_string(),
        value: parse_number(value, "value")?,
        error: parse_number(error, "error")?,
    })
}

/// `0.5,2.0` → limit. Either bound may be left empty for an open side.
pub fn parse_range(s: &str) -> Result<Limit, String> {
    let Some((lo, hi)) = s.split_once(',') else {
        return Err(format!("expected MIN,MAX, got '{s}'"));
    };
    let min = if lo.trim().is_empty() { f64::NEG_INFINITY } else { parse_number(lo, "minimum")? };
    let max = if hi.trim().is_empty() { f64::INFINITY } else { parse_number(hi, "maximum")? };
    if min > max {
        return Err(format!("minimum above maximum in '{s}'"));
    }
    Ok(Limit::new(min, max))
}

/// `mass_init=0.5,2.0` → named limit.
pub fn parse_limit(s: &str) -> Result<(String, Limit), String> {
    let Some((name, range)) = s.split_once('=') else {
        return Err(format!("expected NAME=MIN,MAX, got '{s}'"));
    };
    Ok((name.trim().to_string(), parse_range(range)?))
}

/// `mass_init=1.0` → named value.
pub fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let Some((name, value)) = s.split_once('=') else {
        return Err(format!("expected NAME=VALUE, got '{s}'"));
    };
    Ok((name.trim().to_string(), parse_number(value, "value")?))
}

pub fn parse_percentiles(s: &str) -> Result<[f64; 3], String> {
    let values = s
        .split(',')
        .map(|p| parse_number(p, "percentile"))
        .collect::<Result<Vec<f64>, String>>()?;
    <[f64; 3]>::try_from(values).map_err(|_| format!("expected LOW,MID,HIGH, got '{s}'"))
}
