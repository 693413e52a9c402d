//! Shared pipeline logic behind the CLI subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! config + flags -> track files -> grid -> posterior sampling -> summary
//!
//! The front-end can then focus on presentation.

use std::path::{Path, PathBuf};

use crate::cli::{FilesArgs, FitArgs, TrackArgs};
use crate::domain::{ColumnFilters, Limit, METALLICITY_COLUMN, ModelFamily, Percentiles, RunConfig};
use crate::error::FitError;
use crate::fit::{RunResult, load_grid, run_mcmc};
use crate::grid::build_grid;
use crate::io::{TrackSet, list_tracks, load_tracks, read_run_config, select_tracks};

/// Environment variable naming the track directory.
pub const MODELS_DIR_ENV: &str = "EMCMASS_MODELS_DIR";

/// Fallback track directory.
pub const DEFAULT_MODELS_DIR: &str = "Models";

/// All computed outputs of a single `emcmass fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub family: ModelFamily,
    pub models_dir: PathBuf,
    pub result: RunResult,
}

/// A track printed by `emcmass track`.
#[derive(Debug, Clone)]
pub struct TrackOutput {
    pub along: String,
    pub variables: Vec<String>,
    pub rows: Vec<(f64, Vec<f64>)>,
}

/// Flag > config file > environment > `./Models`.
pub fn resolve_models_dir(flag: Option<&Path>, config: Option<&Path>, env: Option<String>) -> PathBuf {
    flag.or(config)
        .map(Path::to_path_buf)
        .or_else(|| env.filter(|v| !v.trim().is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR))
}

fn models_dir_from_env(flag: Option<&Path>, config: Option<&Path>) -> PathBuf {
    resolve_models_dir(flag, config, std::env::var(MODELS_DIR_ENV).ok())
}

/// Load the JSON config (if any) and apply the CLI overrides on top.
pub fn config_from_args(args: &FitArgs) -> Result<RunConfig, FitError> {
    let mut config = match &args.config {
        Some(path) => read_run_config(path)?,
        None => RunConfig::default(),
    };

    if let Some(model) = &args.models.model {
        config.model = model.clone();
    }
    if !args.parameters.is_empty() {
        config.parameters = args.parameters.clone();
    }
    if !args.observables.is_empty() {
        config.observables = args.observables.clone();
    }
    if !args.derived.is_empty() {
        config.derived = args.derived.clone();
    }
    for (name, limit) in &args.limits {
        config.limits.insert(name.clone(), *limit);
    }
    if let Some(n) = args.nwalkers {
        config.nwalkers = n;
    }
    if let Some(n) = args.nsteps {
        config.nsteps = n;
    }
    if let Some(n) = args.nrelax {
        config.nrelax = n;
    }
    if let Some(a) = args.a {
        config.a = a;
    }
    if let Some([low, mid, high]) = args.percentiles {
        config.percentiles = Percentiles { low, mid, high };
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.models.models_dir.is_some() {
        config.models_dir = args.models.models_dir.clone();
    }

    if config.observables.is_empty() {
        return Err(FitError::invalid(
            "No observables given: pass --obs NAME:VALUE:ERROR or list them in the config.",
        ));
    }
    Ok(config)
}

/// Build the grid for `config` and sample its posterior.
pub fn run_fit(config: &RunConfig) -> Result<RunOutput, FitError> {
    let models_dir = models_dir_from_env(None, config.models_dir.as_deref());
    let (family, grid) = load_grid(config, &models_dir)?;
    let result = run_mcmc(config, Some(grid), &models_dir)?;
    Ok(RunOutput {
        family,
        models_dir,
        result,
    })
}

/// Interpolate one track along `args.along`.
pub fn run_track(args: &TrackArgs) -> Result<TrackOutput, FitError> {
    let models_dir = models_dir_from_env(args.models.models_dir.as_deref(), None);
    let model = args.models.model.as_deref().unwrap_or(ModelFamily::Mist.name());

    let parameters: Vec<String> = args.at.iter().map(|(name, _)| name.clone()).collect();
    let point: Vec<f64> = args.at.iter().map(|(_, value)| *value).collect();
    let axis = parameters.iter().position(|p| *p == args.along).ok_or_else(|| {
        FitError::invalid(format!("'{}' is not one of the --at parameters.", args.along))
    })?;

    let filters: ColumnFilters = args.limits.iter().cloned().collect();
    let metallicity = filters
        .get(METALLICITY_COLUMN)
        .copied()
        .unwrap_or_else(Limit::unbounded);

    let mut columns = parameters.clone();
    columns.extend(args.variables.iter().cloned());
    columns.extend(filters.keys().cloned());
    columns.sort();
    columns.dedup();

    let (_, tables) = load_tracks(&models_dir, model, metallicity, &columns)?;
    let grid = build_grid(&tables, &parameters, &args.variables, &filters)?;
    let rows = grid.track(&point, axis)?;

    Ok(TrackOutput {
        along: args.along.clone(),
        variables: args.variables.clone(),
        rows,
    })
}

/// Track files of the requested family, optionally narrowed by metallicity.
pub fn run_files(args: &FilesArgs) -> Result<TrackSet, FitError> {
    let models_dir = models_dir_from_env(args.models.models_dir.as_deref(), None);
    let model = args.models.model.as_deref().unwrap_or(ModelFamily::Mist.name());

    let mut set = list_tracks(&models_dir, model)?;
    if let Some(range) = args.feh {
        set.files = select_tracks(&set, &models_dir, range)?;
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn fit_args(argv: &[&str]) -> FitArgs {
        let mut full = vec!["emcmass", "fit"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Fit(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn models_dir_precedence() {
        let flag = Path::new("/flag");
        let cfg = Path::new("/cfg");
        let env = Some("/env".to_string());
        assert_eq!(resolve_models_dir(Some(flag), Some(cfg), env.clone()), PathBuf::from("/flag"));
        assert_eq!(resolve_models_dir(None, Some(cfg), env.clone()), PathBuf::from("/cfg"));
        assert_eq!(resolve_models_dir(None, None, env), PathBuf::from("/env"));
        assert_eq!(resolve_models_dir(None, None, Some(" ".into())), PathBuf::from("Models"));
        assert_eq!(resolve_models_dir(None, None, None), PathBuf::from("Models"));
    }

    #[test]
    fn flags_override_the_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"nwalkers": 40, "nsteps": 300, "seed": 1,
                 "observables": [{"name": "log_L", "value": 0.0, "error": 0.1}],
                 "limits": {"mass_init": {"min": 0.5, "max": 1.0}}}"#,
        )
        .unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let args = fit_args(&["-c", &path, "-n", "50", "--limit", "phase=0,3", "--percentiles", "5,50,95"]);
        let config = config_from_args(&args).unwrap();
        assert_eq!(config.nwalkers, 40);
        assert_eq!(config.nsteps, 50);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.limits.len(), 2);
        assert_eq!(config.percentiles.low, 5.0);
        assert_eq!(config.observables[0].name, "log_L");
    }

    #[test]
    fn a_fit_needs_observables() {
        let err = config_from_args(&fit_args(&[])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
