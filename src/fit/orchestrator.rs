//! Run orchestration: grid → adapted limits → walkers → sampler → summary.
//!
//! A partial chain (stopped run) goes through exactly the same discard /
//! filter / summarize path as a complete one.

use std::path::Path;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::domain::{
    ColumnFilters, Limit, METALLICITY_COLUMN, ModelFamily, RetainedSample, ResultSummary, RunConfig,
};
use crate::error::FitError;
use crate::fit::posterior::PosteriorModel;
use crate::fit::sampler::{Chain, EnsembleSampler, StopFlag, StretchMove};
use crate::fit::summary::{best_record, calculate_percentiles, check_disjoint, retain_draws};
use crate::fit::walkers::initial_positions;
use crate::grid::{TrackGrid, adapt_limits, build_grid, set_default_grid};
use crate::io::load_tracks;

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub best: Vec<(String, f64)>,
    pub summary: ResultSummary,
    pub samples: RetainedSample,
    pub adapted_limits: Vec<Limit>,
    /// Draws after burn-in discard, before the finiteness filter.
    pub n_draws: usize,
    pub n_steps_completed: usize,
    pub acceptance_fraction: f64,
    /// Every walker state, burn-in and rejected draws included.
    pub chain: Chain,
}

/// Column filters derived from the requested parameter limits.
pub fn limit_filters(config: &RunConfig) -> ColumnFilters {
    config
        .parameters
        .iter()
        .zip(config.requested_limits())
        .filter(|(_, limit)| limit.min.is_finite() || limit.max.is_finite())
        .map(|(name, limit)| (name.clone(), limit))
        .collect()
}

/// Read the track tables of the configured family and build the run's grid.
pub fn prepare_grid(config: &RunConfig, models_dir: &Path) -> Result<(ModelFamily, TrackGrid), FitError> {
    let variables = config.variables();
    check_disjoint(&config.parameters, &variables)?;

    let filters = limit_filters(config);
    let metallicity = filters
        .get(METALLICITY_COLUMN)
        .copied()
        .unwrap_or_else(Limit::unbounded);

    let mut columns: Vec<String> = config.parameters.clone();
    columns.extend(variables.iter().cloned());
    columns.extend(filters.keys().cloned());
    columns.sort();
    columns.dedup();

    let (family, tables) = load_tracks(models_dir, &config.model, metallicity, &columns)?;
    let grid = build_grid(&tables, &config.parameters, &variables, &filters)?;
    Ok((family, grid))
}

/// `prepare_grid`, shared behind an `Arc` and registered as the process-wide
/// default when the config asks for it.
pub fn load_grid(config: &RunConfig, models_dir: &Path) -> Result<(ModelFamily, Arc<TrackGrid>), FitError> {
    let (family, grid) = prepare_grid(config, models_dir)?;
    log::info!("using '{}' evolution models", family.name());
    let grid = Arc::new(grid);
    if config.set_default {
        set_default_grid(Arc::clone(&grid));
    }
    Ok((family, grid))
}

/// Reject configurations that cannot produce a meaningful run.
pub fn validate_run(config: &RunConfig, grid: &TrackGrid) -> Result<(), FitError> {
    if grid.parameters() != config.parameters.as_slice() {
        return Err(FitError::invalid(format!(
            "Grid parameters {:?} do not match the fit parameters {:?}.",
            grid.parameters(),
            config.parameters
        )));
    }
    check_disjoint(grid.parameters(), grid.variables())?;

    let observed: Vec<&str> = config.observables.iter().map(|o| o.name.as_str()).collect();
    if observed.is_empty() {
        return Err(FitError::invalid("At least one observable is required."));
    }
    let leading: Vec<&str> = grid.variables().iter().take(observed.len()).map(String::as_str).collect();
    if leading != observed {
        return Err(FitError::invalid(format!(
            "Observables {observed:?} must be the leading grid variables (grid has {:?}).",
            grid.variables()
        )));
    }

    let ndim = config.parameters.len();
    if config.nwalkers < 2 * ndim || config.nwalkers < 2 {
        return Err(FitError::invalid(format!(
            "Need at least {} walkers for {ndim} parameters (got {}).",
            (2 * ndim).max(2),
            config.nwalkers
        )));
    }
    if config.nsteps == 0 {
        return Err(FitError::invalid("nsteps must be > 0."));
    }
    if !(config.a.is_finite() && config.a > 1.0) {
        return Err(FitError::invalid(format!("Stretch scale a must be > 1 (got {}).", config.a)));
    }
    if !config.percentiles.is_valid() {
        return Err(FitError::invalid("Percentiles must satisfy 0 <= low <= mid <= high <= 100."));
    }
    Ok(())
}

/// Full run with the default stretch-move sampler.
///
/// Without a `grid`, one is built from the track tables in `models_dir`.
pub fn run_mcmc(
    config: &RunConfig,
    grid: Option<Arc<TrackGrid>>,
    models_dir: &Path,
) -> Result<RunResult, FitError> {
    let grid = match grid {
        Some(grid) => grid,
        None => load_grid(config, models_dir)?.1,
    };

    let mut sampler = StretchMove::new(config.seed.map(|s| s.wrapping_add(1)));
    run_mcmc_with(config, grid, &mut sampler, &StopFlag::new())
}

/// Run against an existing grid with any ensemble sampler.
pub fn run_mcmc_with<S: EnsembleSampler>(
    config: &RunConfig,
    grid: Arc<TrackGrid>,
    sampler: &mut S,
    stop: &StopFlag,
) -> Result<RunResult, FitError> {
    validate_run(config, &grid)?;

    let adapted = adapt_limits(&grid, &config.requested_limits())?;
    log::info!("New limits to match up with grid points:");
    for (name, limit) in config.parameters.iter().zip(&adapted) {
        log::info!("   {name} = {} -> {}", limit.min, limit.max);
    }

    let observed = config.observables.iter().map(|o| o.value).collect();
    let observed_err = config.observables.iter().map(|o| o.error).collect();
    let model = PosteriorModel::new(Arc::clone(&grid), observed, observed_err, adapted.clone())?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let initial = initial_positions(&mut rng, &config.parameters, &adapted, config.nwalkers)?;

    let total_steps = config.nsteps + config.nrelax;
    log::info!(
        "sampling {} walkers for {} steps ({} burn-in), a = {}",
        config.nwalkers,
        total_steps,
        config.nrelax,
        config.a
    );
    let log_prob = |theta: &[f64]| model.evaluate(theta);
    let chain = sampler.run(initial, total_steps, &log_prob, config.a, stop)?;

    summarize_chain(chain, config, grid.variables(), adapted)
}

/// Burn-in discard, validity filter, merge and summary of a chain.
pub fn summarize_chain(
    chain: Chain,
    config: &RunConfig,
    variables: &[String],
    adapted_limits: Vec<Limit>,
) -> Result<RunResult, FitError> {
    let draws = chain.discard(config.nrelax);
    let n_draws = draws.len();

    let samples = retain_draws(draws, &config.parameters, variables)?;
    let best = best_record(&samples)?;
    let summary = calculate_percentiles(&samples, config.percentiles)?;

    Ok(RunResult {
        best,
        summary,
        samples,
        adapted_limits,
        n_draws,
        n_steps_completed: chain.n_steps(),
        acceptance_fraction: chain.acceptance_fraction(),
        chain,
    })
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;
    use crate::domain::Observable;
    use crate::fit::sampler::WalkerState;
    use crate::grid::PixelGrid;

    /// log_L = mass + z, log_R = mass - z on a 21 x 5 lattice.
    fn grid() -> Arc<TrackGrid> {
        let mut params = Vec::new();
        let mut vars = Vec::new();
        for i in 0..21 {
            for j in 0..5 {
                let m = 0.5 + 0.05 * i as f64;
                let z = -0.5 + 0.25 * j as f64;
                params.extend([m, z]);
                vars.extend([m + z, m - z]);
            }
        }
        let n = params.len() / 2;
        let pixels = PixelGrid::from_scattered(
            &DMatrix::from_row_slice(n, 2, &params),
            &DMatrix::from_row_slice(n, 2, &vars),
        )
        .unwrap();
        Arc::new(
            TrackGrid::new(
                vec!["mass_init".into(), "M_H_init".into()],
                vec!["log_L".into(), "log_R".into()],
                Box::new(pixels),
            )
            .unwrap(),
        )
    }

    fn config() -> RunConfig {
        RunConfig {
            parameters: vec!["mass_init".into(), "M_H_init".into()],
            observables: vec![
                Observable { name: "log_L".into(), value: 1.0, error: 0.02 },
                Observable { name: "log_R".into(), value: 1.0, error: 0.02 },
            ],
            nwalkers: 10,
            nsteps: 50,
            nrelax: 100,
            seed: Some(17),
            ..RunConfig::default()
        }
    }

    /// Sampler stub replaying a fixed chain.
    struct Replay(Chain);

    impl EnsembleSampler for Replay {
        fn run<F>(
            &mut self,
            _initial: Vec<Vec<f64>>,
            _n_steps: usize,
            _log_prob: &F,
            _a: f64,
            _stop: &StopFlag,
        ) -> Result<Chain, FitError>
        where
            F: Fn(&[f64]) -> (f64, Option<Vec<f64>>) + Sync,
        {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn retained_count_excludes_burn_in() {
        let result = run_mcmc_with(&config(), grid(), &mut StretchMove::new(Some(3)), &StopFlag::new()).unwrap();
        assert_eq!(result.n_steps_completed, 150);
        assert_eq!(result.n_draws, 500);
        assert!(result.samples.len() <= 500);
    }

    #[test]
    fn recovers_mass_and_metallicity() {
        let mut cfg = config();
        cfg.nwalkers = 20;
        cfg.nsteps = 400;
        let result = run_mcmc(&cfg, Some(grid()), Path::new("unused")).unwrap();

        let mass = result.summary.get("mass_init").unwrap();
        let feh = result.summary.get("M_H_init").unwrap();
        assert!((mass.median - 1.0).abs() < 0.03, "mass {}", mass.median);
        assert!(feh.median.abs() < 0.03, "feh {}", feh.median);
        assert!(mass.minus_error > 0.0 && mass.plus_error > 0.0);

        // Derived observables are summarized too.
        assert!(result.summary.get("log_R").is_some());
        assert_eq!(result.samples.names, vec!["mass_init", "M_H_init", "log_L", "log_R"]);

        let best_lp = result
            .samples
            .log_probs
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let best_mass = result.best.iter().find(|(n, _)| n == "mass_init").unwrap().1;
        assert!(result
            .samples
            .rows
            .iter()
            .zip(&result.samples.log_probs)
            .any(|(row, lp)| row[0] == best_mass && *lp == best_lp));
    }

    #[test]
    fn odd_ensembles_run() {
        let mut cfg = config();
        cfg.nwalkers = 11;
        let result = run_mcmc(&cfg, Some(grid()), Path::new("unused")).unwrap();
        assert_eq!(result.n_draws, 11 * 50);
        assert_eq!(result.chain.n_walkers(), 11);
    }

    #[test]
    fn adapted_limits_shrink_to_the_grid() {
        let mut cfg = config();
        cfg.limits.insert("mass_init".into(), Limit::new(0.0, 1.2));
        let result = run_mcmc(&cfg, Some(grid()), Path::new("unused")).unwrap();
        assert_eq!(result.adapted_limits[0], Limit::new(0.5, 1.2));
        assert_eq!(result.adapted_limits[1], Limit::new(-0.5, 0.5));
        for row in &result.samples.rows {
            assert!(result.adapted_limits[0].contains(row[0]));
        }
    }

    #[test]
    fn everything_rejected_gives_no_valid_samples() {
        let rejected = WalkerState {
            position: vec![5.0, 5.0],
            log_prob: f64::NEG_INFINITY,
            blob: None,
        };
        let chain = Chain {
            steps: vec![vec![rejected; 10]; 150],
            accepted: 0,
            proposed: 1500,
        };
        let err = run_mcmc_with(&config(), grid(), &mut Replay(chain), &StopFlag::new()).unwrap_err();
        assert!(matches!(err, FitError::NoValidSamples));
    }

    #[test]
    fn stopped_run_is_summarized_like_a_full_one() {
        let state = WalkerState {
            position: vec![1.0, 0.0],
            log_prob: -1.0,
            blob: Some(vec![1.0, 1.0]),
        };
        // Only 120 of 150 steps completed: 20 post-burn-in steps remain.
        let chain = Chain {
            steps: vec![vec![state; 10]; 120],
            accepted: 0,
            proposed: 1200,
        };
        let result = run_mcmc_with(&config(), grid(), &mut Replay(chain), &StopFlag::new()).unwrap();
        assert_eq!(result.n_draws, 200);
        assert_eq!(result.summary.get("mass_init").unwrap().median, 1.0);
    }

    #[test]
    fn configuration_errors_surface_before_sampling() {
        let g = grid();

        let mut cfg = config();
        cfg.nwalkers = 3;
        assert!(matches!(validate_run(&cfg, &g), Err(FitError::InvalidConfig(_))));

        let mut cfg = config();
        cfg.nwalkers = 11;
        assert!(validate_run(&cfg, &g).is_ok());

        let mut cfg = config();
        cfg.observables.swap(0, 1);
        assert!(validate_run(&cfg, &g).is_err());

        let mut cfg = config();
        cfg.parameters = vec!["log_L".into(), "M_H_init".into()];
        assert!(validate_run(&cfg, &g).is_err());

        let mut cfg = config();
        cfg.a = 0.5;
        assert!(validate_run(&cfg, &g).is_err());
    }

    #[test]
    fn collisions_are_reported_before_reading_tables() {
        let mut cfg = config();
        cfg.derived = vec!["M_H_init".into()];
        let err = prepare_grid(&cfg, Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, FitError::NameCollision(_)));
    }

    #[test]
    fn only_bounded_limits_become_filters() {
        let mut cfg = config();
        cfg.limits.insert("mass_init".into(), Limit::new(0.5, 2.0));
        cfg.limits.insert("M_H_init".into(), Limit::unbounded());
        let filters = limit_filters(&cfg);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters["mass_init"], Limit::new(0.5, 2.0));
    }
}
