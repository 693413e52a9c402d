//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the sampling code stays clean and testable
//! - output changes are localized

use crate::domain::{ModelFamily, ResultSummary, RunConfig};
use crate::fit::RunResult;
use crate::io::TrackSet;

/// Run setup, adapted limits and chain diagnostics.
pub fn format_run_summary(family: Option<ModelFamily>, config: &RunConfig, result: &RunResult) -> String {
    let mut out = String::new();

    out.push_str("=== emcmass - MCMC stellar parameters ===\n");
    match family {
        Some(family) => out.push_str(&format!("Models: {}\n", family.name())),
        None => out.push_str("Models: pre-built grid\n"),
    }
    let observed: Vec<String> = config
        .observables
        .iter()
        .map(|o| format!("{} = {} ± {}", o.name, o.value, o.error))
        .collect();
    out.push_str(&format!("Observed: {}\n", observed.join(", ")));
    out.push_str(&format!(
        "Sampler: {} walkers | {} steps + {} burn-in | a = {}\n",
        config.nwalkers, config.nsteps, config.nrelax, config.a
    ));

    out.push_str("\nLimits (adapted to grid):\n");
    for (name, limit) in config.parameters.iter().zip(&result.adapted_limits) {
        out.push_str(&format!("  {:<12} [{:.4}, {:.4}]\n", name, limit.min, limit.max));
    }

    out.push_str(&format!(
        "\nDraws: {} retained of {} | steps completed: {} | acceptance: {:.3}\n",
        result.samples.len(),
        result.n_draws,
        result.n_steps_completed,
        result.acceptance_fraction
    ));
    out.push('\n');

    out
}

/// `name = median -minus +plus` table, one line per field.
pub fn format_estimates(summary: &ResultSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<14} {:>12} {:>12} {:>10} {:>10}\n",
        "field", "best", "median", "-err", "+err"
    ));
    out.push_str(&format!("{:-<14} {:-<12} {:-<12} {:-<10} {:-<10}\n", "", "", "", "", ""));

    for (name, e) in &summary.fields {
        out.push_str(&format!(
            "{:<14} {:>12.5} {:>12.5} {:>10.5} {:>10.5}\n",
            truncate(name, 14),
            e.best,
            e.median,
            e.minus_error,
            e.plus_error
        ));
    }
    out
}

/// One track through the grid: the stepped axis plus every variable.
pub fn format_track(axis_name: &str, variables: &[String], rows: &[(f64, Vec<f64>)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>12}", truncate(axis_name, 12)));
    for v in variables {
        out.push_str(&format!(" {:>12}", truncate(v, 12)));
    }
    out.push('\n');

    for (x, values) in rows {
        out.push_str(&format!("{x:>12.5}"));
        for v in values {
            out.push_str(&format!(" {v:>12.5}"));
        }
        out.push('\n');
    }
    out
}

/// Track files of a family with their metallicities.
pub fn format_track_files(set: &TrackSet) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} track files ({}):\n", set.files.len(), set.family.name()));
    for file in &set.files {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push_str(&format!("  [M/H] = {:+.2}  {name}\n", file.metallicity));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
