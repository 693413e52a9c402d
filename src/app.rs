//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - builds the run configuration
//! - runs the sampling pipeline
//! - prints reports
//! - writes optional exports

use clap::Parser;

use crate::cli::{Command, FilesArgs, FitArgs, TrackArgs};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `emcmass` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Track(args) => handle_track(args),
        Command::Files(args) => handle_files(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = pipeline::config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(Some(run.family), &config, &run.result)
    );
    println!("{}", crate::report::format_estimates(&run.result.summary));

    // Optional exports.
    if let Some(path) = &args.export_samples {
        crate::io::write_samples_csv(path, &run.result.samples)?;
    }
    if let Some(path) = &args.export_chain {
        crate::io::write_chain_csv(path, &run.result.chain, &run.result.samples.names, config.parameters.len())?;
    }
    if let Some(path) = &args.export_report {
        let report = crate::io::RunReport::new(run.family.name(), &config, &run.result);
        crate::io::write_report_json(path, &report)?;
    }

    Ok(())
}

fn handle_track(args: TrackArgs) -> Result<(), AppError> {
    let track = pipeline::run_track(&args)?;
    print!(
        "{}",
        crate::report::format_track(&track.along, &track.variables, &track.rows)
    );
    Ok(())
}

fn handle_files(args: FilesArgs) -> Result<(), AppError> {
    let set = pipeline::run_files(&args)?;
    print!("{}", crate::report::format_track_files(&set));
    Ok(())
}
