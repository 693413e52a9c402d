//! Export run results.
//!
//! - retained draws as CSV (one column per field + `log_prob`)
//! - the full chain as CSV, rejected draws with zero-filled observables
//! - a JSON run report: configuration, adapted limits, best fit and summary
//!
//! Both are meant to be easy to consume in spreadsheets or plotting scripts.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::{Estimate, Limit, RetainedSample, RunConfig};
use crate::error::FitError;
use crate::fit::{Chain, RunResult};

/// Write every retained draw to a CSV file.
pub fn write_samples_csv(path: &Path, sample: &RetainedSample) -> Result<(), FitError> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = sample.names.clone();
    header.push("log_prob".to_string());
    writer.write_record(&header)?;

    for (row, lp) in sample.rows.iter().zip(&sample.log_probs) {
        let record: Vec<String> = row
            .iter()
            .chain(std::iter::once(lp))
            .map(|v| format!("{v:.10}"))
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    log::info!("wrote {} draws to {}", sample.len(), path.display());
    Ok(())
}

/// Write every walker state of `chain`, burn-in and rejected draws included.
///
/// `names` lists the parameters followed by the grid variables. Rejected draws
/// carry no observables; their variable columns are written as zeros and
/// their `log_prob` as `-inf`.
pub fn write_chain_csv(path: &Path, chain: &Chain, names: &[String], n_parameters: usize) -> Result<(), FitError> {
    let n_variables = names.len().saturating_sub(n_parameters);
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = vec!["step".to_string(), "walker".to_string()];
    header.extend(names.iter().cloned());
    header.push("log_prob".to_string());
    writer.write_record(&header)?;

    let n_walkers = chain.n_walkers().max(1);
    for (i, draw) in chain.discard(0).iter().enumerate() {
        let mut record = vec![(i / n_walkers).to_string(), (i % n_walkers).to_string()];
        record.extend(
            draw.theta
                .iter()
                .chain(&draw.blob_or_zeros(n_variables))
                .chain(std::iter::once(&draw.log_prob))
                .map(|v| format!("{v:.10}")),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;

    log::info!(
        "wrote {} steps x {} walkers to {}",
        chain.n_steps(),
        chain.n_walkers(),
        path.display()
    );
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedLimit {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedEstimate {
    pub name: String,
    #[serde(flatten)]
    pub estimate: Estimate,
}

/// Portable record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tool: String,
    pub generated: DateTime<Local>,
    pub model: String,
    pub config: RunConfig,
    pub adapted_limits: Vec<NamedLimit>,
    pub best: Vec<NamedEstimate>,
    pub n_draws: usize,
    pub n_retained: usize,
    pub n_steps_completed: usize,
    pub acceptance_fraction: f64,
}

impl RunReport {
    pub fn new(model: &str, config: &RunConfig, result: &RunResult) -> Self {
        let adapted_limits = config
            .parameters
            .iter()
            .zip(&result.adapted_limits)
            .map(|(name, Limit { min, max })| NamedLimit {
                name: name.clone(),
                min: *min,
                max: *max,
            })
            .collect();
        let best = result
            .summary
            .fields
            .iter()
            .map(|(name, estimate)| NamedEstimate {
                name: name.clone(),
                estimate: *estimate,
            })
            .collect();

        Self {
            tool: "emcmass".to_string(),
            generated: Local::now(),
            model: model.to_string(),
            config: config.clone(),
            adapted_limits,
            best,
            n_draws: result.n_draws,
            n_retained: result.samples.len(),
            n_steps_completed: result.n_steps_completed,
            acceptance_fraction: result.acceptance_fraction,
        }
    }
}

/// Write a run report as pretty JSON.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<(), FitError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    log::info!("wrote run report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResultSummary;
    use crate::fit::WalkerState;

    fn state(mass: f64, log_l: Option<f64>, log_prob: f64) -> WalkerState {
        WalkerState {
            position: vec![mass],
            log_prob,
            blob: log_l.map(|v| vec![v]),
        }
    }

    fn result() -> RunResult {
        let estimate = Estimate {
            best: 1.0,
            median: 1.01,
            minus_error: 0.02,
            plus_error: 0.03,
        };
        RunResult {
            best: vec![("mass_init".into(), 1.0), ("log_L".into(), 0.5)],
            summary: ResultSummary {
                fields: vec![("mass_init".into(), estimate), ("log_L".into(), estimate)],
            },
            samples: RetainedSample {
                names: vec!["mass_init".into(), "log_L".into()],
                rows: vec![vec![1.0, 0.5], vec![1.1, 0.6], vec![0.9, 0.4]],
                log_probs: vec![-0.5, -1.0, -2.0],
            },
            adapted_limits: vec![Limit::new(0.5, 1.5)],
            n_draws: 4,
            n_steps_completed: 2,
            acceptance_fraction: 0.25,
            chain: Chain {
                steps: vec![
                    vec![state(1.0, Some(0.5), -0.5), state(1.1, Some(0.6), -1.0)],
                    vec![state(0.9, Some(0.4), -2.0), state(3.0, None, f64::NEG_INFINITY)],
                ],
                accepted: 3,
                proposed: 4,
            },
        }
    }

    #[test]
    fn samples_csv_has_header_and_one_row_per_draw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        write_samples_csv(&path, &result().samples).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, vec!["mass_init", "log_L", "log_prob"]);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][0].parse::<f64>().unwrap(), 1.1);
        assert_eq!(rows[2][2].parse::<f64>().unwrap(), -2.0);
    }

    #[test]
    fn chain_csv_keeps_rejected_draws_with_zero_observables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.csv");
        let r = result();
        write_chain_csv(&path, &r.chain, &r.samples.names, 1).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, vec!["step", "walker", "mass_init", "log_L", "log_prob"]);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[3][0], "1");
        assert_eq!(&rows[3][1], "1");
        assert_eq!(rows[3][2].parse::<f64>().unwrap(), 3.0);
        assert_eq!(rows[3][3].parse::<f64>().unwrap(), 0.0);
        assert_eq!(rows[3][4].parse::<f64>().unwrap(), f64::NEG_INFINITY);
        assert_eq!(rows[1][3].parse::<f64>().unwrap(), 0.6);
    }

    #[test]
    fn report_json_names_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let config = RunConfig {
            parameters: vec!["mass_init".into()],
            ..RunConfig::default()
        };
        write_report_json(&path, &RunReport::new("mist", &config, &result())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["model"], "mist");
        assert_eq!(json["adapted_limits"][0]["name"], "mass_init");
        assert_eq!(json["adapted_limits"][0]["max"], 1.5);
        assert_eq!(json["best"][1]["name"], "log_L");
        assert_eq!(json["best"][1]["plus_error"], 0.03);
        assert_eq!(json["n_retained"], 3);
        assert!(json["generated"].is_string());
    }
}
