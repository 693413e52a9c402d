//! Chain post-processing: validity filter, blob merge, best fit and
//! credible intervals.

use crate::domain::{Estimate, Percentiles, RetainedSample, ResultSummary};
use crate::error::FitError;
use crate::fit::sampler::Draw;
use crate::math::percentiles;

/// Fit parameters and grid variables end up as columns of one record, so
/// their names must not overlap.
pub fn check_disjoint(parameters: &[String], variables: &[String]) -> Result<(), FitError> {
    match parameters.iter().find(|p| variables.contains(p)) {
        Some(name) => Err(FitError::NameCollision(name.clone())),
        None => Ok(()),
    }
}

/// Keep the finite draws and merge each parameter vector with its blob.
pub fn retain_draws(
    draws: Vec<Draw>,
    parameters: &[String],
    variables: &[String],
) -> Result<RetainedSample, FitError> {
    check_disjoint(parameters, variables)?;

    let total = draws.len();
    let mut rows = Vec::with_capacity(total);
    let mut log_probs = Vec::with_capacity(total);
    for draw in draws.into_iter().filter(|d| d.log_prob.is_finite()) {
        let Some(blob) = draw.blob else {
            return Err(FitError::invalid("A draw with a finite log-posterior carries no observables."));
        };
        if draw.theta.len() != parameters.len() || blob.len() != variables.len() {
            return Err(FitError::invalid(format!(
                "Draw shape {}+{} does not match {} parameters + {} variables.",
                draw.theta.len(),
                blob.len(),
                parameters.len(),
                variables.len()
            )));
        }
        let mut row = draw.theta;
        row.extend(blob);
        rows.push(row);
        log_probs.push(draw.log_prob);
    }

    log::info!(
        "{} of {total} draws retained, {} rejected",
        rows.len(),
        total - rows.len()
    );
    if rows.is_empty() {
        return Err(FitError::NoValidSamples);
    }

    Ok(RetainedSample {
        names: parameters.iter().chain(variables).cloned().collect(),
        rows,
        log_probs,
    })
}

/// Index of a draw with the highest log-posterior.
///
/// Which of several equal maxima is returned is unspecified.
pub fn best_index(sample: &RetainedSample) -> Option<usize> {
    sample
        .log_probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// The best draw as `(name, value)` pairs.
pub fn best_record(sample: &RetainedSample) -> Result<Vec<(String, f64)>, FitError> {
    let best = best_index(sample).ok_or(FitError::NoValidSamples)?;
    Ok(sample
        .names
        .iter()
        .cloned()
        .zip(sample.rows[best].iter().copied())
        .collect())
}

/// Median and asymmetric errors of every column.
///
/// `median = P(mid)`, `minus_error = median - P(low)`,
/// `plus_error = P(high) - median`, each over the column's finite values.
/// A column without any finite value gets an all-NaN estimate.
pub fn calculate_percentiles(
    sample: &RetainedSample,
    pct: Percentiles,
) -> Result<ResultSummary, FitError> {
    if !pct.is_valid() {
        return Err(FitError::invalid(format!(
            "Percentiles must satisfy 0 <= low <= mid <= high <= 100 (got {}, {}, {}).",
            pct.low, pct.mid, pct.high
        )));
    }
    let best = best_index(sample).ok_or(FitError::NoValidSamples)?;

    let fields = sample
        .names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let column = sample.column(i);
            let finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.len() < column.len() {
                log::warn!(
                    "{name}: {} of {} retained values are not finite and are left out of the summary",
                    column.len() - finite.len(),
                    column.len()
                );
            }
            if finite.is_empty() {
                return (name.clone(), Estimate::undefined());
            }

            let p = percentiles(&finite, &[pct.low, pct.mid, pct.high]);
            let best_value = sample.rows[best][i];
            let estimate = Estimate {
                best: if best_value.is_finite() { best_value } else { f64::NAN },
                median: p[1],
                minus_error: p[1] - p[0],
                plus_error: p[2] - p[1],
            };
            (name.clone(), estimate)
        })
        .collect();

    Ok(ResultSummary { fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn draw(m: f64, lp: f64) -> Draw {
        Draw {
            theta: vec![m],
            blob: lp.is_finite().then(|| vec![2.0 * m, -m]),
            log_prob: lp,
        }
    }

    fn sample() -> RetainedSample {
        let draws = (0..101)
            .map(|i| draw(i as f64 / 100.0, -((i as f64 - 70.0) / 10.0).powi(2)))
            .chain([draw(9.0, f64::NEG_INFINITY), draw(8.0, f64::NEG_INFINITY)])
            .collect();
        retain_draws(draws, &names(&["mass_init"]), &names(&["log_L", "neg"])).unwrap()
    }

    #[test]
    fn non_finite_draws_are_dropped_and_blobs_merged() {
        let s = sample();
        assert_eq!(s.len(), 101);
        assert_eq!(s.names, names(&["mass_init", "log_L", "neg"]));
        assert_eq!(s.rows[50], vec![0.5, 1.0, -0.5]);
    }

    #[test]
    fn best_draw_dominates() {
        let s = sample();
        let best = best_index(&s).unwrap();
        assert!(s.log_probs.iter().all(|lp| *lp <= s.log_probs[best]));

        let record = best_record(&s).unwrap();
        assert_eq!(record[0], ("mass_init".to_string(), 0.7));
        assert_eq!(record[1].1, 1.4);
    }

    #[test]
    fn percentile_summary() {
        let s = sample();
        let summary = calculate_percentiles(&s, Percentiles::default()).unwrap();
        let m = summary.get("mass_init").unwrap();
        assert!((m.median - 0.5).abs() < 1e-12);
        assert!((m.minus_error - 0.34).abs() < 1e-12);
        assert!((m.plus_error - 0.34).abs() < 1e-12);
        assert_eq!(m.best, 0.7);

        // A decreasing derived column keeps ordered percentiles.
        let neg = summary.get("neg").unwrap();
        assert!(neg.minus_error >= 0.0 && neg.plus_error >= 0.0);
        assert!((neg.median + 0.5).abs() < 1e-12);
    }

    #[test]
    fn all_rejected_is_an_error() {
        let draws = vec![draw(1.0, f64::NEG_INFINITY); 20];
        let err = retain_draws(draws, &names(&["mass_init"]), &names(&["log_L", "neg"])).unwrap_err();
        assert!(matches!(err, FitError::NoValidSamples));
    }

    #[test]
    fn name_collision_is_an_error() {
        let err = check_disjoint(&names(&["mass_init", "M_H"]), &names(&["log_L", "M_H"])).unwrap_err();
        assert!(matches!(err, FitError::NameCollision(ref n) if n == "M_H"));
    }

    #[test]
    fn non_finite_blob_values_are_left_out_of_the_summary() {
        // Derived column with two missing values (nulls read as NaN).
        let derived = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, f64::NAN, -f64::NAN];
        let s = RetainedSample {
            names: names(&["mass_init", "log_R", "log_g"]),
            rows: derived
                .iter()
                .enumerate()
                .map(|(i, d)| vec![i as f64, *d, f64::NAN])
                .collect(),
            log_probs: (0..10).map(|i| -(i as f64)).collect(),
        };
        let summary = calculate_percentiles(&s, Percentiles::default()).unwrap();

        let r = summary.get("log_R").unwrap();
        assert!((r.median - 3.5).abs() < 1e-12);
        assert!(r.minus_error.is_finite() && r.minus_error > 0.0);
        assert!(r.plus_error.is_finite() && r.plus_error > 0.0);
        assert!((r.minus_error - r.plus_error).abs() < 1e-12);
        assert_eq!(r.best, 0.0);

        let g = summary.get("log_g").unwrap();
        assert!(g.best.is_nan() && g.median.is_nan());
        assert!(g.minus_error.is_nan() && g.plus_error.is_nan());

        let m = summary.get("mass_init").unwrap();
        assert!((m.median - 4.5).abs() < 1e-12);
    }

    #[test]
    fn invalid_percentiles_are_rejected() {
        let s = sample();
        let pct = Percentiles { low: 84.0, mid: 50.0, high: 16.0 };
        assert!(calculate_percentiles(&s, pct).is_err());
    }
}
