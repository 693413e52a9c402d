//! Ensemble sampling.
//!
//! The orchestrator only depends on the `EnsembleSampler` contract:
//!
//! ```text
//! run(initial W×D, n_steps, log_prob, a) -> Chain (n_steps × W states)
//! ```
//!
//! `StretchMove` is the default implementation: the affine-invariant
//! stretch move of Goodman & Weare (2010), with the ensemble split into two
//! halves that are updated in turn. Proposals for one half only depend on the
//! other half, so the posterior of all walkers in a half is evaluated in
//! parallel with rayon.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;

use crate::error::FitError;

/// State of one walker after a step.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkerState {
    pub position: Vec<f64>,
    pub log_prob: f64,
    /// Full observable vector; `None` for rejected (non-finite) points.
    pub blob: Option<Vec<f64>>,
}

/// One flattened draw of a walker at some step.
#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub theta: Vec<f64>,
    pub blob: Option<Vec<f64>>,
    pub log_prob: f64,
}

impl Draw {
    /// Blob padded with zeros for fixed-width storage.
    pub fn blob_or_zeros(&self, len: usize) -> Vec<f64> {
        self.blob.clone().unwrap_or_else(|| vec![0.0; len])
    }
}

/// All walker states of a run, step by step.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    pub steps: Vec<Vec<WalkerState>>,
    pub accepted: usize,
    pub proposed: usize,
}

impl Chain {
    pub fn n_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn n_walkers(&self) -> usize {
        self.steps.first().map_or(0, Vec::len)
    }

    pub fn acceptance_fraction(&self) -> f64 {
        if self.proposed == 0 {
            return 0.0;
        }
        self.accepted as f64 / self.proposed as f64
    }

    /// Drop the first `nrelax` steps of every walker and flatten the rest.
    pub fn discard(&self, nrelax: usize) -> Vec<Draw> {
        self.steps
            .iter()
            .skip(nrelax)
            .flatten()
            .map(|s| Draw {
                theta: s.position.clone(),
                blob: s.blob.clone(),
                log_prob: s.log_prob,
            })
            .collect()
    }
}

/// Cooperative stop request, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An ensemble MCMC sampler whose target returns `(ln p, blob)`.
pub trait EnsembleSampler {
    /// Advance `initial` for up to `n_steps` steps.
    ///
    /// When `stop` is raised the chain holds every step completed so far.
    fn run<F>(
        &mut self,
        initial: Vec<Vec<f64>>,
        n_steps: usize,
        log_prob: &F,
        a: f64,
        stop: &StopFlag,
    ) -> Result<Chain, FitError>
    where
        F: Fn(&[f64]) -> (f64, Option<Vec<f64>>) + Sync;
}

/// Affine-invariant stretch-move sampler.
#[derive(Debug)]
pub struct StretchMove {
    rng: StdRng,
}

impl StretchMove {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

/// A proposal for walker `k`, with the random numbers that decide it.
struct Proposal {
    walker: usize,
    position: Vec<f64>,
    z: f64,
    ln_u: f64,
}

/// Draw the stretch factor from `g(z) ∝ 1/√z` on `[1/a, a]`.
fn sample_z<R: Rng>(rng: &mut R, unit: &Uniform<f64>, a: f64) -> f64 {
    let u = unit.sample(rng);
    ((a - 1.0) * u + 1.0).powi(2) / a
}

impl EnsembleSampler for StretchMove {
    fn run<F>(
        &mut self,
        initial: Vec<Vec<f64>>,
        n_steps: usize,
        log_prob: &F,
        a: f64,
        stop: &StopFlag,
    ) -> Result<Chain, FitError>
    where
        F: Fn(&[f64]) -> (f64, Option<Vec<f64>>) + Sync,
    {
        let n_walkers = initial.len();
        if n_walkers < 2 {
            return Err(FitError::invalid("The stretch move needs at least 2 walkers."));
        }
        let n_dim = initial[0].len();
        if initial.iter().any(|p| p.len() != n_dim) {
            return Err(FitError::invalid("All walkers must have the same dimension."));
        }
        if !(a.is_finite() && a > 1.0) {
            return Err(FitError::invalid(format!("Stretch scale a must be > 1 (got {a}).")));
        }

        let unit = Uniform::new(0.0, 1.0);
        let mut states: Vec<WalkerState> = initial
            .into_par_iter()
            .map(|position| {
                let (lp, blob) = log_prob(&position);
                WalkerState {
                    position,
                    log_prob: sanitize(lp),
                    blob,
                }
            })
            .collect();

        let mut chain = Chain {
            steps: Vec::with_capacity(n_steps),
            ..Chain::default()
        };
        let report_every = (n_steps / 10).max(1);

        for step in 0..n_steps {
            if stop.is_stopped() {
                log::warn!("sampling stopped after {step} of {n_steps} steps");
                break;
            }

            for half in 0..2 {
                let partners: Vec<usize> = (0..n_walkers).filter(|i| i % 2 != half).collect();

                // Random numbers are drawn up front so seeded runs do not
                // depend on the thread count.
                let proposals: Vec<Proposal> = (0..n_walkers)
                    .filter(|i| i % 2 == half)
                    .map(|k| {
                        let j = partners[self.rng.gen_range(0..partners.len())];
                        let z = sample_z(&mut self.rng, &unit, a);
                        let ln_u = unit.sample(&mut self.rng).ln();
                        let position = states[j]
                            .position
                            .iter()
                            .zip(&states[k].position)
                            .map(|(xj, xk)| xj + z * (xk - xj))
                            .collect();
                        Proposal {
                            walker: k,
                            position,
                            z,
                            ln_u,
                        }
                    })
                    .collect();

                let evaluated: Vec<(f64, Option<Vec<f64>>)> =
                    proposals.par_iter().map(|p| log_prob(&p.position)).collect();

                for (proposal, (lp, blob)) in proposals.into_iter().zip(evaluated) {
                    let lp = sanitize(lp);
                    let current = &mut states[proposal.walker];
                    let ln_q = (n_dim as f64 - 1.0) * proposal.z.ln() + lp - current.log_prob;
                    chain.proposed += 1;
                    // NaN (both -inf) never accepts.
                    if proposal.ln_u < ln_q {
                        chain.accepted += 1;
                        *current = WalkerState {
                            position: proposal.position,
                            log_prob: lp,
                            blob,
                        };
                    }
                }
            }

            chain.steps.push(states.clone());

            if (step + 1) % report_every == 0 || step + 1 == n_steps {
                log::info!(
                    "step {}/{} ({:.0}%), acceptance {:.3}",
                    step + 1,
                    n_steps,
                    100.0 * (step + 1) as f64 / n_steps as f64,
                    chain.acceptance_fraction()
                );
            }
        }

        Ok(chain)
    }
}

fn sanitize(lp: f64) -> f64 {
    if lp.is_nan() { f64::NEG_INFINITY } else { lp }
}
