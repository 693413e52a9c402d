//! Posterior sampling and its post-processing.
//!
//! Responsibilities:
//!
//! - flat prior + chi-square likelihood over the track grid (`posterior`)
//! - starting ensemble inside the adapted limits (`walkers`)
//! - ensemble MCMC with blobs (`sampler`)
//! - burn-in discard, validity filter, best fit and percentiles (`summary`)
//! - the end-to-end run (`orchestrator`)

pub mod orchestrator;
pub mod posterior;
pub mod sampler;
pub mod summary;
pub mod walkers;

pub use orchestrator::*;
pub use posterior::*;
pub use sampler::*;
pub use summary::*;
pub use walkers::*;
