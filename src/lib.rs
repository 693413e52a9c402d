//! `emcmass` library crate.
//!
//! Stellar parameters (mass, metallicity, evolutionary phase, ...) from
//! observed quantities, by ensemble MCMC over an interpolated grid of stellar
//! evolution tracks.
//!
//! The binary (`emcmass`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - a pre-built grid can be reused across many runs in one process

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod grid;
pub mod io;
pub mod math;
pub mod report;
