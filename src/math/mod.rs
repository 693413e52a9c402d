//! Mathematical utilities: sample statistics.

pub mod stats;

pub use stats::*;
