//! Terminal reporting for runs, tracks and model files.

pub mod format;

pub use format::*;
