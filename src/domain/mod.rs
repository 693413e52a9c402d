//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parameter limits and column filters (`Limit`, `ColumnFilters`)
//! - model families and their file naming (`ModelFamily`)
//! - run configuration (`RunConfig`, `Observable`, `Percentiles`)
//! - run outputs (`RetainedSample`, `ResultSummary`, `Estimate`)

pub mod types;

pub use types::*;
