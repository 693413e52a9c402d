//! Input/output helpers.
//!
//! - evolution track discovery + Parquet reading (`tracks`)
//! - JSON run configuration (`config`)
//! - result exports (CSV/JSON) (`export`)

pub mod config;
pub mod export;
pub mod tracks;

pub use config::*;
pub use export::*;
pub use tracks::*;
