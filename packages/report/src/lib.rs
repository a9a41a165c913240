#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report assembly and the files written alongside a run.
//!
//! [`assemble`] builds the [`OutputRecord`]s. The [`output`] module
//! serializes them as JSON lines, fingerprints that serialization, and
//! writes the diagnostics side files.

pub mod assemble;
pub mod output;

pub use assemble::assemble;
pub use covid_stats_report_models::OutputRecord;
pub use output::{
    DIAGNOSTICS_FILE, FINGERPRINT_FILE, MISSING_LOCATIONS_FILE, RECORDS_FILE, batches,
    fingerprint, to_json_lines,
};

/// Errors that can occur while writing report files.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// I/O error (file write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
