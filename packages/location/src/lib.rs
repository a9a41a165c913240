#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Organization hierarchy and code canonicalization.
//!
//! The [`LocationRegistry`] owns every known organization, the parent/child
//! index built from their parent links, and the [`MergeTable`] that maps
//! retired codes onto their current replacements. Reference data (location
//! lists, populations, deprivation indices, age-band estimates) is loaded
//! from CSV by the [`reference`] module.

pub mod merge_table;
pub mod parsing;
pub mod reference;
pub mod registry;

pub use covid_stats_location_models::{BrokenLink, BrokenLinkKind};
pub use merge_table::MergeTable;
pub use registry::LocationRegistry;

/// Errors that can occur while loading reference data.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A reference file could not be opened.
    #[error("I/O error at {path}: {source}")]
    File {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing failed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The merge table is inconsistent.
    #[error("Invalid merge table: {message}")]
    MergeTable {
        /// Description of what went wrong.
        message: String,
    },
}
