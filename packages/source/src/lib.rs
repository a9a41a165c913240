#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Source feeds and their readers.
//!
//! Each feed is described by an embedded TOML [`FeedDefinition`] (see
//! [`registry`]). [`load_feed`] fetches a feed's bytes and hands them to the
//! reader for its [`FeedFormat`], producing [`RawObservation`]s. Values are
//! not parsed here; counter parsing happens in the merger.

pub mod csv_feed;
pub mod feed;
pub mod fetch;
pub mod phe_json;
pub mod progress;
pub mod registry;
pub mod retry;

use covid_stats_observation_models::{Diagnostics, RawObservation};

pub use feed::{FeedDefinition, FeedFormat, ReaderConfig};

/// Errors that can occur while fetching or reading a feed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A local feed file could not be read.
    #[error("Failed to read {path}: {source}")]
    File {
        /// Path that was read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// None of the candidate headers for a required field were present.
    #[error("[{feed}] No column for {field} (looked for {candidates})")]
    MissingColumn {
        /// Feed id.
        feed: String,
        /// Field name.
        field: String,
        /// Candidate headers, comma-separated.
        candidates: String,
    },

    /// The server refused or failed the request.
    #[error("Fetch error: {message}")]
    Fetch {
        /// Description of what went wrong.
        message: String,
    },
}

/// Observations read from one feed, plus per-row problems.
#[derive(Debug, Default)]
pub struct FeedRead {
    /// One entry per accepted row or series point, in file order.
    pub observations: Vec<RawObservation>,
    /// Malformed rows that were skipped.
    pub diagnostics: Diagnostics,
}

/// Reads already-fetched feed bytes with the feed's configured reader.
///
/// # Errors
///
/// Returns [`SourceError`] if the bytes cannot be read in the feed's
/// format at all. Bad individual rows are diagnostics, not errors.
pub fn read_feed(feed: &FeedDefinition, bytes: &[u8]) -> Result<FeedRead, SourceError> {
    let read = match &feed.reader {
        ReaderConfig::Csv {
            counter,
            date_format,
            fields,
        } => csv_feed::read_csv(&feed.id, bytes, *counter, date_format, fields)?,
        ReaderConfig::PheJson { sections } => phe_json::read_phe_json(&feed.id, bytes, sections)?,
    };

    log::info!(
        "[{}] Read {} observations ({} malformed)",
        feed.id,
        read.observations.len(),
        read.diagnostics.malformed.len()
    );

    Ok(read)
}

/// Fetches and reads a feed. `location` overrides the feed's default URL
/// (typically a local copy of the file).
///
/// # Errors
///
/// Returns [`SourceError`] if the feed cannot be fetched or read.
pub async fn load_feed(
    feed: &FeedDefinition,
    location: Option<&str>,
) -> Result<FeedRead, SourceError> {
    let location = location.unwrap_or(&feed.url);
    log::info!("[{}] Loading {} from {location}", feed.id, feed.format());
    let bytes = fetch::fetch_bytes(location).await?;
    read_feed(feed, &bytes)
}

#[cfg(test)]
mod tests {
    use covid_stats_observation_models::RawCount;

    use super::*;

    fn pathways() -> FeedDefinition {
        registry::all_feeds()
            .into_iter()
            .find(|f| f.id == "nhs_pathways")
            .unwrap()
    }

    #[test]
    fn read_feed_dispatches_on_format() {
        let csv = "Call Date,Sex,CCGCode,CCGName,TriageCount\n18/03/2020,Male,E38000232,NHS Bradford,4\n";
        let read = read_feed(&pathways(), csv.as_bytes()).unwrap();
        assert_eq!(read.observations.len(), 1);
        assert_eq!(read.observations[0].kind, RawCount::Triage);
        assert_eq!(read.observations[0].feed, "nhs_pathways");
    }

    #[tokio::test]
    async fn load_feed_reads_local_override() {
        let path = std::env::temp_dir().join("covid_stats_source_pathways.csv");
        std::fs::write(
            &path,
            "Call Date,Sex,CCGCode,CCGName,TriageCount\n18/03/2020,Female,E38000232,NHS Bradford,2\n",
        )
        .unwrap();

        let read = load_feed(&pathways(), path.to_str()).await.unwrap();
        assert_eq!(read.observations.len(), 1);
        assert_eq!(read.observations[0].value, "2");

        std::fs::remove_file(&path).ok();
    }
}
