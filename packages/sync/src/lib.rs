#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sync gateway: delivers output records to a [`RecordSink`].
//!
//! [`push`] cuts the records into transport batches and sends them in
//! order. Two sinks are provided:
//!
//! | Sink | Destination |
//! |---|---|
//! | [`JsonLinesSink`] | `records.jsonl` in an output directory |
//! | [`HttpBundleSink`] | a remote store, one transaction bundle per batch |
//!
//! Both upsert by natural key, so pushing the same records twice leaves
//! the destination unchanged.

pub mod bundle;
pub mod http;
pub mod jsonl;

use std::time::Instant;

use async_trait::async_trait;
use covid_stats_report::{OutputRecord, ReportError, batches};
use covid_stats_source::SourceError;
use covid_stats_source::progress::ProgressCallback;

pub use http::HttpBundleSink;
pub use jsonl::JsonLinesSink;

/// Default number of records per transport batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Errors that can occur while delivering records.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Request failed after retries.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing the records file failed.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// The sink is misconfigured.
    #[error("Sync configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// The destination refused some entries of a batch.
    #[error("Batch rejected: {message}")]
    Rejected {
        /// Description of what went wrong.
        message: String,
    },
}

/// Destination for output records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Readies the destination (registers measure definitions). Safe to
    /// call on every run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the destination cannot be prepared.
    async fn prepare(&mut self) -> Result<(), SyncError>;

    /// Sends one batch. Records already present are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the batch cannot be delivered.
    async fn send_batch(&mut self, records: &[OutputRecord]) -> Result<(), SyncError>;

    /// Called once after the last batch.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the destination cannot be finalized.
    async fn finish(&mut self) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Outcome of a [`push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushSummary {
    /// Batches sent.
    pub batches: u64,
    /// Records sent.
    pub records: u64,
}

/// Sends `records` to `sink` in batches of `batch_size` (at least 1),
/// preserving order.
///
/// # Errors
///
/// Returns the first [`SyncError`] the sink reports; later batches are not
/// sent.
pub async fn push(
    records: &[OutputRecord],
    sink: &mut dyn RecordSink,
    batch_size: usize,
    progress: &dyn ProgressCallback,
) -> Result<PushSummary, SyncError> {
    let start = Instant::now();
    sink.prepare().await?;

    progress.set_total(records.len() as u64);
    progress.set_message("Sending records".to_string());

    let mut summary = PushSummary {
        batches: 0,
        records: 0,
    };

    for batch in batches(records, batch_size) {
        sink.send_batch(batch).await.inspect_err(|e| {
            log::error!(
                "Batch {} failed after {} records: {e}",
                summary.batches + 1,
                summary.records
            );
        })?;
        summary.batches += 1;
        summary.records += batch.len() as u64;
        progress.inc(batch.len() as u64);
    }

    sink.finish().await?;
    progress.finish(format!("Sent {} records", summary.records));

    log::info!(
        "Push complete: {} records in {} batches in {:.1}s",
        summary.records,
        summary.batches,
        start.elapsed().as_secs_f64()
    );

    Ok(summary)
}
