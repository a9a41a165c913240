//! Progress reporting for long-running pipeline stages.
//!
//! [`ProgressCallback`] decouples progress reporting from any rendering
//! backend. The CLI supplies an `indicatif` implementation; library callers
//! and tests use [`NullProgress`].

/// Receives progress updates from the feed reader and the push loop.
/// `Send + Sync` so one bar can be shared behind an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);

    /// Mark progress as complete and remove the indicator.
    fn finish_and_clear(&self);
}

/// Ignores all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}
