#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Logger and progress bars for the covid-stats binaries.
//!
//! [`init_logger`] installs `pretty_env_logger` behind
//! `indicatif-log-bridge`, so log lines are suspended while the bars created
//! here redraw.

use std::sync::Arc;
use std::time::Duration;

use covid_stats_source::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] behind [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once `set_total()` provides a known length.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Bar for steps whose count is known up front, such as feeds (1/3).
    #[must_use]
    pub fn steps_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        let bar_style = bar_style("{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]");
        let bar = multi.add(ProgressBar::new(total).with_style(bar_style.clone()));
        bar.set_message(message.to_string());

        Arc::new(Self { bar, bar_style })
    }

    /// Bar for sending records. Starts as a spinner and becomes a bar with
    /// percentage and ETA when the record count is set.
    #[must_use]
    pub fn records_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let spinner = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = multi.add(ProgressBar::new_spinner().with_style(spinner));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(message.to_string());

        Arc::new(Self {
            bar,
            bar_style: bar_style("  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]"),
        })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Installs the global logger (level from `RUST_LOG`) wrapped in
/// `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set when several tests initialize logging.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_bar_tracks_position() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::steps_bar(&multi, "Feeds", 3);
        progress.inc(1);
        progress.inc(2);
        progress.finish("done".to_string());
    }

    #[test]
    fn records_bar_switches_to_a_bar_once_sized() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::records_bar(&multi, "Sending records");
        progress.set_total(23);
        progress.inc(10);
        progress.set_message("batch 2".to_string());
        progress.finish_and_clear();
    }

    #[test]
    fn init_logger_twice_does_not_panic() {
        let _first = init_logger();
        let _second = init_logger();
    }
}
