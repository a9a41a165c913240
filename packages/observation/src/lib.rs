#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Merges raw observations into one [`DailyStat`] per canonical
//! organization and date.
//!
//! Every observation's code is resolved through the merge table. Codes with
//! no known organization are recorded in [`Diagnostics`] and skipped, so
//! their counts never land on a wrong node. Observations that collide on a
//! key are summed regardless of which feed or legacy code produced them.

use std::collections::BTreeMap;

use covid_stats_location::LocationRegistry;
use covid_stats_location::parsing::parse_count;
use covid_stats_observation_models::{DailyStat, Diagnostics, RawObservation, StatKey};

/// Daily statistics keyed by (canonical organization, date).
pub type DailyStats = BTreeMap<StatKey, DailyStat>;

/// The merged statistics and what was skipped along the way.
#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    /// One entry per (canonical organization, date).
    pub stats: DailyStats,
    /// Unresolvable codes and malformed values.
    pub diagnostics: Diagnostics,
}

/// Accumulates observations against a registry.
pub struct ObservationMerger<'a> {
    registry: &'a LocationRegistry,
    output: MergeOutput,
    accepted: u64,
}

impl<'a> ObservationMerger<'a> {
    /// Creates an empty merger.
    #[must_use]
    pub fn new(registry: &'a LocationRegistry) -> Self {
        Self {
            registry,
            output: MergeOutput::default(),
            accepted: 0,
        }
    }

    /// Adds one observation. Returns `true` if it was aggregated.
    pub fn push(&mut self, observation: &RawObservation) -> bool {
        let canonical = self.registry.resolve(observation.organization_code.trim());

        if !self.registry.exists(canonical) {
            if self
                .output
                .diagnostics
                .record_missing(canonical, observation.label())
            {
                log::warn!(
                    "[{}] Unknown location {canonical} ({}); excluded from aggregation",
                    observation.feed,
                    observation.label()
                );
            }
            return false;
        }

        let Some(value) = parse_count(&observation.value) else {
            log::warn!(
                "[{}] Skipping malformed count {:?} for {canonical} at line {}",
                observation.feed,
                observation.value,
                observation.line
            );
            self.output.diagnostics.record_malformed(
                &observation.feed,
                observation.line,
                format!(
                    "malformed count {:?} for {canonical}",
                    observation.value
                ),
            );
            return false;
        };

        let counter = observation.kind.counter(observation.category.as_deref());
        self.output
            .stats
            .entry(StatKey::new(canonical, observation.date))
            .or_default()
            .add(counter, value);
        self.accepted += 1;
        true
    }

    /// Number of observations aggregated so far.
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Finishes merging.
    #[must_use]
    pub fn finish(self) -> MergeOutput {
        self.output
    }
}

/// Merges `observations` in one call.
#[must_use]
pub fn merge<'o>(
    observations: impl IntoIterator<Item = &'o RawObservation>,
    registry: &LocationRegistry,
) -> MergeOutput {
    let start = std::time::Instant::now();
    let mut merger = ObservationMerger::new(registry);
    let mut seen = 0_u64;
    for observation in observations {
        merger.push(observation);
        seen += 1;
    }
    let accepted = merger.accepted();
    let output = merger.finish();
    log::info!(
        "Merge complete: {accepted}/{seen} observations into {} daily stats in {:.1}s",
        output.stats.len(),
        start.elapsed().as_secs_f64()
    );
    output
}
