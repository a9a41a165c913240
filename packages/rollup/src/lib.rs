#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hierarchical rollup of daily statistics.
//!
//! For every date, each node's aggregate is its own reported stat plus the
//! aggregates of its children that have data on that date. Nodes are
//! processed deepest first, so a child's aggregate is complete before it is
//! added to its parent. Output is sparse: a (node, date) with no
//! contributing data has no entry.
//!
//! Dates are independent of each other and are rolled up separately.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use covid_stats_location::LocationRegistry;
use covid_stats_location_models::BrokenLink;
use covid_stats_observation::DailyStats;
use covid_stats_observation_models::{DailyStat, Diagnostics, StatKey};

/// Aggregates keyed by (node, date), at every hierarchy level.
pub type AggregateStats = BTreeMap<StatKey, DailyStat>;

/// Rolled-up aggregates and the anomalies hit along the way.
#[derive(Debug, Clone, Default)]
pub struct RollupOutput {
    /// One entry per (node, date) with data.
    pub aggregates: AggregateStats,
    /// Broken hierarchy links that truncated a rollup, and codes that were
    /// not in the registry.
    pub diagnostics: Diagnostics,
}

/// Precomputed tree shape for the nodes that have data.
struct Closure<'r> {
    /// Resolvable parent of each node in the closure.
    parent: BTreeMap<&'r str, &'r str>,
    /// Depth of each node in the closure.
    depth: BTreeMap<&'r str, usize>,
}

impl<'r> Closure<'r> {
    /// Builds the ancestor closure of `codes`: each code plus every
    /// resolvable ancestor.
    fn build(codes: impl IntoIterator<Item = &'r str>, registry: &'r LocationRegistry) -> Self {
        let mut parent = BTreeMap::new();
        let mut depth = BTreeMap::new();

        for code in codes {
            let mut current = code;
            while !depth.contains_key(current) {
                depth.insert(current, registry.depth(current));
                match registry.parent_of(current) {
                    Some(p) => {
                        parent.insert(current, p);
                        current = p;
                    }
                    None => break,
                }
            }
        }

        Self { parent, depth }
    }

    /// Nodes ordered deepest first, ties by code.
    fn bottom_up<'a>(&self, nodes: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let mut ordered: Vec<&str> = nodes.into_iter().collect();
        ordered.sort_by(|a, b| {
            let da = self.depth.get(*a).copied().unwrap_or_default();
            let db = self.depth.get(*b).copied().unwrap_or_default();
            db.cmp(&da).then_with(|| a.cmp(b))
        });
        ordered
    }
}

/// Rolls `leaf_stats` up through `registry`.
///
/// Stats for codes that are not in the registry are left out and reported
/// as missing locations.
#[must_use]
pub fn rollup(leaf_stats: &DailyStats, registry: &LocationRegistry) -> RollupOutput {
    let start = std::time::Instant::now();
    let mut diagnostics = Diagnostics::default();

    let mut by_date: BTreeMap<NaiveDate, BTreeMap<&str, &DailyStat>> = BTreeMap::new();
    for (key, stat) in leaf_stats {
        if !registry.exists(&key.organization) {
            if diagnostics.record_missing(&key.organization, &key.organization) {
                log::warn!(
                    "Rollup skipping stats for unknown location {}",
                    key.organization
                );
            }
            continue;
        }
        by_date
            .entry(key.date)
            .or_default()
            .insert(key.organization.as_str(), stat);
    }

    let reporting: BTreeSet<&str> = by_date
        .values()
        .flat_map(|stats| stats.keys().copied())
        .collect();
    let closure = Closure::build(reporting.iter().copied(), registry);
    diagnostics.broken_links = truncated_links(&reporting, registry);
    for link in &diagnostics.broken_links {
        log::warn!(
            "Rollup stops at {}: {} link to {}",
            link.code,
            link.kind,
            link.parent
        );
    }

    let mut aggregates = AggregateStats::new();
    for (date, own) in &by_date {
        for (code, stat) in rollup_date(own, &closure) {
            aggregates.insert(StatKey::new(code, *date), stat);
        }
    }

    log::info!(
        "Rollup complete: {} leaf stats into {} aggregates over {} dates in {:.1}s",
        leaf_stats.len(),
        aggregates.len(),
        by_date.len(),
        start.elapsed().as_secs_f64()
    );

    RollupOutput {
        aggregates,
        diagnostics,
    }
}

/// Rolls up a single date.
fn rollup_date<'a>(
    own: &BTreeMap<&'a str, &DailyStat>,
    closure: &Closure<'a>,
) -> BTreeMap<&'a str, DailyStat> {
    let mut totals: BTreeMap<&str, DailyStat> = own
        .iter()
        .map(|(code, stat)| (*code, (*stat).clone()))
        .collect();

    let mut nodes: BTreeSet<&str> = BTreeSet::new();
    for code in own.keys() {
        let mut current = *code;
        while nodes.insert(current) {
            match closure.parent.get(current).copied() {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }

    for code in closure.bottom_up(nodes) {
        let Some(parent) = closure.parent.get(code).copied() else {
            continue;
        };
        if let Some(stat) = totals.get(code).cloned() {
            totals.entry(parent).or_default().merge(&stat);
        }
    }

    totals
}

/// Broken links at the top of any chain that carries data.
fn truncated_links(reporting: &BTreeSet<&str>, registry: &LocationRegistry) -> Vec<BrokenLink> {
    let mut links = BTreeSet::new();
    for &code in reporting {
        let top = registry.ancestors(code).last().copied().unwrap_or(code);
        if let Some(link) = registry.broken_link(top) {
            links.insert(link.clone());
        }
    }
    links.into_iter().collect()
}
