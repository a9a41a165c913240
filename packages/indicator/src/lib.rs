#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Derived indicators per (node, date).
//!
//! Rates are pure functions of the aggregate and the node's static
//! attributes. The cost estimate and the running totals also depend on the
//! node's earlier dates, carried in a [`NodeHistory`] that is rebuilt on
//! every run from the aggregates themselves.

pub mod window;

use std::collections::BTreeMap;

use covid_stats_location::LocationRegistry;
use covid_stats_location_models::LocationNode;
use covid_stats_observation_models::{Counter, DailyStat, MeasureType, StatKey};
use covid_stats_rollup::AggregateStats;

pub use window::{COST_WINDOW_SIZE, CostWindow};

/// Population- and area-normalized rates of one measure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    /// Primary count per million residents. `None` when population is zero.
    pub per_million: Option<f64>,
    /// Primary count per hectare. `None` when area is absent or zero.
    pub per_hectare: Option<f64>,
}

/// Cumulative urgent-care counts up to and including a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTotals {
    /// All triage calls.
    pub triage: u64,
    /// Male triage calls.
    pub male_triage: u64,
    /// Female triage calls.
    pub female_triage: u64,
    /// All online assessments.
    pub online: u64,
    /// Male online assessments.
    pub male_online: u64,
    /// Female online assessments.
    pub female_online: u64,
}

impl RunningTotals {
    fn add(&mut self, stat: &DailyStat) {
        self.triage = self.triage.saturating_add(stat.triage_total());
        self.male_triage = self.male_triage.saturating_add(stat.get(Counter::MaleTriage));
        self.female_triage = self
            .female_triage
            .saturating_add(stat.get(Counter::FemaleTriage));
        self.online = self.online.saturating_add(stat.online_total());
        self.male_online = self.male_online.saturating_add(stat.get(Counter::MaleOnline));
        self.female_online = self
            .female_online
            .saturating_add(stat.get(Counter::FemaleOnline));
    }
}

/// Everything derived for one (node, date).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indicator {
    /// Rates of each measure present in the aggregate.
    pub rates: BTreeMap<MeasureType, Rates>,
    /// Age-weighted risk per capita. `None` without an age breakdown.
    pub risk_factor: Option<f64>,
    /// Moving average of raw cost over the trailing window. Only on dates
    /// with urgent-care data.
    pub cost_estimate: Option<f64>,
    /// Urgent-care running totals. Only on dates with urgent-care data.
    pub running_totals: Option<RunningTotals>,
}

/// Indicators keyed by (node, date).
pub type Indicators = BTreeMap<StatKey, Indicator>;

/// Per-node state carried across ascending dates.
#[derive(Debug, Clone, Default)]
pub struct NodeHistory {
    window: CostWindow,
    totals: RunningTotals,
}

impl NodeHistory {
    /// The node's cost window.
    #[must_use]
    pub const fn window(&self) -> &CostWindow {
        &self.window
    }
}

/// Rates of `measure` for `aggregate` at `node`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rates(aggregate: &DailyStat, node: &LocationNode, measure: MeasureType) -> Rates {
    let primary = aggregate.primary(measure) as f64;
    Rates {
        per_million: (node.population > 0)
            .then(|| primary / node.population as f64 * 1_000_000.0),
        per_hectare: node
            .area_hectares
            .filter(|area| *area > 0.0)
            .map(|area| primary / area),
    }
}

/// Raw cost for one date: risk factor times the day's total triage calls.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn raw_cost(aggregate: &DailyStat, risk_factor: f64) -> f64 {
    risk_factor * aggregate.triage_total() as f64
}

/// Computes the indicator for `aggregate` on `node`, advancing `history`.
///
/// Must be called for a node's dates in ascending order.
pub fn compute_indicator(
    aggregate: &DailyStat,
    node: &LocationNode,
    history: &mut NodeHistory,
) -> Indicator {
    let measures = aggregate.measures();
    let risk_factor = node.age_bands.as_ref().and_then(|bands| bands.risk_factor());

    let mut indicator = Indicator {
        rates: measures
            .iter()
            .map(|measure| (*measure, rates(aggregate, node, *measure)))
            .collect(),
        risk_factor,
        ..Indicator::default()
    };

    if measures.contains(&MeasureType::UrgentCareTriage) {
        history.totals.add(aggregate);
        indicator.running_totals = Some(history.totals);
        indicator.cost_estimate =
            risk_factor.map(|risk| history.window.push(raw_cost(aggregate, risk)));
    }

    indicator
}

/// Computes indicators for every aggregate.
///
/// Aggregates are visited in (node, date) order, so each node's history
/// advances through its dates in ascending order.
#[must_use]
pub fn compute_indicators(aggregates: &AggregateStats, registry: &LocationRegistry) -> Indicators {
    let start = std::time::Instant::now();
    let mut indicators = Indicators::new();
    let mut current: Option<(&str, NodeHistory)> = None;

    for (key, aggregate) in aggregates {
        let Some(node) = registry.get(&key.organization) else {
            log::debug!("No location for aggregate {}; skipping indicators", key.organization);
            continue;
        };

        if current
            .as_ref()
            .is_none_or(|(code, _)| *code != key.organization)
        {
            current = Some((key.organization.as_str(), NodeHistory::default()));
        }
        let Some((_, history)) = current.as_mut() else {
            continue;
        };

        indicators.insert(key.clone(), compute_indicator(aggregate, node, history));
    }

    log::info!(
        "Indicators complete: {} (node, date) pairs in {:.1}s",
        indicators.len(),
        start.elapsed().as_secs_f64()
    );

    indicators
}
