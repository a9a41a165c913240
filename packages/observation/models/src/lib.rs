#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Observation types shared by the readers and the aggregation engine.
//!
//! Feeds produce [`RawObservation`]s. The merger turns them into one
//! [`DailyStat`] per [`StatKey`] (canonical organization + date), and the
//! rollup sums those up the hierarchy.

pub mod diagnostics;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use diagnostics::{Diagnostics, MalformedRecord};

/// Identifier system shared by all measure definitions.
pub const MEASURE_IDENTIFIER_SYSTEM: &str = "https://fhir.mayfield-is.co.uk/MEASURCODE";

/// The logical measures emitted per (organization, date).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum MeasureType {
    /// Confirmed cases.
    #[serde(rename = "PHE_COVID")]
    #[strum(serialize = "PHE_COVID")]
    CaseSurveillance,
    /// Deaths.
    #[serde(rename = "MORBIDITY_COVID")]
    #[strum(serialize = "MORBIDITY_COVID")]
    Mortality,
    /// NHS Pathways triage and 111 online assessments.
    #[serde(rename = "UEC_COVID")]
    #[strum(serialize = "UEC_COVID")]
    UrgentCareTriage,
}

impl MeasureType {
    /// All measures, in output order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::CaseSurveillance, Self::Mortality, Self::UrgentCareTriage]
    }

    /// The measure code (e.g. `"UEC_COVID"`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::CaseSurveillance => "PHE_COVID",
            Self::Mortality => "MORBIDITY_COVID",
            Self::UrgentCareTriage => "UEC_COVID",
        }
    }

    /// Identifier system of report natural keys for this measure.
    #[must_use]
    pub const fn system(self) -> &'static str {
        match self {
            Self::CaseSurveillance => "https://www.arcgis.com/fhir/CountyUAs_cases",
            Self::Mortality => "https://www.arcgis.com/fhir/Morbidity",
            Self::UrgentCareTriage => "https://fhir.mayfield-is.co.uk/Measure/NHS111",
        }
    }

    /// Human-readable title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::CaseSurveillance => "PHE COVID-19 confirmed cases",
            Self::Mortality => "COVID-19 deaths",
            Self::UrgentCareTriage => "NHS Pathways and 111 online COVID-19 assessments",
        }
    }

    /// Counters that belong to this measure.
    #[must_use]
    pub const fn counters(self) -> &'static [Counter] {
        match self {
            Self::CaseSurveillance => &[Counter::Cases],
            Self::Mortality => &[Counter::Deaths],
            Self::UrgentCareTriage => &[
                Counter::MaleTriage,
                Counter::FemaleTriage,
                Counter::UnknownTriage,
                Counter::MaleOnline,
                Counter::FemaleOnline,
                Counter::UnknownOnline,
            ],
        }
    }
}

/// Sex bucket of a triage or online assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    /// Male.
    Male,
    /// Female.
    Female,
    /// Anything else, including blank.
    Unknown,
}

impl Sex {
    /// Case-insensitive, trimmed match. Unrecognized values are
    /// [`Sex::Unknown`], never dropped.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        if label.eq_ignore_ascii_case("female") {
            Self::Female
        } else if label.eq_ignore_ascii_case("male") {
            Self::Male
        } else {
            Self::Unknown
        }
    }
}

/// What a raw observation counts. Feeds declare one per file or section.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RawCount {
    /// NHS Pathways triage calls (category is the sex).
    Triage,
    /// 111 online assessments (category is the sex).
    Online,
    /// Confirmed cases.
    Cases,
    /// Deaths.
    Deaths,
}

impl RawCount {
    /// The counter a value with the given category accumulates into.
    #[must_use]
    pub fn counter(self, category: Option<&str>) -> Counter {
        let sex = Sex::parse(category.unwrap_or_default());
        match (self, sex) {
            (Self::Triage, Sex::Male) => Counter::MaleTriage,
            (Self::Triage, Sex::Female) => Counter::FemaleTriage,
            (Self::Triage, Sex::Unknown) => Counter::UnknownTriage,
            (Self::Online, Sex::Male) => Counter::MaleOnline,
            (Self::Online, Sex::Female) => Counter::FemaleOnline,
            (Self::Online, Sex::Unknown) => Counter::UnknownOnline,
            (Self::Cases, _) => Counter::Cases,
            (Self::Deaths, _) => Counter::Deaths,
        }
    }
}

/// A named counter of a [`DailyStat`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Counter {
    /// Male triage calls.
    MaleTriage,
    /// Female triage calls.
    FemaleTriage,
    /// Triage calls of unknown sex.
    UnknownTriage,
    /// Male online assessments.
    MaleOnline,
    /// Female online assessments.
    FemaleOnline,
    /// Online assessments of unknown sex.
    UnknownOnline,
    /// Confirmed cases.
    Cases,
    /// Deaths.
    Deaths,
}

impl Counter {
    /// The measure this counter is reported under.
    #[must_use]
    pub const fn measure(self) -> MeasureType {
        match self {
            Self::Cases => MeasureType::CaseSurveillance,
            Self::Deaths => MeasureType::Mortality,
            Self::MaleTriage
            | Self::FemaleTriage
            | Self::UnknownTriage
            | Self::MaleOnline
            | Self::FemaleOnline
            | Self::UnknownOnline => MeasureType::UrgentCareTriage,
        }
    }
}

/// One row read from a feed, before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    /// Feed id the row came from.
    pub feed: String,
    /// Organization code as reported (possibly retired).
    pub organization_code: String,
    /// Organization name as reported, used as the diagnostics label.
    pub organization_name: Option<String>,
    /// Report date.
    pub date: NaiveDate,
    /// Free-text category (sex for triage feeds).
    pub category: Option<String>,
    /// What the value counts.
    pub kind: RawCount,
    /// The unparsed value cell.
    pub value: String,
    /// 1-based line (or entry index) within the feed, for diagnostics.
    pub line: u64,
}

impl RawObservation {
    /// Diagnostics label: the reported name, or the code when there is
    /// none.
    #[must_use]
    pub fn label(&self) -> &str {
        self.organization_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.organization_code)
    }
}

/// (canonical organization, date). Orders by organization first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatKey {
    /// Canonical organization code.
    pub organization: String,
    /// Calendar date.
    pub date: NaiveDate,
}

impl StatKey {
    /// Creates a key.
    #[must_use]
    pub fn new(organization: &str, date: NaiveDate) -> Self {
        Self {
            organization: organization.to_owned(),
            date,
        }
    }
}

/// The named counters reported for one organization on one date.
///
/// A counter is present once anything has been added to it, even zero, so
/// a reported zero is distinguishable from "not reported". Absent counters
/// read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyStat {
    counters: BTreeMap<Counter, u64>,
}

impl DailyStat {
    /// Adds `value` to `counter`.
    pub fn add(&mut self, counter: Counter, value: u64) {
        let slot = self.counters.entry(counter).or_default();
        *slot = slot.saturating_add(value);
    }

    /// Adds every counter of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (counter, value) in &other.counters {
            self.add(*counter, *value);
        }
    }

    /// Value of `counter`, zero when absent.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters.get(&counter).copied().unwrap_or_default()
    }

    /// Returns `true` if `counter` has been reported.
    #[must_use]
    pub fn contains(&self, counter: Counter) -> bool {
        self.counters.contains_key(&counter)
    }

    /// Returns `true` if any counter of `measure` has been reported.
    #[must_use]
    pub fn has_measure(&self, measure: MeasureType) -> bool {
        measure.counters().iter().any(|c| self.contains(*c))
    }

    /// Measures with at least one reported counter, in output order.
    #[must_use]
    pub fn measures(&self) -> Vec<MeasureType> {
        MeasureType::all()
            .iter()
            .copied()
            .filter(|m| self.has_measure(*m))
            .collect()
    }

    /// Male + female + unknown triage calls.
    #[must_use]
    pub fn triage_total(&self) -> u64 {
        self.get(Counter::MaleTriage)
            .saturating_add(self.get(Counter::FemaleTriage))
            .saturating_add(self.get(Counter::UnknownTriage))
    }

    /// Male + female + unknown online assessments.
    #[must_use]
    pub fn online_total(&self) -> u64 {
        self.get(Counter::MaleOnline)
            .saturating_add(self.get(Counter::FemaleOnline))
            .saturating_add(self.get(Counter::UnknownOnline))
    }

    /// The headline count of `measure`.
    #[must_use]
    pub fn primary(&self, measure: MeasureType) -> u64 {
        match measure {
            MeasureType::CaseSurveillance => self.get(Counter::Cases),
            MeasureType::Mortality => self.get(Counter::Deaths),
            MeasureType::UrgentCareTriage => self.triage_total(),
        }
    }

    /// Iterates reported counters in counter order.
    pub fn iter(&self) -> impl Iterator<Item = (Counter, u64)> + '_ {
        self.counters.iter().map(|(c, v)| (*c, *v))
    }

    /// Returns `true` if nothing has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn sex_is_trimmed_and_case_insensitive() {
        assert_eq!(Sex::parse(" Female "), Sex::Female);
        assert_eq!(Sex::parse("MALE"), Sex::Male);
        assert_eq!(Sex::parse("Unknown"), Sex::Unknown);
        assert_eq!(Sex::parse("not stated"), Sex::Unknown);
        assert_eq!(Sex::parse(""), Sex::Unknown);
    }

    #[test]
    fn raw_counts_bucket_by_category() {
        assert_eq!(RawCount::Triage.counter(Some("female")), Counter::FemaleTriage);
        assert_eq!(RawCount::Online.counter(Some("other")), Counter::UnknownOnline);
        assert_eq!(RawCount::Online.counter(None), Counter::UnknownOnline);
        assert_eq!(RawCount::Cases.counter(Some("male")), Counter::Cases);
    }

    #[test]
    fn measure_codes_round_trip() {
        for measure in MeasureType::all() {
            assert_eq!(MeasureType::from_str(measure.code()).unwrap(), *measure);
            assert_eq!(measure.to_string(), measure.code());
        }
    }

    #[test]
    fn every_counter_belongs_to_its_measure() {
        for measure in MeasureType::all() {
            for counter in measure.counters() {
                assert_eq!(counter.measure(), *measure);
            }
        }
    }

    #[test]
    fn reported_zero_is_present() {
        let mut stat = DailyStat::default();
        stat.add(Counter::Deaths, 0);
        assert!(stat.contains(Counter::Deaths));
        assert!(stat.has_measure(MeasureType::Mortality));
        assert!(!stat.has_measure(MeasureType::CaseSurveillance));
        assert_eq!(stat.get(Counter::Cases), 0);
    }

    #[test]
    fn merge_sums_elementwise() {
        let mut a = DailyStat::default();
        a.add(Counter::MaleTriage, 2);
        a.add(Counter::Cases, 1);
        let mut b = DailyStat::default();
        b.add(Counter::MaleTriage, 3);
        b.add(Counter::FemaleTriage, 4);

        a.merge(&b);
        assert_eq!(a.get(Counter::MaleTriage), 5);
        assert_eq!(a.triage_total(), 9);
        assert_eq!(a.primary(MeasureType::CaseSurveillance), 1);
        assert_eq!(
            a.measures(),
            vec![MeasureType::CaseSurveillance, MeasureType::UrgentCareTriage]
        );
    }

    #[test]
    fn totals_saturate_instead_of_overflowing() {
        let mut stat = DailyStat::default();
        stat.add(Counter::MaleTriage, u64::MAX);
        stat.add(Counter::FemaleTriage, 1);
        stat.add(Counter::MaleOnline, u64::MAX);
        stat.add(Counter::UnknownOnline, 5);

        assert_eq!(stat.get(Counter::MaleTriage), u64::MAX);
        assert_eq!(stat.triage_total(), u64::MAX);
        assert_eq!(stat.online_total(), u64::MAX);
        assert_eq!(stat.primary(MeasureType::UrgentCareTriage), u64::MAX);
    }

    #[test]
    fn stat_keys_order_by_organization_then_date() {
        let d1 = NaiveDate::from_ymd_opt(2020, 4, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2020, 4, 2).unwrap();
        assert!(StatKey::new("A", d2) < StatKey::new("B", d1));
        assert!(StatKey::new("A", d1) < StatKey::new("A", d2));
    }
}
