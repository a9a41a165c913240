#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output records.
//!
//! One [`OutputRecord`] per (organization, date, measure), identified by a
//! [`NaturalKey`] that the sync gateway upserts on.

use chrono::NaiveDate;
use covid_stats_observation_models::MeasureType;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Natural key of a record: an identifier system plus
/// `{organizationCode}-{yyyyMMdd}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Identifier system (one per measure).
    pub system: String,
    /// Identifier value.
    pub value: String,
}

impl NaturalKey {
    /// Builds the key of `organization` on `date` for `measure`.
    #[must_use]
    pub fn new(measure: MeasureType, organization: &str, date: NaiveDate) -> Self {
        Self {
            system: measure.system().to_owned(),
            value: format!("{organization}-{}", date.format("%Y%m%d")),
        }
    }

    /// `system|value`, the conditional-update search token.
    #[must_use]
    pub fn token(&self) -> String {
        format!("{}|{}", self.system, self.value)
    }
}

/// Named score fields, in output order.
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ScoreField {
    /// The measure's primary count.
    Count,
    /// Count per million residents.
    PerMillion,
    /// Count per hectare.
    PerHectare,
    /// Health index of the organization.
    HealthIndex,
    /// Multiple deprivation index of the organization.
    DeprivationIndex,
    /// Online assessments on the date.
    DailyOnline,
    /// Moving-average cost estimate.
    CostEstimate,
    /// Age-weighted risk per capita.
    RiskFactor,
    /// Cumulative triage calls.
    TriageTotal,
    /// Cumulative male triage calls.
    MaleTriageTotal,
    /// Cumulative female triage calls.
    FemaleTriageTotal,
    /// Cumulative online assessments.
    OnlineTotal,
    /// Cumulative male online assessments.
    MaleOnlineTotal,
    /// Cumulative female online assessments.
    FemaleOnlineTotal,
}

/// A score's value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    /// A count.
    Integer(u64),
    /// A rate or index.
    Decimal(f64),
}

/// One named score of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Which score this is.
    pub field: ScoreField,
    /// The value.
    pub value: ScoreValue,
    /// Population the count was observed in (on `count` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
}

/// One emitted unit per (organization, date, measure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    /// Upsert key.
    pub key: NaturalKey,
    /// Measure reported.
    pub measure: MeasureType,
    /// Canonical organization code.
    pub organization: String,
    /// Report date.
    pub date: NaiveDate,
    /// Scores, in [`ScoreField`] order.
    pub scores: Vec<Score>,
}

impl OutputRecord {
    /// Looks up a score by field.
    #[must_use]
    pub fn score(&self, field: ScoreField) -> Option<ScoreValue> {
        self.scores
            .iter()
            .find(|score| score.field == field)
            .map(|score| score.value)
    }
}

impl ScoreValue {
    /// The value as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(v) => v as f64,
            Self::Decimal(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_is_code_and_compact_date() {
        let date = NaiveDate::from_ymd_opt(2020, 4, 10).unwrap();
        let key = NaturalKey::new(MeasureType::UrgentCareTriage, "E38000232", date);
        assert_eq!(key.value, "E38000232-20200410");
        assert_eq!(
            key.token(),
            "https://fhir.mayfield-is.co.uk/Measure/NHS111|E38000232-20200410"
        );
    }

    #[test]
    fn keys_differ_by_measure() {
        let date = NaiveDate::from_ymd_opt(2020, 4, 10).unwrap();
        let cases = NaturalKey::new(MeasureType::CaseSurveillance, "E92000001", date);
        let deaths = NaturalKey::new(MeasureType::Mortality, "E92000001", date);
        assert_eq!(cases.value, deaths.value);
        assert_ne!(cases, deaths);
    }

    #[test]
    fn score_fields_are_kebab_case() {
        assert_eq!(ScoreField::PerMillion.to_string(), "per-million");
        assert_eq!(ScoreField::FemaleOnlineTotal.as_ref(), "female-online-total");
    }
}
