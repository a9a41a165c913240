//! Ten-year age bands and per-band risk coefficients.
//!
//! Population estimates are published in five-year groups; they are folded
//! into the ten-year [`AgeBand`]s here before the risk factor is computed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A ten-year age band.
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
pub enum AgeBand {
    /// 0 to 9 years old.
    #[serde(rename = "0-9")]
    #[strum(serialize = "0-9")]
    Age0To9,
    /// 10 to 19 years old.
    #[serde(rename = "10-19")]
    #[strum(serialize = "10-19")]
    Age10To19,
    /// 20 to 29 years old.
    #[serde(rename = "20-29")]
    #[strum(serialize = "20-29")]
    Age20To29,
    /// 30 to 39 years old.
    #[serde(rename = "30-39")]
    #[strum(serialize = "30-39")]
    Age30To39,
    /// 40 to 49 years old.
    #[serde(rename = "40-49")]
    #[strum(serialize = "40-49")]
    Age40To49,
    /// 50 to 59 years old.
    #[serde(rename = "50-59")]
    #[strum(serialize = "50-59")]
    Age50To59,
    /// 60 to 69 years old.
    #[serde(rename = "60-69")]
    #[strum(serialize = "60-69")]
    Age60To69,
    /// 70 to 79 years old.
    #[serde(rename = "70-79")]
    #[strum(serialize = "70-79")]
    Age70To79,
    /// 80 years old and over.
    #[serde(rename = "80+")]
    #[strum(serialize = "80+")]
    Age80Plus,
}

impl AgeBand {
    /// Returns all bands, youngest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Age0To9,
            Self::Age10To19,
            Self::Age20To29,
            Self::Age30To39,
            Self::Age40To49,
            Self::Age50To59,
            Self::Age60To69,
            Self::Age70To79,
            Self::Age80Plus,
        ]
    }

    /// Fixed per-band risk coefficient used by the cost estimate.
    #[must_use]
    pub const fn risk_coefficient(self) -> f64 {
        match self {
            Self::Age0To9 => 0.0,
            Self::Age10To19 | Self::Age20To29 | Self::Age30To39 => 0.002,
            Self::Age40To49 => 0.004,
            Self::Age50To59 => 0.013,
            Self::Age60To69 => 0.036,
            Self::Age70To79 => 0.08,
            Self::Age80Plus => 0.148,
        }
    }
}

/// Result of folding a five-year group label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeGroup {
    /// The group belongs to a ten-year band.
    Band(AgeBand),
    /// The "All ages" total row.
    AllAges,
}

/// Maps a published five-year group label (e.g. `"45-49"`, `"90+"`,
/// `"All ages"`) onto its ten-year band.
///
/// Returns `None` for labels that are not recognized.
#[must_use]
pub fn fold_age_group(label: &str) -> Option<AgeGroup> {
    let group = match label.trim() {
        "0-4" | "5-9" => AgeGroup::Band(AgeBand::Age0To9),
        "10-14" | "15-19" => AgeGroup::Band(AgeBand::Age10To19),
        "20-24" | "25-29" => AgeGroup::Band(AgeBand::Age20To29),
        "30-34" | "35-39" => AgeGroup::Band(AgeBand::Age30To39),
        "40-44" | "45-49" => AgeGroup::Band(AgeBand::Age40To49),
        "50-54" | "55-59" => AgeGroup::Band(AgeBand::Age50To59),
        "60-64" | "65-69" => AgeGroup::Band(AgeBand::Age60To69),
        "70-74" | "75-79" => AgeGroup::Band(AgeBand::Age70To79),
        "80-84" | "85-89" | "90+" => AgeGroup::Band(AgeBand::Age80Plus),
        "All ages" => AgeGroup::AllAges,
        _ => return None,
    };
    Some(group)
}

/// Population of one organization broken down by [`AgeBand`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeBandPopulation {
    /// Population per band. Bands absent from the source are absent here.
    pub bands: BTreeMap<AgeBand, u64>,
    /// The "All ages" population.
    pub total: u64,
}

impl AgeBandPopulation {
    /// Adds `count` people to the given group.
    pub fn add(&mut self, group: AgeGroup, count: u64) {
        match group {
            AgeGroup::Band(band) => {
                let slot = self.bands.entry(band).or_default();
                *slot = slot.saturating_add(count);
            }
            AgeGroup::AllAges => self.total = self.total.saturating_add(count),
        }
    }

    /// The "All ages" population, or the sum of the bands when the source
    /// had no "All ages" row.
    #[must_use]
    pub fn population(&self) -> u64 {
        if self.total > 0 {
            return self.total;
        }
        self.bands
            .values()
            .fold(0_u64, |sum, count| sum.saturating_add(*count))
    }

    /// Population-weighted risk per capita:
    /// `sum(band population * band coefficient) / population()`.
    ///
    /// Returns `None` when the population is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn risk_factor(&self) -> Option<f64> {
        let population = self.population();
        if population == 0 {
            return None;
        }
        let weighted: f64 = self
            .bands
            .iter()
            .map(|(band, count)| *count as f64 * band.risk_coefficient())
            .sum();
        Some(weighted / population as f64)
    }
}
