#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Organization hierarchy types.
//!
//! A [`LocationNode`] is one administrative or health organization (a
//! country, an NHS region, a CCG, a local authority, ...) identified by its
//! canonical ONS/ODS code. Nodes point at their parent by code, forming the
//! tree that daily statistics are rolled up through.

pub mod age_band;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use age_band::{AgeBand, AgeBandPopulation, AgeGroup, fold_age_group};

/// The level/type tag of an organization in the hierarchy.
///
/// Serialized using the short tags found in the reference-data file names
/// (`CTRY`, `RGN`, `CCG`, ...).
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
pub enum LocationLevel {
    /// A country (or the UK as a whole).
    #[serde(rename = "CTRY")]
    #[strum(serialize = "CTRY")]
    Country,
    /// An English region.
    #[serde(rename = "RGN")]
    #[strum(serialize = "RGN")]
    Region,
    /// A metropolitan county.
    #[serde(rename = "MCTY")]
    #[strum(serialize = "MCTY")]
    MetropolitanCounty,
    /// A non-metropolitan county.
    #[serde(rename = "CTY")]
    #[strum(serialize = "CTY")]
    County,
    /// A London borough.
    #[serde(rename = "LONB")]
    #[strum(serialize = "LONB")]
    LondonBorough,
    /// A metropolitan district.
    #[serde(rename = "MD")]
    #[strum(serialize = "MD")]
    MetropolitanDistrict,
    /// A non-metropolitan district.
    #[serde(rename = "NMD")]
    #[strum(serialize = "NMD")]
    NonMetropolitanDistrict,
    /// A unitary authority.
    #[serde(rename = "UA")]
    #[strum(serialize = "UA")]
    UnitaryAuthority,
    /// NHS England as a whole.
    #[serde(rename = "NHSENG")]
    #[strum(serialize = "NHSENG")]
    NhsEngland,
    /// An NHS England region.
    #[serde(rename = "NHSER")]
    #[strum(serialize = "NHSER")]
    NhsRegion,
    /// Top-level NHS codes that do not fit a region (e.g. the "unknown"
    /// bucket used by the triage feeds).
    #[serde(rename = "NHSOTHER")]
    #[strum(serialize = "NHSOTHER")]
    NhsOther,
    /// An NHS region local office.
    #[serde(rename = "NHSRLO")]
    #[strum(serialize = "NHSRLO")]
    NhsRegionLocalOffice,
    /// A clinical commissioning group.
    #[serde(rename = "CCG")]
    #[strum(serialize = "CCG")]
    Ccg,
    /// Out-of-region NHS codes.
    #[serde(rename = "NHS_OTHERREGION")]
    #[strum(serialize = "NHS_OTHERREGION")]
    NhsOtherRegion,
}

/// A single organization in the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationNode {
    /// Canonical organization code (e.g. `"E38000232"`).
    pub code: String,
    /// Display name (e.g. "NHS Bradford District and Craven CCG").
    pub name: String,
    /// Parent organization code. `None` for roots.
    pub parent: Option<String>,
    /// Level/type tag.
    pub level: LocationLevel,
    /// Resident population. Zero when unknown.
    pub population: u64,
    /// Area in hectares.
    pub area_hectares: Option<f64>,
    /// Health index.
    pub health_index: Option<f64>,
    /// Multiple deprivation index.
    pub deprivation_index: Option<f64>,
    /// Population broken down by age band, when available.
    pub age_bands: Option<AgeBandPopulation>,
}

impl LocationNode {
    /// Creates a node with no static attributes.
    #[must_use]
    pub fn new(code: &str, name: &str, parent: Option<&str>, level: LocationLevel) -> Self {
        Self {
            code: code.to_owned(),
            name: name.to_owned(),
            parent: parent.map(str::to_owned),
            level,
            population: 0,
            area_hectares: None,
            health_index: None,
            deprivation_index: None,
            age_bands: None,
        }
    }

    /// Returns `true` if this node has no parent.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Why a node's parent link could not be followed.
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
pub enum BrokenLinkKind {
    /// The parent code is not a known organization.
    UnknownParent,
    /// Following parent links led back to this node. The link was detached.
    Cycle,
}

/// A hierarchy anomaly found while building the registry.
///
/// Rollup for the affected node stops at its highest resolvable ancestor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    /// The node whose parent link is broken.
    pub code: String,
    /// The parent code it pointed at.
    pub parent: String,
    /// What is wrong with the link.
    pub kind: BrokenLinkKind,
}
