//! Config-driven feed definition.
//!
//! [`FeedDefinition`] captures everything unique about a source feed: where
//! to fetch it and how to turn its bytes into raw observations. One generic
//! reader per [`FeedFormat`] handles every feed.

use covid_stats_observation_models::RawCount;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

// ── Top-level feed definition ────────────────────────────────────────────

/// A complete, config-driven feed definition.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedDefinition {
    /// Unique identifier (e.g. `"nhs_pathways"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Default location: an `http(s)` URL or a local path.
    pub url: String,
    /// How to read the fetched bytes.
    pub reader: ReaderConfig,
}

impl FeedDefinition {
    /// Returns the feed's format.
    #[must_use]
    pub const fn format(&self) -> FeedFormat {
        match self.reader {
            ReaderConfig::Csv { .. } => FeedFormat::Csv,
            ReaderConfig::PheJson { .. } => FeedFormat::PheJson,
        }
    }
}

/// File formats a feed can be published in.
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
pub enum FeedFormat {
    /// One observation per CSV row.
    Csv,
    /// The PHE dashboard JSON extract.
    PheJson,
}

// ── Reader config ────────────────────────────────────────────────────────

/// Format-specific reader settings, tagged by `format`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ReaderConfig {
    /// CSV with a header row.
    Csv {
        /// What each row's value counts (`triage` or `online`).
        counter: RawCount,
        /// chrono format of the date column (e.g. `%d/%m/%Y`).
        date_format: String,
        /// Candidate header names per field.
        fields: CsvFields,
    },
    /// JSON object of sections, each keyed by organization code.
    PheJson {
        /// Sections to read.
        sections: Vec<PheSection>,
    },
}

/// Header names to look for, per field. The first header present wins and
/// matching ignores case and surrounding whitespace.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvFields {
    /// Organization code column.
    pub organization_code: Vec<String>,
    /// Organization name column (optional).
    #[serde(default)]
    pub organization_name: Vec<String>,
    /// Date column.
    pub date: Vec<String>,
    /// Category column (optional).
    #[serde(default)]
    pub category: Vec<String>,
    /// Value column.
    pub value: Vec<String>,
}

/// One section of the PHE extract.
#[derive(Debug, Clone, Deserialize)]
pub struct PheSection {
    /// Top-level key (e.g. `"utlas"`).
    pub key: String,
    /// Per-area array of `{ "date", "value" }` entries.
    pub series: String,
    /// What the values count (`cases` or `deaths`).
    pub counter: RawCount,
    /// Reports every area in the section under this code instead.
    #[serde(default)]
    pub code_override: Option<String>,
}

/// Parses a feed definition from TOML.
///
/// # Errors
///
/// Returns the TOML error message if parsing fails.
pub fn parse_feed_toml(toml_str: &str) -> Result<FeedDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_feed() {
        let feed = parse_feed_toml(
            r#"
            id = "x"
            name = "X"
            url = "x.csv"

            [reader]
            format = "csv"
            counter = "online"
            date_format = "%Y-%m-%d"

            [reader.fields]
            organization_code = ["code"]
            date = ["date"]
            value = ["n"]
            "#,
        )
        .unwrap();

        assert_eq!(feed.format(), FeedFormat::Csv);
        let ReaderConfig::Csv { counter, fields, .. } = feed.reader else {
            panic!("expected csv reader");
        };
        assert_eq!(counter, RawCount::Online);
        assert!(fields.category.is_empty());
    }

    #[test]
    fn parses_phe_sections() {
        let feed = parse_feed_toml(
            r#"
            id = "p"
            name = "P"
            url = "p.json"

            [reader]
            format = "phe_json"

            [[reader.sections]]
            key = "overview"
            series = "dailyTotalDeaths"
            counter = "deaths"
            code_override = "Z92"
            "#,
        )
        .unwrap();

        assert_eq!(feed.format(), FeedFormat::PheJson);
        let ReaderConfig::PheJson { sections } = feed.reader else {
            panic!("expected phe_json reader");
        };
        assert_eq!(sections[0].code_override.as_deref(), Some("Z92"));
    }

    #[test]
    fn rejects_unknown_format() {
        let result = parse_feed_toml(
            r#"
            id = "x"
            name = "X"
            url = "x.xlsx"

            [reader]
            format = "xlsx"
            "#,
        );
        assert!(result.is_err());
    }
}
