//! Run configuration.
//!
//! Loaded from a TOML file passed with `--config`. Relative paths are
//! resolved against the directory containing that file.
//!
//! ```toml
//! reference_dir = "reference"
//! output_dir = "output"
//! batch_size = 10
//!
//! [reference]
//! locations = [
//!     { file = "E92_CTRY.csv", level = "CTRY" },
//!     { file = "E38_CCG.csv", level = "CCG" },
//! ]
//! populations = ["UK.csv", "2019-ccg-estimates.csv"]
//! age_bands = "ccg-age-bands.csv"
//!
//! [feeds]
//! nhs_pathways = "downloads/NHS Pathways Covid-19 data.csv"
//!
//! [sync]
//! url = "https://fhir.example.org/R4"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use covid_stats_location::reference::ReferenceFiles;
use covid_stats_report::MISSING_LOCATIONS_FILE;
use covid_stats_source::fetch::is_remote;
use covid_stats_sync::DEFAULT_BATCH_SIZE;
use serde::Deserialize;

use crate::IngestError;

/// Environment variable overriding the sync endpoint.
pub const SYNC_URL_ENV: &str = "COVID_STATS_SYNC_URL";
/// Environment variable carrying the sync bearer token.
pub const SYNC_TOKEN_ENV: &str = "COVID_STATS_SYNC_TOKEN";

/// Settings for one pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Directory the reference files are named relative to.
    #[serde(default)]
    pub reference_dir: PathBuf,
    /// Reference files to load.
    #[serde(default)]
    pub reference: ReferenceFiles,
    /// Local copies (or alternative URLs) of feeds, by feed id.
    #[serde(default)]
    pub feeds: BTreeMap<String, String>,
    /// Where output files are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Name of the unresolvable-codes file in `output_dir`.
    #[serde(default = "default_missing_location_file")]
    pub missing_location_file: String,
    /// Records per transport batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Remote store, for `--push`.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the store.
    pub url: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_missing_location_file() -> String {
    MISSING_LOCATIONS_FILE.to_string()
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_dir: PathBuf::new(),
            reference: ReferenceFiles::default(),
            feeds: BTreeMap::new(),
            output_dir: default_output_dir(),
            missing_location_file: default_missing_location_file(),
            batch_size: default_batch_size(),
            sync: SyncConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses a config from TOML. Paths are left as written.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Toml`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self, IngestError> {
        Ok(toml::de::from_str(toml_str)?)
    }

    /// Reads the config at `path`, resolves relative paths against its
    /// directory and applies the environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| IngestError::File {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&contents)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve_paths(base);
        config.apply_overrides(
            std::env::var(SYNC_URL_ENV).ok(),
            std::env::var(SYNC_TOKEN_ENV).ok(),
        );

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Makes relative paths relative to `base`. Remote feed locations are
    /// left alone.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.reference_dir = base.join(&self.reference_dir);
        self.output_dir = base.join(&self.output_dir);
        for location in self.feeds.values_mut() {
            if !is_remote(location) {
                *location = base.join(&*location).display().to_string();
            }
        }
    }

    /// Replaces the sync settings with any non-blank override.
    pub fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            log::debug!("Sync URL taken from {SYNC_URL_ENV}");
            self.sync.url = Some(url);
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.sync.token = Some(token);
        }
    }

    /// The location to read `feed_id` from, if overridden.
    #[must_use]
    pub fn feed_location(&self, feed_id: &str) -> Option<&str> {
        self.feeds.get(feed_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use covid_stats_location_models::LocationLevel;

    use super::*;

    const CONFIG: &str = r#"
        reference_dir = "reference"

        [reference]
        locations = [
            { file = "E92_CTRY.csv", level = "CTRY" },
            { file = "E38_CCG.csv", level = "CCG" },
        ]
        populations = ["UK.csv"]

        [feeds]
        nhs_pathways = "downloads/pathways.csv"
        phe_dashboard = "https://example.org/data_latest.json"

        [sync]
        url = "https://fhir.example.org/R4"
    "#;

    #[test]
    fn parses_with_defaults() {
        let config = PipelineConfig::from_toml(CONFIG).unwrap();

        assert_eq!(config.reference.locations.len(), 2);
        assert_eq!(config.reference.locations[1].level, LocationLevel::Ccg);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.missing_location_file, "MissingLocation.csv");
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(config.sync.token.is_none());
    }

    #[test]
    fn resolves_relative_paths_but_not_urls() {
        let mut config = PipelineConfig::from_toml(CONFIG).unwrap();
        config.resolve_paths(Path::new("/etc/covid"));

        assert_eq!(config.reference_dir, PathBuf::from("/etc/covid/reference"));
        assert_eq!(config.output_dir, PathBuf::from("/etc/covid/output"));
        assert_eq!(
            config.feed_location("nhs_pathways"),
            Some("/etc/covid/downloads/pathways.csv")
        );
        assert_eq!(
            config.feed_location("phe_dashboard"),
            Some("https://example.org/data_latest.json")
        );
        assert_eq!(config.feed_location("nhs_111_online"), None);
    }

    #[test]
    fn overrides_replace_sync_settings() {
        let mut config = PipelineConfig::from_toml(CONFIG).unwrap();
        config.apply_overrides(Some(String::new()), Some("secret".to_string()));
        assert_eq!(config.sync.url.as_deref(), Some("https://fhir.example.org/R4"));
        assert_eq!(config.sync.token.as_deref(), Some("secret"));

        config.apply_overrides(Some("https://other.example.org".to_string()), None);
        assert_eq!(config.sync.url.as_deref(), Some("https://other.example.org"));
    }

    #[test]
    fn rejects_unknown_level() {
        let result = PipelineConfig::from_toml(
            r#"
            [reference]
            locations = [{ file = "x.csv", level = "PARISH" }]
            "#,
        );
        assert!(matches!(result, Err(IngestError::Toml(_))));
    }
}
