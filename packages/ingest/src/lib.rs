#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline orchestration.
//!
//! A run loads the reference data into a [`LocationRegistry`], reads the
//! enabled feeds, and then computes
//! `merge → rollup → indicators → assemble` in memory ([`compute`]). The
//! resulting records and diagnostics are written to the output directory
//! and optionally pushed to a remote store.

pub mod config;

use std::time::Instant;

use covid_stats_indicator::compute_indicators;
use covid_stats_location::reference::ReferenceData;
use covid_stats_location::{LocationError, LocationRegistry, MergeTable};
use covid_stats_observation::merge;
use covid_stats_observation_models::{Diagnostics, RawObservation};
use covid_stats_report::{OutputRecord, ReportError, assemble, fingerprint, output};
use covid_stats_rollup::rollup;
use covid_stats_source::progress::{NullProgress, ProgressCallback};
use covid_stats_source::{FeedDefinition, SourceError, load_feed};
use covid_stats_sync::{JsonLinesSink, PushSummary, RecordSink, SyncError, push};

pub use config::PipelineConfig;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    File {
        /// Path that was read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The run config is not valid TOML.
    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Reference data could not be loaded.
    #[error(transparent)]
    Location(#[from] LocationError),

    /// A feed could not be fetched or read.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Output files could not be written.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Records could not be delivered.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The run is misconfigured.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

/// Records and diagnostics of one computation.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Output records, ordered by (organization, date, measure).
    pub records: Vec<OutputRecord>,
    /// Everything that was skipped or flagged.
    pub diagnostics: Diagnostics,
    /// SHA-256 of the records' JSON-lines serialization.
    pub fingerprint: String,
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Records written.
    pub records: usize,
    /// Output fingerprint.
    pub fingerprint: String,
    /// Codes with no known organization.
    pub missing_locations: usize,
    /// Rows skipped as malformed.
    pub malformed: usize,
    /// Broken hierarchy links.
    pub broken_links: usize,
    /// Outcome of the push, when one was requested.
    pub pushed: Option<PushSummary>,
}

/// Returns all configured feed definitions.
#[must_use]
pub fn all_feeds() -> Vec<FeedDefinition> {
    covid_stats_source::registry::all_feeds()
}

/// Returns the feeds to read, filtered by the `--feeds` flag or the
/// `COVID_STATS_FEEDS` environment variable.
#[must_use]
pub fn enabled_feeds(cli_filter: Option<&str>) -> Vec<FeedDefinition> {
    let ids = cli_filter
        .map(covid_stats_source::registry::split_filter)
        .unwrap_or_default();
    covid_stats_source::registry::enabled_feeds(&ids)
}

/// Loads the reference data named in `config` and builds the registry.
///
/// Rejected reference rows and broken hierarchy links are returned as
/// diagnostics.
///
/// # Errors
///
/// Returns [`IngestError::Location`] if a reference file cannot be read.
pub fn load_registry(
    config: &PipelineConfig,
) -> Result<(LocationRegistry, Diagnostics), IngestError> {
    let start = Instant::now();
    let merges = MergeTable::embedded();
    let data = ReferenceData::load(&config.reference, &config.reference_dir, &merges)?;

    let mut diagnostics = Diagnostics::default();
    for row in &data.rejected {
        diagnostics.record_malformed(&row.file, row.line, row.message.clone());
    }

    let registry = data.into_registry(merges);
    diagnostics.extend(Diagnostics {
        broken_links: registry.broken_links().to_vec(),
        ..Diagnostics::default()
    });

    log::info!(
        "Reference data complete: {} locations, {} broken links in {:.1}s",
        registry.len(),
        diagnostics.broken_links.len(),
        start.elapsed().as_secs_f64()
    );

    Ok((registry, diagnostics))
}

/// Reads every feed in order. A feed that cannot be fetched or read is
/// logged and recorded in the diagnostics; the others still run.
pub async fn read_feeds(
    feeds: &[FeedDefinition],
    config: &PipelineConfig,
    progress: &dyn ProgressCallback,
) -> (Vec<RawObservation>, Diagnostics) {
    let start = Instant::now();
    let mut observations = Vec::new();
    let mut diagnostics = Diagnostics::default();

    progress.set_total(feeds.len() as u64);

    for feed in feeds {
        progress.set_message(feed.name.clone());
        match load_feed(feed, config.feed_location(&feed.id)).await {
            Ok(read) => {
                observations.extend(read.observations);
                diagnostics.extend(read.diagnostics);
            }
            Err(e) => {
                log::error!("Failed to read {}: {e}", feed.id);
                diagnostics.record_malformed(&feed.id, 0, format!("feed not read: {e}"));
            }
        }
        progress.inc(1);
    }

    progress.finish(format!("Read {} feeds", feeds.len()));
    log::info!(
        "Feeds complete: {} observations from {} feeds in {:.1}s",
        observations.len(),
        feeds.len(),
        start.elapsed().as_secs_f64()
    );

    (observations, diagnostics)
}

/// Runs `merge → rollup → indicators → assemble` over `observations`.
///
/// Pure apart from logging: identical inputs give identical records and
/// fingerprint. `diagnostics` carries anomalies from earlier stages and is
/// extended with the ones found here.
///
/// # Errors
///
/// Returns [`IngestError::Report`] if the records cannot be serialized for
/// fingerprinting.
pub fn compute(
    registry: &LocationRegistry,
    observations: &[RawObservation],
    mut diagnostics: Diagnostics,
) -> Result<PipelineOutput, IngestError> {
    let merged = merge(observations, registry);
    diagnostics.extend(merged.diagnostics);

    let rolled = rollup(&merged.stats, registry);
    diagnostics.extend(rolled.diagnostics);

    let indicators = compute_indicators(&rolled.aggregates, registry);
    let records = assemble(&rolled.aggregates, &indicators, registry);
    let fingerprint = fingerprint(&records)?;

    Ok(PipelineOutput {
        records,
        diagnostics,
        fingerprint,
    })
}

/// Writes `records.jsonl`, `fingerprint.txt`, the missing-location CSV and
/// `diagnostics.json` into the configured output directory.
///
/// # Errors
///
/// Returns [`IngestError`] if a file cannot be written.
pub async fn write_outputs(
    config: &PipelineConfig,
    output: &PipelineOutput,
) -> Result<(), IngestError> {
    let mut sink = JsonLinesSink::new(&config.output_dir);
    push(&output.records, &mut sink, config.batch_size, &NullProgress).await?;

    output::write_missing_locations(
        &config.output_dir,
        &config.missing_location_file,
        &output.diagnostics,
    )?;
    output::write_diagnostics(&config.output_dir, &output.diagnostics)?;

    log::info!(
        "Output written to {} (fingerprint {})",
        config.output_dir.display(),
        output.fingerprint
    );
    Ok(())
}

/// Runs the whole pipeline: reference data, feeds, computation, output
/// files and, when `sink` is given, a push.
///
/// Diagnostics never fail a run.
///
/// # Errors
///
/// Returns [`IngestError`] if reference data cannot be loaded, output
/// cannot be written, or the push fails.
pub async fn run_pipeline(
    config: &PipelineConfig,
    feeds: &[FeedDefinition],
    sink: Option<&mut dyn RecordSink>,
    feeds_progress: &dyn ProgressCallback,
    push_progress: &dyn ProgressCallback,
) -> Result<RunSummary, IngestError> {
    let start = Instant::now();

    let (registry, diagnostics) = load_registry(config)?;
    let (observations, feed_diagnostics) = read_feeds(feeds, config, feeds_progress).await;

    let mut all_diagnostics = diagnostics;
    all_diagnostics.extend(feed_diagnostics);

    let output = compute(&registry, &observations, all_diagnostics)?;
    write_outputs(config, &output).await?;

    let pushed = match sink {
        Some(sink) => Some(push(&output.records, sink, config.batch_size, push_progress).await?),
        None => None,
    };

    let summary = RunSummary {
        records: output.records.len(),
        fingerprint: output.fingerprint,
        missing_locations: output.diagnostics.missing_locations.len(),
        malformed: output.diagnostics.malformed.len(),
        broken_links: output.diagnostics.broken_links.len(),
        pushed,
    };

    if !output.diagnostics.is_empty() {
        log::warn!(
            "Run finished with diagnostics: {} missing locations, {} malformed rows, {} broken links",
            summary.missing_locations,
            summary.malformed,
            summary.broken_links
        );
    }
    log::info!(
        "Pipeline complete: {} records in {:.1}s",
        summary.records,
        start.elapsed().as_secs_f64()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::NaiveDate;
    use covid_stats_location_models::{LocationLevel, LocationNode};
    use covid_stats_observation_models::{MeasureType, RawCount};
    use covid_stats_report_models::{ScoreField, ScoreValue};

    use super::*;

    fn node(code: &str, parent: Option<&str>, population: u64) -> LocationNode {
        let mut node = LocationNode::new(code, code, parent, LocationLevel::Ccg);
        node.population = population;
        node
    }

    fn registry() -> LocationRegistry {
        LocationRegistry::new(
            vec![
                node("P", None, 300),
                node("A1", Some("P"), 100),
                node("A2", Some("P"), 200),
                node("E38000232", Some("P"), 500_000),
            ],
            MergeTable::embedded(),
        )
    }

    fn triage(code: &str, value: &str, line: u64) -> RawObservation {
        RawObservation {
            feed: "nhs_pathways".to_string(),
            organization_code: code.to_string(),
            organization_name: Some(format!("{code} name")),
            date: NaiveDate::from_ymd_opt(2020, 4, 10).unwrap(),
            category: Some("Female".to_string()),
            kind: RawCount::Triage,
            value: value.to_string(),
            line,
        }
    }

    fn observations() -> Vec<RawObservation> {
        vec![
            triage("A1", "5", 2),
            triage("ZZ99999", "9", 3),
            triage("A2", "7", 4),
            triage("E38000018", "3", 5),
            triage("ZZ99999", "1", 6),
            triage("E38000019", "4", 7),
            triage("A1", "lots", 8),
        ]
    }

    fn uec_record<'a>(output: &'a PipelineOutput, org: &str) -> &'a OutputRecord {
        output
            .records
            .iter()
            .find(|r| r.organization == org && r.measure == MeasureType::UrgentCareTriage)
            .unwrap()
    }

    #[test]
    fn scenario_rolls_leaves_into_parent() {
        let output = compute(&registry(), &observations(), Diagnostics::default()).unwrap();

        let a1 = uec_record(&output, "A1");
        assert_eq!(a1.score(ScoreField::Count), Some(ScoreValue::Integer(5)));
        let a2 = uec_record(&output, "A2");
        assert_eq!(a2.score(ScoreField::Count), Some(ScoreValue::Integer(7)));

        let p = uec_record(&output, "P");
        assert_eq!(p.score(ScoreField::Count), Some(ScoreValue::Integer(12 + 7)));
        let merged = uec_record(&output, "E38000232");
        assert_eq!(merged.score(ScoreField::Count), Some(ScoreValue::Integer(7)));
        assert_eq!(merged.key.value, "E38000232-20200410");
    }

    #[test]
    fn scenario_per_million_of_parent() {
        let registry = LocationRegistry::new(
            vec![node("P", None, 300), node("A1", Some("P"), 100), node("A2", Some("P"), 200)],
            MergeTable::embedded(),
        );
        let output = compute(
            &registry,
            &[triage("A1", "5", 2), triage("A2", "7", 3)],
            Diagnostics::default(),
        )
        .unwrap();

        let p = uec_record(&output, "P");
        assert_eq!(p.score(ScoreField::Count), Some(ScoreValue::Integer(12)));
        let per_million = p.score(ScoreField::PerMillion).unwrap().as_f64();
        assert!((per_million - 40_000.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_code_reported_once_and_excluded() {
        let output = compute(&registry(), &observations(), Diagnostics::default()).unwrap();

        assert_eq!(output.diagnostics.missing_locations.len(), 1);
        assert_eq!(output.diagnostics.missing_locations["ZZ99999"], "ZZ99999 name");
        assert!(output.records.iter().all(|r| r.organization != "ZZ99999"));
        assert_eq!(output.diagnostics.malformed.len(), 1);
    }

    #[test]
    fn identical_input_gives_identical_fingerprint() {
        let first = compute(&registry(), &observations(), Diagnostics::default()).unwrap();
        let second = compute(&registry(), &observations(), Diagnostics::default()).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.records, second.records);

        let mut reversed = observations();
        reversed.reverse();
        let third = compute(&registry(), &reversed, Diagnostics::default()).unwrap();
        assert_eq!(first.fingerprint, third.fingerprint);
    }

    #[test]
    fn records_are_ordered_and_keys_unique() {
        let output = compute(&registry(), &observations(), Diagnostics::default()).unwrap();
        let mut keys: Vec<String> = output.records.iter().map(|r| r.key.token()).collect();
        let len = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), len);

        let orgs: Vec<&str> = output.records.iter().map(|r| r.organization.as_str()).collect();
        let mut sorted = orgs.clone();
        sorted.sort_unstable();
        assert_eq!(orgs, sorted);
    }

    fn write_fixture(dir: &std::path::Path) -> PipelineConfig {
        std::fs::create_dir_all(dir.join("reference")).unwrap();
        std::fs::write(
            dir.join("reference/E38_CCG.csv"),
            "\
CCG20CD,CCG20NM,a,b,c,d,e,NHSER20CD,f,g,STATUS,AREAHECT
E38000232,NHS Bradford District and Craven CCG,,,,,,E40000001,,,live,1000
E38000999,Orphan CCG,,,,,,E40000099,,,live,
",
        )
        .unwrap();
        std::fs::write(
            dir.join("reference/E40_NHSER.csv"),
            "code,name\nE40000001,North East and Yorkshire\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("reference/ccg-estimates.csv"),
            "code,a,b,c,pop\nE38000018,,,,200000\nE38000019,,,,300000\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("pathways.csv"),
            "\
Call Date,Sex,CCGCode,CCGName,TriageCount
10/04/2020,Female,E38000018,NHS Airedale,3
10/04/2020,Male,E38000019,NHS Bradford,4
10/04/2020,Male,ZZ99999,Nowhere,2
",
        )
        .unwrap();

        let mut config = PipelineConfig::from_toml(
            r#"
            reference_dir = "reference"
            output_dir = "output"
            missing_location_file = "missing.csv"

            [reference]
            locations = [
                { file = "E40_NHSER.csv", level = "NHSER" },
                { file = "E38_CCG.csv", level = "CCG" },
            ]
            populations = ["ccg-estimates.csv"]

            [feeds]
            nhs_pathways = "pathways.csv"
            "#,
        )
        .unwrap();
        config.resolve_paths(dir);
        config
    }

    #[tokio::test]
    async fn run_pipeline_writes_output_files() {
        let dir = std::env::temp_dir().join("covid_stats_ingest_run");
        std::fs::remove_dir_all(&dir).ok();
        let config = write_fixture(&dir);
        let feeds: Vec<FeedDefinition> = all_feeds()
            .into_iter()
            .filter(|f| f.id == "nhs_pathways")
            .collect();

        let summary = run_pipeline(&config, &feeds, None, &NullProgress, &NullProgress)
            .await
            .unwrap();

        assert_eq!(summary.missing_locations, 1);
        assert_eq!(summary.broken_links, 1);
        assert!(summary.pushed.is_none());
        // E38000232 and its region E40000001.
        assert_eq!(summary.records, 2);

        let out: PathBuf = config.output_dir.clone();
        let records = std::fs::read_to_string(out.join("records.jsonl")).unwrap();
        assert_eq!(records.lines().count(), 2);
        assert!(records.contains("E38000232-20200410"));

        let missing = std::fs::read_to_string(out.join("missing.csv")).unwrap();
        assert_eq!(missing, "GEOGCD,GEOGNM\nZZ99999,Nowhere\n");

        let stored = std::fs::read_to_string(out.join("fingerprint.txt")).unwrap();
        assert_eq!(stored.trim(), summary.fingerprint);
        assert!(out.join("diagnostics.json").exists());

        let again = run_pipeline(&config, &feeds, None, &NullProgress, &NullProgress)
            .await
            .unwrap();
        assert_eq!(again.fingerprint, summary.fingerprint);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn unreadable_feed_is_a_diagnostic() {
        let config = PipelineConfig {
            feeds: [(
                "nhs_pathways".to_string(),
                "/nonexistent/covid_stats/pathways.csv".to_string(),
            )]
            .into_iter()
            .collect(),
            ..PipelineConfig::default()
        };
        let feeds: Vec<FeedDefinition> = all_feeds()
            .into_iter()
            .filter(|f| f.id == "nhs_pathways")
            .collect();

        let (observations, diagnostics) = read_feeds(&feeds, &config, &NullProgress).await;
        assert!(observations.is_empty());
        assert_eq!(diagnostics.malformed.len(), 1);
        assert_eq!(diagnostics.malformed[0].source, "nhs_pathways");
    }
}
