#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the covid-stats pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use covid_stats_cli_utils::IndicatifProgress;
use covid_stats_ingest::{PipelineConfig, all_feeds, enabled_feeds, load_registry, run_pipeline};
use covid_stats_location::MergeTable;
use covid_stats_sync::{HttpBundleSink, RecordSink};

#[derive(Parser)]
#[command(name = "covid_stats_ingest", about = "COVID-19 statistics aggregation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load reference data, read feeds, aggregate and write output
    Run {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Comma-separated list of feed IDs to read (overrides `COVID_STATS_FEEDS` env var)
        #[arg(long)]
        feeds: Option<String>,
        /// Also send the records to the configured sync endpoint
        #[arg(long)]
        push: bool,
        /// Write output here instead of the configured directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// List all configured feeds
    Feeds,
    /// List the legacy-to-canonical organization code merges
    Merges,
    /// Load reference data only and report hierarchy problems
    Validate {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = covid_stats_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            feeds,
            push,
            output_dir,
        } => {
            let mut config = PipelineConfig::load(&config)?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }

            let feeds = enabled_feeds(feeds.as_deref());
            log::info!(
                "Reading {} feed(s): {}",
                feeds.len(),
                feeds
                    .iter()
                    .map(|f| f.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let mut sink = if push {
                let url = config.sync.url.as_deref().ok_or(
                    "--push needs a sync URL (config [sync].url or COVID_STATS_SYNC_URL)",
                )?;
                Some(HttpBundleSink::new(url, config.sync.token.clone())?)
            } else {
                None
            };

            let feeds_bar = IndicatifProgress::steps_bar(&multi, "Feeds", feeds.len() as u64);
            let push_bar = IndicatifProgress::records_bar(&multi, "Sending records");

            let summary = run_pipeline(
                &config,
                &feeds,
                sink.as_mut().map(|s| s as &mut dyn RecordSink),
                feeds_bar.as_ref(),
                push_bar.as_ref(),
            )
            .await?;

            if summary.pushed.is_none() {
                push_bar.finish_and_clear();
            }

            log::info!(
                "{} records, fingerprint {}",
                summary.records,
                summary.fingerprint
            );
        }
        Commands::Feeds => {
            let feeds = all_feeds();
            println!("{:<16} {:<10} NAME", "ID", "FORMAT");
            println!("{}", "-".repeat(60));
            for feed in &feeds {
                println!("{:<16} {:<10} {}", feed.id, feed.format(), feed.name);
                println!("{:<27} {}", "", feed.url);
            }
        }
        Commands::Merges => {
            let merges = MergeTable::embedded();
            println!("{:<12} CANONICAL", "LEGACY");
            println!("{}", "-".repeat(24));
            for (legacy, canonical) in merges.iter() {
                println!("{legacy:<12} {canonical}");
            }
            println!("\n{} legacy code(s)", merges.len());
        }
        Commands::Validate { config } => {
            let config = PipelineConfig::load(&config)?;
            let (registry, diagnostics) = load_registry(&config)?;

            println!("{} locations", registry.len());
            println!("{} rejected reference rows", diagnostics.malformed.len());
            println!("{} broken hierarchy links", diagnostics.broken_links.len());
            for link in &diagnostics.broken_links {
                println!(
                    "  {:<12} -> {:<12} {}",
                    link.code, link.parent, link.kind
                );
            }
        }
    }

    Ok(())
}
