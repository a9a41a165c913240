//! Feed registry: loads all feed definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/feeds/` is baked into the binary at
//! compile time via [`include_str!`].

use crate::feed::{FeedDefinition, parse_feed_toml};

/// Environment variable restricting which feeds run (comma-separated ids).
pub const FEEDS_ENV: &str = "COVID_STATS_FEEDS";

/// TOML configs embedded at compile time.
const FEED_TOMLS: &[(&str, &str)] = &[
    ("nhs_pathways", include_str!("../feeds/nhs_pathways.toml")),
    ("nhs_111_online", include_str!("../feeds/nhs_111_online.toml")),
    ("phe_dashboard", include_str!("../feeds/phe_dashboard.toml")),
];

#[cfg(test)]
const EXPECTED_FEED_COUNT: usize = 3;

/// Returns all configured feed definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (the configs are embedded, so
/// this is caught by the registry tests).
#[must_use]
pub fn all_feeds() -> Vec<FeedDefinition> {
    FEED_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_feed_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Returns the feeds selected by `cli_filter`, falling back to the
/// `COVID_STATS_FEEDS` environment variable, and all feeds when neither is
/// set.
#[must_use]
pub fn enabled_feeds(cli_filter: &[String]) -> Vec<FeedDefinition> {
    let env_filter: Vec<String> = std::env::var(FEEDS_ENV)
        .ok()
        .map(|v| split_filter(&v))
        .unwrap_or_default();

    let filter = if cli_filter.is_empty() {
        env_filter
    } else {
        cli_filter.to_vec()
    };

    select(all_feeds(), &filter)
}

/// Splits a comma-separated list of ids, dropping blanks.
#[must_use]
pub fn split_filter(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn select(feeds: Vec<FeedDefinition>, filter: &[String]) -> Vec<FeedDefinition> {
    if filter.is_empty() {
        return feeds;
    }

    for id in filter {
        if !feeds.iter().any(|f| &f.id == id) {
            log::warn!("Unknown feed id {id:?} in filter");
        }
    }

    let selected: Vec<FeedDefinition> = feeds
        .into_iter()
        .filter(|f| filter.contains(&f.id))
        .collect();

    if selected.is_empty() {
        log::warn!("Feed filter {filter:?} matched no feeds");
    }

    selected
}
