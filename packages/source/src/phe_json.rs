//! Reader for the PHE dashboard JSON extract.
//!
//! The extract is an object of sections (`overview`, `countries`, `utlas`,
//! `regions`, ...). Each section maps an area code to an object holding
//! one or more daily series of `{ "date": "YYYY-MM-DD", "value": n }`.

use chrono::NaiveDate;
use covid_stats_observation_models::{Diagnostics, RawObservation};

use crate::feed::PheSection;
use crate::{FeedRead, SourceError};

/// Reads the configured sections of a PHE extract.
///
/// A missing section or series and malformed entries are recorded as
/// malformed and skipped. Entries are numbered from 1 across the whole
/// extract.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if the bytes are not JSON.
pub fn read_phe_json(
    feed: &str,
    bytes: &[u8],
    sections: &[PheSection],
) -> Result<FeedRead, SourceError> {
    let json: serde_json::Value = serde_json::from_slice(bytes)?;

    let mut observations = Vec::new();
    let mut diagnostics = Diagnostics::default();
    let mut entry_no = 0_u64;

    for section in sections {
        let Some(areas) = json.get(&section.key).and_then(serde_json::Value::as_object) else {
            log::warn!("[{feed}] Section {:?} not present", section.key);
            diagnostics.record_malformed(feed, 0, format!("missing section {:?}", section.key));
            continue;
        };

        log::debug!("[{feed}] Reading {} areas from {:?}", areas.len(), section.key);

        for (code, area) in areas {
            let name = area
                .get("name")
                .and_then(|n| n.get("value").or(Some(n)))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned);

            let Some(series) = area.get(&section.series).and_then(serde_json::Value::as_array)
            else {
                diagnostics.record_malformed(
                    feed,
                    0,
                    format!("{}/{code} has no {:?} series", section.key, section.series),
                );
                continue;
            };

            for entry in series {
                entry_no += 1;

                let date = entry
                    .get("date")
                    .and_then(serde_json::Value::as_str)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
                let Some(date) = date else {
                    diagnostics.record_malformed(
                        feed,
                        entry_no,
                        format!("{}/{code}: bad date in {entry}", section.key),
                    );
                    continue;
                };

                let value = match entry.get("value") {
                    Some(serde_json::Value::Number(n)) => n.to_string(),
                    Some(serde_json::Value::String(s)) => s.clone(),
                    _ => String::new(),
                };

                observations.push(RawObservation {
                    feed: feed.to_owned(),
                    organization_code: section
                        .code_override
                        .clone()
                        .unwrap_or_else(|| code.clone()),
                    organization_name: name.clone(),
                    date,
                    category: None,
                    kind: section.counter,
                    value,
                    line: entry_no,
                });
            }
        }
    }

    Ok(FeedRead {
        observations,
        diagnostics,
    })
}
