//! Reader for CSV feeds.
//!
//! Columns are located by header name rather than position, so a feed
//! that adds or reorders columns between revisions keeps working as long
//! as one of the configured candidate names is present.

use chrono::NaiveDate;
use covid_stats_observation_models::{Diagnostics, RawCount, RawObservation};

use crate::feed::CsvFields;
use crate::{FeedRead, SourceError};

/// Resolved column positions for one file.
struct Columns {
    code: usize,
    name: Option<usize>,
    date: usize,
    category: Option<usize>,
    value: usize,
}

impl Columns {
    fn locate(feed: &str, headers: &csv::StringRecord, fields: &CsvFields) -> Result<Self, SourceError> {
        let required = |field: &str, candidates: &[String]| {
            find_column(headers, candidates).ok_or_else(|| SourceError::MissingColumn {
                feed: feed.to_owned(),
                field: field.to_owned(),
                candidates: candidates.join(", "),
            })
        };

        Ok(Self {
            code: required("organization_code", &fields.organization_code)?,
            name: find_column(headers, &fields.organization_name),
            date: required("date", &fields.date)?,
            category: find_column(headers, &fields.category),
            value: required("value", &fields.value)?,
        })
    }
}

/// Returns the index of the first candidate present in `headers`.
fn find_column(headers: &csv::StringRecord, candidates: &[String]) -> Option<usize> {
    candidates.iter().find_map(|candidate| {
        headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(candidate.trim()))
    })
}

fn optional_cell(row: &csv::StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| row.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Reads a CSV feed into raw observations.
///
/// Rows without an organization code or with an unparseable date are
/// recorded as malformed and skipped. Values are passed through unparsed.
///
/// # Errors
///
/// Returns [`SourceError`] if the input is not readable CSV or a required
/// column is missing.
pub fn read_csv(
    feed: &str,
    bytes: &[u8],
    counter: RawCount,
    date_format: &str,
    fields: &CsvFields,
) -> Result<FeedRead, SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let columns = Columns::locate(feed, reader.headers()?, fields)?;

    let mut observations = Vec::new();
    let mut diagnostics = Diagnostics::default();
    let mut row = csv::StringRecord::new();

    while reader.read_record(&mut row)? {
        let line = row.position().map_or(0, csv::Position::line);

        let code = row.get(columns.code).map(str::trim).unwrap_or_default();
        if code.is_empty() {
            diagnostics.record_malformed(feed, line, "missing organization code");
            continue;
        }

        let raw_date = row.get(columns.date).map(str::trim).unwrap_or_default();
        let Ok(date) = NaiveDate::parse_from_str(raw_date, date_format) else {
            log::warn!("[{feed}] Skipping row {line}: bad date {raw_date:?}");
            diagnostics.record_malformed(feed, line, format!("bad date {raw_date:?}"));
            continue;
        };

        observations.push(RawObservation {
            feed: feed.to_owned(),
            organization_code: code.to_owned(),
            organization_name: optional_cell(&row, columns.name),
            date,
            category: optional_cell(&row, columns.category),
            kind: counter,
            value: row.get(columns.value).unwrap_or_default().to_owned(),
            line,
        });
    }

    Ok(FeedRead {
        observations,
        diagnostics,
    })
}
