//! Serialization, fingerprinting and side files.
//!
//! Every file is written to a `.tmp` sibling first and renamed into place,
//! so an interrupted run never leaves a half-written file behind.

use std::path::{Path, PathBuf};

use covid_stats_observation_models::Diagnostics;
use covid_stats_report_models::OutputRecord;
use sha2::{Digest, Sha256};

use crate::ReportError;

/// Output records, one JSON object per line.
pub const RECORDS_FILE: &str = "records.jsonl";
/// Default name of the unresolvable-codes file.
pub const MISSING_LOCATIONS_FILE: &str = "MissingLocation.csv";
/// Full diagnostics.
pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";
/// SHA-256 of the records file.
pub const FINGERPRINT_FILE: &str = "fingerprint.txt";

/// Splits `records` into transport batches of `size` (at least 1).
pub fn batches(records: &[OutputRecord], size: usize) -> impl Iterator<Item = &[OutputRecord]> {
    records.chunks(size.max(1))
}

/// Serializes records as JSON lines, each terminated by `\n`.
///
/// # Errors
///
/// Returns [`ReportError::Json`] if a record cannot be serialized.
pub fn to_json_lines(records: &[OutputRecord]) -> Result<String, ReportError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Lowercase hex SHA-256 of the JSON-lines serialization.
///
/// # Errors
///
/// Returns [`ReportError::Json`] if a record cannot be serialized.
pub fn fingerprint(records: &[OutputRecord]) -> Result<String, ReportError> {
    Ok(fingerprint_bytes(to_json_lines(records)?.as_bytes()))
}

fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Writes `contents` to `dir/name` via a temporary file.
///
/// # Errors
///
/// Returns [`ReportError::Io`] if the file cannot be written.
pub fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf, ReportError> {
    let path = dir.join(name);
    let tmp_path = dir.join(format!("{name}.tmp"));
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(path)
}

/// Writes `records.jsonl` and `fingerprint.txt`. Returns the fingerprint.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or writing fails.
pub fn write_records(dir: &Path, records: &[OutputRecord]) -> Result<String, ReportError> {
    let lines = to_json_lines(records)?;
    let digest = fingerprint_bytes(lines.as_bytes());
    let path = write_atomic(dir, RECORDS_FILE, lines.as_bytes())?;
    write_atomic(dir, FINGERPRINT_FILE, format!("{digest}\n").as_bytes())?;
    log::info!(
        "Wrote {} records to {} (sha256 {digest})",
        records.len(),
        path.display()
    );
    Ok(digest)
}

/// Writes the `GEOGCD,GEOGNM` missing-location CSV as `dir/name`, one row
/// per code. The file is written even when there are no missing codes so a
/// stale list from an earlier run never survives.
///
/// # Errors
///
/// Returns [`ReportError`] if the CSV cannot be written.
pub fn write_missing_locations(
    dir: &Path,
    name: &str,
    diagnostics: &Diagnostics,
) -> Result<PathBuf, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["GEOGCD", "GEOGNM"])?;
    for (code, label) in &diagnostics.missing_locations {
        writer.write_record([code, label])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Io(e.into_error()))?;

    let path = write_atomic(dir, name, &bytes)?;
    if !diagnostics.missing_locations.is_empty() {
        log::warn!(
            "{} unknown locations written to {}",
            diagnostics.missing_locations.len(),
            path.display()
        );
    }
    Ok(path)
}

/// Writes `diagnostics.json`.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or writing fails.
pub fn write_diagnostics(dir: &Path, diagnostics: &Diagnostics) -> Result<PathBuf, ReportError> {
    let contents = serde_json::to_string_pretty(diagnostics)?;
    write_atomic(dir, DIAGNOSTICS_FILE, contents.as_bytes())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use covid_stats_observation_models::MeasureType;
    use covid_stats_report_models::{NaturalKey, Score, ScoreField, ScoreValue};

    use super::*;

    fn record(org: &str) -> OutputRecord {
        let date = NaiveDate::from_ymd_opt(2020, 4, 10).unwrap();
        OutputRecord {
            key: NaturalKey::new(MeasureType::CaseSurveillance, org, date),
            measure: MeasureType::CaseSurveillance,
            organization: org.to_string(),
            date,
            scores: vec![Score {
                field: ScoreField::Count,
                value: ScoreValue::Integer(4),
                population: Some(100),
            }],
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn batches_respect_size() {
        let records: Vec<OutputRecord> = (0..23).map(|i| record(&format!("E{i}"))).collect();
        let sizes: Vec<usize> = batches(&records, 10).map(<[OutputRecord]>::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert_eq!(batches(&records, 0).count(), 23);
    }

    #[test]
    fn json_lines_have_one_record_per_line() {
        let lines = to_json_lines(&[record("A"), record("B")]).unwrap();
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.starts_with("{\"key\":{\"system\":"));
        assert!(lines.contains("\"measure\":\"PHE_COVID\""));
        assert!(lines.contains("\"date\":\"2020-04-10\""));
    }

    #[test]
    fn fingerprint_is_stable_and_order_sensitive() {
        let a = fingerprint(&[record("A"), record("B")]).unwrap();
        let b = fingerprint(&[record("A"), record("B")]).unwrap();
        let c = fingerprint(&[record("B"), record("A")]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn writes_missing_locations_csv() {
        let dir = temp_dir("covid_stats_report_missing");
        let mut diagnostics = Diagnostics::default();
        diagnostics.record_missing("ZZ99999", "Nowhere, Else");

        let path = write_missing_locations(&dir, MISSING_LOCATIONS_FILE, &diagnostics).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, "GEOGCD,GEOGNM\nZZ99999,\"Nowhere, Else\"\n");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn write_records_writes_fingerprint() {
        let dir = temp_dir("covid_stats_report_records");
        let records = vec![record("A")];

        let digest = write_records(&dir, &records).unwrap();
        assert_eq!(digest, fingerprint(&records).unwrap());
        let stored = std::fs::read_to_string(dir.join(FINGERPRINT_FILE)).unwrap();
        assert_eq!(stored.trim(), digest);
        assert!(!dir.join(format!("{RECORDS_FILE}.tmp")).exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
