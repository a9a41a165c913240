//! File sink writing records as JSON lines.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use covid_stats_report::{OutputRecord, RECORDS_FILE, output};

use crate::{RecordSink, SyncError};

/// Collects every batch and writes `records.jsonl` on
/// [`RecordSink::finish`], replacing the previous file atomically.
pub struct JsonLinesSink {
    dir: PathBuf,
    records: Vec<OutputRecord>,
}

impl JsonLinesSink {
    /// Creates a sink writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            records: Vec::new(),
        }
    }

    /// Path of the file this sink writes.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn prepare(&mut self) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.dir)?;
        self.records.clear();
        Ok(())
    }

    async fn send_batch(&mut self, records: &[OutputRecord]) -> Result<(), SyncError> {
        self.records.extend_from_slice(records);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SyncError> {
        let digest = output::write_records(&self.dir, &self.records)?;
        log::debug!("{} sha256 {digest}", self.path().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use covid_stats_observation_models::MeasureType;
    use covid_stats_report_models::NaturalKey;

    use super::*;
    use crate::push;

    fn record(org: &str) -> OutputRecord {
        let date = NaiveDate::from_ymd_opt(2020, 4, 10).unwrap();
        OutputRecord {
            key: NaturalKey::new(MeasureType::Mortality, org, date),
            measure: MeasureType::Mortality,
            organization: org.to_string(),
            date,
            scores: Vec::new(),
        }
    }

    #[tokio::test]
    async fn writes_all_batches_and_replaces_previous_file() {
        let dir = std::env::temp_dir().join("covid_stats_sync_jsonl");
        let mut sink = JsonLinesSink::new(&dir);

        let first: Vec<OutputRecord> = (0..5).map(|i| record(&format!("E{i}"))).collect();
        push(&first, &mut sink, 2, &covid_stats_source::progress::NullProgress)
            .await
            .unwrap();
        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 5);

        push(&first[..1], &mut sink, 2, &covid_stats_source::progress::NullProgress)
            .await
            .unwrap();
        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(!dir.join(format!("{RECORDS_FILE}.tmp")).exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
