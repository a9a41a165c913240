//! Fetches feed bytes from a URL or the local filesystem.

use std::path::Path;
use std::time::Duration;

use crate::{SourceError, retry};

/// Per-request timeout for feed downloads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Returns `true` if `location` should be downloaded rather than read from
/// disk.
#[must_use]
pub fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Reads all bytes at `location`: an `http(s)` URL (with retry) or a local
/// path.
///
/// # Errors
///
/// Returns [`SourceError::Http`]/[`SourceError::Fetch`] if the download
/// fails, or [`SourceError::File`] if the local file cannot be read.
pub async fn fetch_bytes(location: &str) -> Result<Vec<u8>, SourceError> {
    if is_remote(location) {
        let client = reqwest::Client::builder()
            .user_agent("covid-stats/1.0")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        log::info!("Downloading {location}");
        let bytes = retry::send_bytes(|| client.get(location)).await?;
        log::debug!("Downloaded {} bytes from {location}", bytes.len());
        Ok(bytes)
    } else {
        read_local(Path::new(location)).await
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, SourceError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| SourceError::File {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_remote_locations() {
        assert!(is_remote("https://files.digital.nhs.uk/a.csv"));
        assert!(is_remote("HTTP://example.org"));
        assert!(!is_remote("data/feeds/a.csv"));
        assert!(!is_remote("/tmp/https.csv"));
    }

    #[tokio::test]
    async fn reads_local_file() {
        let path = std::env::temp_dir().join("covid_stats_fetch_local.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let bytes = fetch_bytes(path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn missing_local_file_names_the_path() {
        let err = fetch_bytes("/nonexistent/covid_stats/feed.csv").await.unwrap_err();
        assert!(matches!(err, SourceError::File { .. }));
        assert!(err.to_string().contains("/nonexistent/covid_stats/feed.csv"));
    }
}
