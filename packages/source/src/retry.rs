//! HTTP retry helpers for transient errors.
//!
//! Every outbound request goes through [`send`] (or [`send_bytes`] when the
//! whole body is wanted) so that timeouts, connection resets, server errors
//! and rate limiting are retried with exponential backoff.
//!
//! ```ignore
//! let bytes = retry::send_bytes(|| client.get(&url)).await?;
//! let response = retry::send(|| client.put(&url).json(&bundle)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (2s, 4s, 8s, 16s, 32s) the total wait before
/// giving up is 62 seconds.
pub const MAX_RETRIES: u32 = 5;

/// Maximum number of full re-fetch attempts when the body cannot be read.
const MAX_BODY_RETRIES: u32 = 3;

/// Sends the request and returns the full response body.
///
/// Connection-level failures are retried by [`send`]. If the response
/// arrives but reading the body fails (truncated transfer), the whole
/// request is repeated up to [`MAX_BODY_RETRIES`] times.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_bytes<F>(build_request: F) -> Result<Vec<u8>, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;
    loop {
        let response = send_with(&build_request, MAX_RETRIES).await?;
        let url = response.url().to_string();
        let status = response.status();

        match response.bytes().await {
            Ok(bytes) => return Ok(bytes.to_vec()),
            Err(e) if body_attempt < MAX_BODY_RETRIES => {
                body_attempt += 1;
                let delay = Duration::from_secs(1u64 << body_attempt);
                log::warn!(
                    "Body read failed (body retry {body_attempt}/{MAX_BODY_RETRIES}), \
                     re-fetching in {delay:?}...\n  \
                     url: {url}\n  \
                     status: {status}\n  \
                     error: {e}",
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!(
                    "Body read failed after {MAX_BODY_RETRIES} retries, giving up.\n  \
                     url: {url}\n  \
                     error: {e}",
                );
                return Err(SourceError::Http(e));
            }
        }
    }
}

/// Sends the request with the default retry budget and returns the
/// successful response (status 2xx or 3xx).
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries or the
/// server returns a non-retryable status code.
#[allow(clippy::future_not_send)]
pub async fn send<F>(build_request: F) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send_with(&build_request, MAX_RETRIES).await
}

/// Core retry loop.
///
/// The `build_request` closure is called on each attempt since builders
/// are consumed by `.send()`. HTTP 429 and 5xx are retried; any other 4xx
/// is permanent.
#[allow(clippy::future_not_send)]
async fn send_with<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<SourceError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status} from {}", response.url());
                        last_error = Some(SourceError::Fetch {
                            message: format!("HTTP {status}"),
                        });
                        continue;
                    }
                    return Err(SourceError::Fetch {
                        message: format!("HTTP {status} after {max_retries} retries"),
                    });
                }

                if status.is_client_error() {
                    return Err(SourceError::Fetch {
                        message: format!("HTTP {status} from {}", response.url()),
                    });
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Fetch {
        message: "request failed after all retries".to_string(),
    }))
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
