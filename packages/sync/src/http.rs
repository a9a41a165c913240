//! HTTP sink posting transaction bundles to a remote store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use covid_stats_observation_models::{MEASURE_IDENTIFIER_SYSTEM, MeasureType};
use covid_stats_report::OutputRecord;
use covid_stats_source::retry;

use crate::bundle::{self, failed_entries, transaction_bundle};
use crate::{RecordSink, SyncError};

const CONTENT_TYPE: &str = "application/fhir+json";

/// Sends each batch as one transaction bundle.
pub struct HttpBundleSink {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    measure_refs: BTreeMap<MeasureType, String>,
}

impl HttpBundleSink {
    /// Creates a sink for the store at `base_url`, authenticating with
    /// `token` as a bearer token when given.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `base_url` is blank, or
    /// [`SyncError::Http`] if the client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, SyncError> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(SyncError::Config {
                message: "sync endpoint URL is empty".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .user_agent("covid-stats/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
            measure_refs: BTreeMap::new(),
        })
    }

    /// Endpoint the bundles are posted to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn register_measure(&self, measure: MeasureType) -> Result<String, SyncError> {
        let url = format!("{}/Measure", self.base_url);
        let identifier = format!("{MEASURE_IDENTIFIER_SYSTEM}|{}", measure.code());
        let body = bundle::measure_resource(measure);

        let response = retry::send(|| {
            self.request(reqwest::Method::PUT, &url)
                .query(&[("identifier", identifier.as_str())])
                .json(&body)
        })
        .await?;

        let created: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(created
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| bundle::measure_reference(measure), |id| format!("Measure/{id}")))
    }
}

#[async_trait]
impl RecordSink for HttpBundleSink {
    async fn prepare(&mut self) -> Result<(), SyncError> {
        for &measure in MeasureType::all() {
            let reference = self.register_measure(measure).await?;
            log::debug!("Measure {} registered as {reference}", measure.code());
            self.measure_refs.insert(measure, reference);
        }
        log::info!("Registered {} measures at {}", self.measure_refs.len(), self.base_url);
        Ok(())
    }

    async fn send_batch(&mut self, records: &[OutputRecord]) -> Result<(), SyncError> {
        let body = transaction_bundle(records, &self.measure_refs);

        let response = retry::send(|| self.request(reqwest::Method::POST, &self.base_url).json(&body))
            .await?;
        let reply: serde_json::Value = response.json().await?;
        log::trace!("Transaction response: {reply}");

        let failed = failed_entries(&reply);
        if !failed.is_empty() {
            return Err(SyncError::Rejected {
                message: format!(
                    "{} of {} entries failed: {}",
                    failed.len(),
                    records.len(),
                    failed.join(", ")
                ),
            });
        }
        Ok(())
    }
}
