//! Record collector interface and HTTP implementation
//!
//! A collector turns one input identifier into collected structured data or
//! a failure. Every outcome is terminal per call: the pipeline never retries
//! internally, so a collector that wants retries must do them itself.

use async_trait::async_trait;
use harvest_common::{
    error::HarvestError,
    types::{CollectionResult, InputRecord},
    Result,
};
use std::time::Duration;
use tracing::debug;

/// External collaborator that fetches and parses one record.
#[async_trait]
pub trait RecordCollector: Send + Sync {
    /// Collect one record. Failures are returned as
    /// [`CollectionResult::Failure`], never as a Rust error, so that a bad
    /// record cannot abort the batch it belongs to.
    async fn collect(&self, record: &InputRecord) -> CollectionResult;
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("harvest/", env!("CARGO_PKG_VERSION"));

/// Collector that fetches record payloads over HTTP.
///
/// With an endpoint configured, requests go to
/// `{endpoint}?url={identifier}` (the shape of a hosted extraction API);
/// without one, the identifier itself is fetched. Either way the response
/// body must be JSON.
pub struct HttpCollector {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpCollector {
    pub fn new(endpoint: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| HarvestError::Network(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    async fn fetch(&self, identifier: &str) -> std::result::Result<serde_json::Value, String> {
        let request = match &self.endpoint {
            Some(endpoint) => self.client.get(endpoint).query(&[("url", identifier)]),
            None => self.client.get(identifier),
        };

        let response = request.send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("unexpected status {}", status));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| format!("invalid JSON body: {}", e))
    }
}

#[async_trait]
impl RecordCollector for HttpCollector {
    async fn collect(&self, record: &InputRecord) -> CollectionResult {
        debug!(identifier = %record.identifier, "Collecting record");

        match self.fetch(&record.identifier).await {
            Ok(payload) => CollectionResult::success(payload),
            Err(reason) => CollectionResult::failure(&record.identifier, reason),
        }
    }
}
