//! HTTP client for `POST /segment-stats`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use segwatch_kernel::segments::{SegmentPayload, SegmentStatsRequest};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/segment-stats";

#[derive(Clone)]
pub struct SegmentStatsClient {
    http: reqwest::Client,
    url: String,
}

impl SegmentStatsClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("segwatch-collector")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, url: url.into() })
    }

    /// Calls the API; non-2xx responses surface the server's `detail`.
    pub async fn fetch(&self, request: &SegmentStatsRequest) -> Result<SegmentPayload> {
        debug!(url = %self.url, ?request, "calling segment stats API");

        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let detail = body
                .get("detail")
                .and_then(|d| d.as_str())
                .unwrap_or("no detail");
            return Err(anyhow!("API returned {status}: {detail}"));
        }

        response
            .json::<SegmentPayload>()
            .await
            .context("Invalid segment stats payload")
    }
}
