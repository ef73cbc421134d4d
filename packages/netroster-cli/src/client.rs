//! HTTP client for a running `netroster serve` instance.

use anyhow::{bail, Context, Result};
use netroster_core::{AnnotationPayload, AnnotationRecord, DeviceView};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RosterClient {
    http: reqwest::Client,
    base_url: String,
}

impl RosterClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn devices(&self) -> Result<Vec<DeviceView>> {
        let url = format!("{}/api/devices", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            bail!("{} returned {}", url, response.status());
        }
        response.json().await.context("Invalid device listing")
    }

    pub async fn annotation(&self, address: &str) -> Result<AnnotationRecord> {
        let url = format!("{}/api/device/{}", self.base_url, address);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            bail!("{} returned {}", url, response.status());
        }
        response.json().await.context("Invalid annotation")
    }

    pub async fn annotate(&self, address: &str, payload: &AnnotationPayload) -> Result<()> {
        let url = format!("{}/api/device/{}", self.base_url, address);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let reason = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("no details");
        bail!("Server rejected annotation ({}): {}", status, reason)
    }
}
