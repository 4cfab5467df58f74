// ABOUTME: HTTP client pulling integration datasets from a remote adapter service
// ABOUTME: Handles request building, status checking and response parsing

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::models::{DatasetBatch, ErrorBody};
use crate::error::SyncError;
use crate::models::Dataset;
use crate::runner::DatasetSource;

pub struct RemoteDatasetClient {
    client: Client,
    api_base_url: String,
}

impl RemoteDatasetClient {
    pub fn new(api_base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn datasets_url(&self, integration_id: &str) -> String {
        format!(
            "{}/integrations/{}/datasets",
            self.api_base_url, integration_id
        )
    }

    pub async fn fetch_batch(&self, integration_id: &str, attempt: u32) -> Result<DatasetBatch> {
        let url = self.datasets_url(integration_id);

        let response = self
            .client
            .get(&url)
            .query(&[("attempt", attempt)])
            .send()
            .await
            .with_context(|| format!("Failed to reach dataset endpoint {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.describe().map(str::to_string))
                .unwrap_or(body);
            anyhow::bail!(SyncError::Adapter(format!(
                "dataset request for '{}' failed with status {}: {}",
                integration_id, status, detail
            )));
        }

        let batch: DatasetBatch = response
            .json()
            .await
            .context("Failed to parse dataset response")?;

        if let Some(reported) = batch.integration_id.as_deref() {
            if reported != integration_id {
                tracing::warn!(
                    integration_id,
                    reported_integration_id = reported,
                    "Adapter reported a different integration id"
                );
            }
        }

        tracing::debug!(
            integration_id,
            attempt,
            datasets = batch.datasets.len(),
            fetched_at = batch.fetched_at.as_deref().unwrap_or("unknown"),
            "Fetched remote datasets"
        );
        Ok(batch)
    }
}

#[async_trait]
impl DatasetSource for RemoteDatasetClient {
    async fn fetch_datasets(&self, integration_id: &str, attempt: u32) -> Result<Vec<Dataset>> {
        Ok(self.fetch_batch(integration_id, attempt).await?.datasets)
    }
}
