//! PostgREST-backed record store
//!
//! Writes go to `{base}/rest/v1/items` with the service key, which bypasses
//! per-user row policies.

use async_trait::async_trait;
use std::time::Duration;

use super::traits::{ItemRecord, RecordStore};
use crate::error::{HubError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PostgrestRecordStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl PostgrestRecordStore {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HubError::StorageError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn items_url(&self) -> String {
        format!("{}/rest/v1/items", self.base_url)
    }
}

#[async_trait]
impl RecordStore for PostgrestRecordStore {
    async fn insert_item(&self, item: ItemRecord) -> Result<()> {
        let response = self
            .client
            .post(self.items_url())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(&item)
            .send()
            .await
            .map_err(|e| HubError::StorageError(format!("Insert request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(HubError::StorageError(format!(
            "Record store rejected insert ({}): {}",
            status, body
        )))
    }

    fn backend_name(&self) -> &'static str {
        "postgrest"
    }
}
