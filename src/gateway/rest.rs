//! ==============================================================================
//! gateway/rest.rs - hosted sensor_data table over a PostgREST-style api
//! ==============================================================================
//!
//! endpoints used:
//!     POST {url}/rest/v1/{table}                                   insert one
//!     GET  {url}/rest/v1/{table}?select=*&order=timestamp.desc&limit=N
//!
//! auth: the anon key goes in both `apikey` and `Authorization: Bearer`.
//!
//! ==============================================================================

use super::ReadingGateway;
use crate::config::StoreConfig;
use crate::domain::StoredReading;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;

pub struct RestGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl RestGateway {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(StoreError::NotConfigured("store.url"))?;
        let key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(StoreError::NotConfigured("store.api_key"))?;

        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(key)
            .map_err(|_| StoreError::NotConfigured("store.api_key (not a valid header value)"))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| StoreError::NotConfigured("store.api_key (not a valid header value)"))?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);

        // covers connect + response; the coordinator bounds the whole call
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", url.trim_end_matches('/'), config.table),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status { code: status.as_u16(), body })
}

#[async_trait]
impl ReadingGateway for RestGateway {
    fn backend_tag(&self) -> &'static str {
        "rest"
    }

    async fn save(&self, row: &StoredReading) -> Result<(), StoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<Option<StoredReading>, StoreError> {
        Ok(self.fetch_recent(1).await?.into_iter().next())
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("select", "*"), ("order", "timestamp.desc"), ("limit", limit.as_str())])
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = ensure_success(response).await?.json().await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| StoreError::Decode(e.to_string())))
            .collect()
    }
}
