//! REST backend for PostgREST-compatible endpoints (Supabase and friends)
//!
//! - insert: `POST {base}/rest/v1/{table}`
//! - update: `PATCH {base}/rest/v1/{table}?id=eq.{id}`
//! - delete: `DELETE {base}/rest/v1/{table}?id=eq.{id}`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

use crate::remote::RemoteBackend;
use crate::shared::config::{ConfigError, SyncConfig};
use crate::shared::error::RemoteError;

/// reqwest-backed [`RemoteBackend`]
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestBackend {
    /// Create a backend for `base_url` without credentials or timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Create a backend from the remote section of the configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.remote.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::InvalidValue("remote", e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.remote_url()?.trim_end_matches('/').to_string(),
            api_key: config.remote.api_key.clone(),
        })
    }

    /// Send `apikey` and bearer headers on every request
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<(), RemoteError> {
        let response = self
            .authorize(request)
            .header("Prefer", "return=minimal")
            .send()
            .await?;

        check_status(response, what).await
    }
}

async fn check_status(response: Response, what: &str) -> Result<(), RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
    tracing::debug!("[REMOTE] {} failed: {} - {}", what, status, body);
    Err(RemoteError::backend(status.as_u16(), body))
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn insert(&self, table: &str, payload: &Value) -> Result<(), RemoteError> {
        let request = self.client.post(self.table_url(table)).json(payload);
        self.send(request, &format!("insert into {}", table)).await
    }

    async fn update(&self, table: &str, id: &str, payload: &Value) -> Result<(), RemoteError> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))])
            .json(payload);
        self.send(request, &format!("update {}/{}", table, id)).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))]);
        self.send(request, &format!("delete {}/{}", table, id)).await
    }
}
