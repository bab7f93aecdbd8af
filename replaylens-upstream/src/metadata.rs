//! Match metadata provider client (deadlock-api).

use std::time::Duration;

use ::async_trait::async_trait;
use replaylens_core::{ConfigError, MatchId, MetadataError};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

use crate::parser::{
    build_http_client, truncate_body, DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS,
    DEFAULT_UPSTREAM_TIMEOUT_SECS,
};

pub const DEFAULT_METADATA_BASE_URL: &str = "https://api.deadlock-api.com";

/// Source of match metadata and replay download URLs.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Signed download URL of the replay, `None` when the provider has none.
    async fn demo_url(&self, match_id: MatchId) -> Result<Option<String>, MetadataError>;

    /// Match metadata document, passed through as JSON.
    async fn match_metadata(&self, match_id: MatchId) -> Result<serde_json::Value, MetadataError>;
}

/// Connection settings for the metadata provider.
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for MetadataConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_METADATA_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl MetadataConfig {
    /// Create MetadataConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REPLAYLENS_METADATA_BASE_URL` (default: `https://api.deadlock-api.com`)
    /// - `REPLAYLENS_METADATA_API_KEY` (optional, sent as `X-API-Key`)
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("REPLAYLENS_METADATA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_METADATA_BASE_URL.to_string()),
            api_key: std::env::var("REPLAYLENS_METADATA_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaltsResponse {
    #[serde(default)]
    demo_url: Option<String>,
}

/// HTTP client for the deadlock-api match endpoints.
pub struct DeadlockApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DeadlockApiClient {
    pub fn new(config: MetadataConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_http_client(config.timeout, config.connect_timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    async fn get(&self, match_id: MatchId, path: &str) -> Result<reqwest::Response, MetadataError> {
        let url = format!("{}/v1/matches/{}/{}", self.base_url, match_id, path);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|e| MetadataError::Request {
            match_id,
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound { match_id });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                %match_id,
                path,
                status = status.as_u16(),
                body = %truncate_body(&body),
                "Metadata provider request failed"
            );
            return Err(MetadataError::Status {
                match_id,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MetadataProvider for DeadlockApiClient {
    async fn demo_url(&self, match_id: MatchId) -> Result<Option<String>, MetadataError> {
        let response = match self.get(match_id, "salts").await {
            Ok(response) => response,
            Err(MetadataError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let salts: SaltsResponse =
            response
                .json()
                .await
                .map_err(|e| MetadataError::InvalidResponse {
                    match_id,
                    reason: e.to_string(),
                })?;
        debug!(%match_id, found = salts.demo_url.is_some(), "Resolved replay URL");
        Ok(salts.demo_url.filter(|url| !url.is_empty()))
    }

    async fn match_metadata(&self, match_id: MatchId) -> Result<serde_json::Value, MetadataError> {
        self.get(match_id, "metadata")
            .await?
            .json()
            .await
            .map_err(|e| MetadataError::InvalidResponse {
                match_id,
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for DeadlockApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlockApiClient")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}
