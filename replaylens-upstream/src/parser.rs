//! Replay parser service client.
//!
//! The parser exposes two endpoints:
//! - `GET /check-demo/{match_id}` -> `{"available": bool, "filename": string?}`
//! - `POST /parse {"demo_url": <url-safe base64>}` -> raw match payload
//!
//! Each operation runs behind its own [`CircuitBreaker`].

use std::sync::Arc;
use std::time::Duration;

use ::async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use replaylens_core::{CircuitState, ConfigError, MatchId, ParserError, RawMatchPayload};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

pub const DEFAULT_PARSER_BASE_URL: &str = "http://localhost:9000";
pub const DEFAULT_LOCAL_REPLAY_DIR: &str = "/parser/src/replays";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 30;

pub const CHECK_DEMO_OPERATION: &str = "check_demo";
pub const PARSE_OPERATION: &str = "parse";

const ERROR_BODY_LIMIT: usize = 200;

// ============================================================================
// SOURCE REFERENCE
// ============================================================================

/// Opaque reference to a replay, as accepted by `POST /parse`.
///
/// URL-safe base64 (padded) of either a path on the parser's filesystem or a
/// remote download URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceReference(String);

impl SourceReference {
    /// Reference a demo already staged on the parser host.
    pub fn local(replay_dir: &str, filename: &str) -> Self {
        let path = format!("{}/{}", replay_dir.trim_end_matches('/'), filename);
        Self(URL_SAFE.encode(path))
    }

    /// Reference a remote (signed) download URL.
    pub fn remote(url: &str) -> Self {
        Self(URL_SAFE.encode(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The plain path or URL behind this reference.
    pub fn decode(&self) -> Option<String> {
        URL_SAFE
            .decode(&self.0)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }
}

impl std::fmt::Display for SourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TRAIT
// ============================================================================

/// Result of a local demo lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDemo {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub filename: Option<String>,
}

impl LocalDemo {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn found(filename: impl Into<String>) -> Self {
        Self {
            available: true,
            filename: Some(filename.into()),
        }
    }

    /// The staged filename, if the demo is usable.
    pub fn handle(&self) -> Option<&str> {
        match (&self.available, &self.filename) {
            (true, Some(name)) if !name.is_empty() => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Gateway to the replay parser.
#[async_trait]
pub trait ReplayParser: Send + Sync {
    /// Ask whether the parser already holds the replay for `match_id`.
    async fn check_local_demo(&self, match_id: MatchId) -> Result<LocalDemo, ParserError>;

    /// Parse the replay behind `source`.
    async fn parse(&self, source: &SourceReference) -> Result<RawMatchPayload, ParserError>;

    /// Path prefix the parser uses for staged demos.
    fn local_replay_dir(&self) -> &str {
        DEFAULT_LOCAL_REPLAY_DIR
    }

    /// Breaker state per operation, for health reporting.
    fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        Vec::new()
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Connection settings for the parser service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub base_url: String,
    pub local_replay_dir: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PARSER_BASE_URL.to_string(),
            local_replay_dir: DEFAULT_LOCAL_REPLAY_DIR.to_string(),
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ParserConfig {
    /// Create ParserConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REPLAYLENS_PARSER_BASE_URL` (default: `http://localhost:9000`)
    /// - `REPLAYLENS_LOCAL_REPLAY_DIR` (default: `/parser/src/replays`)
    /// - `REPLAYLENS_PARSER_TIMEOUT_SECS` (default: 300)
    /// - `REPLAYLENS_PARSER_CONNECT_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            Duration::from_secs(
                std::env::var(name)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };

        Self {
            base_url: std::env::var("REPLAYLENS_PARSER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PARSER_BASE_URL.to_string()),
            local_replay_dir: std::env::var("REPLAYLENS_LOCAL_REPLAY_DIR")
                .unwrap_or_else(|_| DEFAULT_LOCAL_REPLAY_DIR.to_string()),
            timeout: secs("REPLAYLENS_PARSER_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS),
            connect_timeout: secs(
                "REPLAYLENS_PARSER_CONNECT_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS,
            ),
        }
    }
}

/// Build the shared HTTP client for an upstream.
pub(crate) fn build_http_client(
    timeout: Duration,
    connect_timeout: Duration,
) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| ConfigError::InvalidValue {
            field: "http_client".to_string(),
            value: format!("timeout={:?}", timeout),
            reason: e.to_string(),
        })
}

pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// HTTP client for the replay parser.
pub struct ParserClient {
    client: Client,
    base_url: String,
    local_replay_dir: String,
    check_breaker: Arc<CircuitBreaker>,
    parse_breaker: Arc<CircuitBreaker>,
}

impl ParserClient {
    /// Create a client with a fresh breaker per operation.
    pub fn new(config: ParserConfig, breaker: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Self::with_breakers(
            config,
            Arc::new(CircuitBreaker::new(CHECK_DEMO_OPERATION, breaker.clone())),
            Arc::new(CircuitBreaker::new(PARSE_OPERATION, breaker)),
        )
    }

    /// Create a client around existing breakers.
    pub fn with_breakers(
        config: ParserConfig,
        check_breaker: Arc<CircuitBreaker>,
        parse_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_http_client(config.timeout, config.connect_timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            local_replay_dir: config.local_replay_dir,
            check_breaker,
            parse_breaker,
        })
    }

    pub fn check_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.check_breaker
    }

    pub fn parse_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.parse_breaker
    }

    async fn fetch_check_demo(&self, match_id: MatchId) -> Result<LocalDemo, ParserError> {
        let url = format!("{}/check-demo/{}", self.base_url, match_id);
        debug!(%match_id, "Checking parser for local demo");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(CHECK_DEMO_OPERATION, e))?;
        let response = ensure_success(CHECK_DEMO_OPERATION, response).await?;

        let demo: LocalDemo = response.json().await.map_err(|e| ParserError::InvalidResponse {
            operation: CHECK_DEMO_OPERATION.to_string(),
            reason: e.to_string(),
        })?;

        match demo.handle() {
            Some(filename) => info!(%match_id, filename, "Parser has local demo"),
            None => info!(%match_id, "Parser has no local demo"),
        }
        Ok(demo)
    }

    async fn fetch_parse(&self, source: &SourceReference) -> Result<RawMatchPayload, ParserError> {
        let url = format!("{}/parse", self.base_url);
        info!("Calling parser service");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "demo_url": source.as_str() }))
            .send()
            .await
            .map_err(|e| transport_error(PARSE_OPERATION, e))?;
        let response = ensure_success(PARSE_OPERATION, response).await?;

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(PARSE_OPERATION, e)
            } else {
                ParserError::InvalidResponse {
                    operation: PARSE_OPERATION.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

fn transport_error(operation: &str, e: reqwest::Error) -> ParserError {
    if e.is_timeout() {
        ParserError::Timeout {
            operation: operation.to_string(),
            reason: e.to_string(),
        }
    } else {
        ParserError::Connect {
            operation: operation.to_string(),
            reason: e.to_string(),
        }
    }
}

async fn ensure_success(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ParserError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ParserError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        body: truncate_body(&body),
    })
}

#[async_trait]
impl ReplayParser for ParserClient {
    async fn check_local_demo(&self, match_id: MatchId) -> Result<LocalDemo, ParserError> {
        self.check_breaker
            .call(|| self.fetch_check_demo(match_id))
            .await
    }

    async fn parse(&self, source: &SourceReference) -> Result<RawMatchPayload, ParserError> {
        if source.as_str().is_empty() {
            return Err(ParserError::InvalidRequest {
                operation: PARSE_OPERATION.to_string(),
                reason: "empty source reference".to_string(),
            });
        }
        self.parse_breaker.call(|| self.fetch_parse(source)).await
    }

    fn local_replay_dir(&self) -> &str {
        &self.local_replay_dir
    }

    fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        vec![
            (self.check_breaker.name().to_string(), self.check_breaker.state()),
            (self.parse_breaker.name().to_string(), self.parse_breaker.state()),
        ]
    }
}

impl std::fmt::Debug for ParserClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserClient")
            .field("base_url", &self.base_url)
            .field("local_replay_dir", &self.local_replay_dir)
            .field("check_breaker", &self.check_breaker)
            .field("parse_breaker", &self.parse_breaker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String, threshold: u32) -> ParserClient {
        ParserClient::new(
            ParserConfig {
                base_url,
                timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(1),
                ..ParserConfig::default()
            },
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(60),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_source_reference_encoding() {
        let local = SourceReference::local("/parser/src/replays/", "42.dem");
        assert_eq!(local.decode().as_deref(), Some("/parser/src/replays/42.dem"));
        assert!(!local.as_str().contains('+') && !local.as_str().contains('/'));

        let remote = SourceReference::remote("https://cdn.example/r?sig=a/b+c");
        assert_eq!(
            remote.decode().as_deref(),
            Some("https://cdn.example/r?sig=a/b+c")
        );
    }

    #[test]
    fn test_local_demo_handle_requires_filename() {
        assert_eq!(LocalDemo::found("1.dem").handle(), Some("1.dem"));
        let no_name = LocalDemo {
            available: true,
            filename: None,
        };
        assert_eq!(no_name.handle(), None);
        assert_eq!(LocalDemo::unavailable().handle(), None);
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), ERROR_BODY_LIMIT + 3);
        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn test_check_demo_and_parse() {
        let router = Router::new()
            .route(
                "/check-demo/:id",
                get(|Path(id): Path<i64>| async move {
                    Json(serde_json::json!({"available": id == 42, "filename": format!("{id}.dem")}))
                }),
            )
            .route(
                "/parse",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert!(body["demo_url"].is_string());
                    Json(serde_json::json!({
                        "total_match_time_s": 1,
                        "positions": [[]],
                        "damage": [{}]
                    }))
                }),
            );
        let parser = client(serve(router).await, 5);

        let demo = parser.check_local_demo(MatchId::new(42)).await.unwrap();
        assert_eq!(demo.handle(), Some("42.dem"));
        let missing = parser.check_local_demo(MatchId::new(7)).await.unwrap();
        assert_eq!(missing.handle(), None);

        let source = SourceReference::local(parser.local_replay_dir(), "42.dem");
        let payload = parser.parse(&source).await.unwrap();
        assert_eq!(payload.total_match_time_s, 1);
    }

    #[tokio::test]
    async fn test_status_failures_trip_parse_breaker_only() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/parse",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "parser crashed")
                }
            }),
        );
        let parser = client(serve(router).await, 2);
        let source = SourceReference::remote("https://cdn.example/1.dem");

        for _ in 0..2 {
            let err = parser.parse(&source).await.unwrap_err();
            assert!(matches!(err, ParserError::Status { status: 500, .. }));
        }
        let err = parser.parse(&source).await.unwrap_err();
        assert!(matches!(err, ParserError::CircuitOpen { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let states = parser.circuit_states();
        assert_eq!(states[0], (CHECK_DEMO_OPERATION.to_string(), CircuitState::Closed));
        assert_eq!(states[1], (PARSE_OPERATION.to_string(), CircuitState::Open));
    }

    #[tokio::test]
    async fn test_connect_failure_is_upstream_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let parser = client(format!("http://{}", addr), 5);
        let err = parser.check_local_demo(MatchId::new(1)).await.unwrap_err();
        assert!(matches!(err, ParserError::Connect { .. } | ParserError::Timeout { .. }));
        assert!(err.is_upstream_failure());
        assert_eq!(parser.check_breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_invalid_response() {
        let router = Router::new().route(
            "/parse",
            post(|| async { Json(serde_json::json!({"positions": "nope"})) }),
        );
        let parser = client(serve(router).await, 5);
        let err = parser
            .parse(&SourceReference::remote("https://x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParserError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_empty_reference_rejected_without_tripping() {
        let parser = client("http://127.0.0.1:9".to_string(), 1);
        let err = parser
            .parse(&SourceReference::remote(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ParserError::InvalidRequest { .. }));
        assert_eq!(parser.parse_breaker().state(), CircuitState::Closed);
    }
}
