//! REST API Routes Module
//!
//! - Match analysis at /match/analysis/*
//! - Match metadata passthrough at /match/metadata/*
//! - Health checks at /health/* (Kubernetes-compatible)
//! - Prometheus metrics at /metrics
//! - CORS support for browser-based clients

pub mod analysis;
pub mod health;
pub mod metadata;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, Extensions, HeaderMap, HeaderValue, Method, StatusCode, Version},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::compression::{
    predicate::{DefaultPredicate, Predicate},
    CompressionLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::constants::DEFAULT_CORS_MAX_AGE_SECS;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use analysis::create_router as analysis_router;
pub use health::create_router as health_router;
pub use metadata::create_router as metadata_router;

/// Browser access for GET requests. Origins come from the config; an empty
/// list allows any origin.
fn build_cors_layer(config: Arc<ApiConfig>) -> CorsLayer {
    let allow_origin = if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        AllowOrigin::any()
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| config.is_origin_allowed(origin))
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::IF_NONE_MATCH, header::CONTENT_TYPE])
        .expose_headers([header::ETAG, header::CACHE_CONTROL])
        .max_age(Duration::from_secs(DEFAULT_CORS_MAX_AGE_SECS))
}

/// Gzip everything except tagged representations, so a strong `ETag` only
/// ever labels the identity bytes.
fn build_compression_layer() -> CompressionLayer<impl Predicate> {
    let untagged = |_: StatusCode, _: Version, headers: &HeaderMap, _: &Extensions| {
        !headers.contains_key(header::ETAG)
    };
    CompressionLayer::new().compress_when(DefaultPredicate::new().and(untagged))
}

/// Create the complete API router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS (outermost) - handles preflight requests
/// 2. Request tracing spans
/// 3. Observability - metrics per matched route
/// 4. Response compression
pub fn create_api_router(state: AppState) -> Router {
    let cors = build_cors_layer(state.config.clone());

    Router::new()
        .nest("/match/analysis", analysis::create_router())
        .nest("/match/metadata", metadata::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .layer(build_compression_layer())
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use replaylens_storage::InMemoryArtifactStore;
    use replaylens_test_utils::{FakeMetadata, FakeParser};
    use tower::ServiceExt;

    fn router(cors_origins: &[&str]) -> Router {
        let config = ApiConfig {
            cors_origins: cors_origins.iter().map(|o| o.to_string()).collect(),
            ..ApiConfig::default()
        };
        create_api_router(AppState::new(
            config,
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(FakeParser::new()),
            Arc::new(FakeMetadata::new()),
        ))
    }

    async fn allowed_origin(router: Router, origin: &str) -> Option<HeaderValue> {
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health/ping")
                    .header(header::ORIGIN, origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .cloned()
    }

    #[tokio::test]
    async fn test_cors_restricts_to_configured_origins() {
        let allowed = allowed_origin(router(&["https://replays.example"]), "https://replays.example").await;
        assert_eq!(allowed.as_ref().map(|v| v.as_bytes()), Some(&b"https://replays.example"[..]));

        let denied = allowed_origin(router(&["https://replays.example"]), "https://evil.example").await;
        assert!(denied.is_none());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_when_unconfigured() {
        let allowed = allowed_origin(router(&[]), "https://anywhere.example").await;
        assert_eq!(allowed.as_ref().map(|v| v.as_bytes()), Some(&b"*"[..]));
    }
}
