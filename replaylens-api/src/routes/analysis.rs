//! Match Analysis Routes
//!
//! - `GET /match/analysis/:match_id` - analysis artifact with `ETag` and
//!   `If-None-Match` support
//! - `GET /match/analysis/:match_id/raw` - stored raw parser output, gzip

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use replaylens_core::{etag, MatchId};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::services::{AnalysisOrchestrator, AnalysisOutcome};
use crate::state::AppState;

/// Parse a path segment as a match id.
pub(crate) fn parse_match_id(raw: &str) -> ApiResult<MatchId> {
    raw.parse::<MatchId>()
        .map_err(|_| ApiError::invalid_match_id(raw))
}

/// `ETag` and `Cache-Control` for an analysis response.
fn cache_headers(tag: &str, config: &ApiConfig) -> ApiResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let etag_value = HeaderValue::from_str(&etag::header_value(tag))
        .map_err(|e| ApiError::internal(format!("Invalid ETag header: {}", e)))?;
    let cache_value = HeaderValue::from_str(&config.cache_control())
        .map_err(|e| ApiError::internal(format!("Invalid Cache-Control header: {}", e)))?;
    headers.insert(header::ETAG, etag_value);
    headers.insert(header::CACHE_CONTROL, cache_value);
    Ok(headers)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /match/analysis/:match_id
pub async fn get_analysis(
    State(orchestrator): State<Arc<AnalysisOrchestrator>>,
    State(config): State<Arc<ApiConfig>>,
    Path(match_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let match_id = parse_match_id(&match_id)?;
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());

    match orchestrator.analyze(match_id, if_none_match).await? {
        AnalysisOutcome::Served { artifact, etag, .. } => {
            let headers = cache_headers(&etag, &config)?;
            Ok((StatusCode::OK, headers, Json(artifact)).into_response())
        }
        AnalysisOutcome::NotModified { etag } => {
            let headers = cache_headers(&etag, &config)?;
            Ok((StatusCode::NOT_MODIFIED, headers).into_response())
        }
    }
}

/// GET /match/analysis/:match_id/raw
pub async fn get_raw_payload(
    State(orchestrator): State<Arc<AnalysisOrchestrator>>,
    Path(match_id): Path<String>,
) -> ApiResult<Response> {
    let match_id = parse_match_id(&match_id)?;
    let bytes = orchestrator
        .raw_payload(match_id)
        .await?
        .ok_or_else(|| ApiError::artifact_not_found(match_id))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        bytes,
    )
        .into_response())
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:match_id", get(get_analysis))
        .route("/:match_id/raw", get(get_raw_payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_match_id() {
        assert_eq!(parse_match_id("42").unwrap(), MatchId::new(42));
        for bad in ["0", "-3", "abc", "", "4.2"] {
            let err = parse_match_id(bad).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_cache_headers() {
        let headers = cache_headers("abc123", &ApiConfig::default()).unwrap();
        assert_eq!(headers[header::ETAG], "\"abc123\"");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=300");
    }
}
