//! Transport errors.
//!
//! Every failure leaves the API as `{"code", "message", "details"?}` with the
//! status carried by its [`ErrorCode`]. Pipeline errors are mapped by
//! [`ErrorKind`] in one place, so handlers just use `?`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use replaylens_core::{ErrorKind, MetadataError, ReplayLensError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable failure code, serialized in SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Path segment is not a positive match id.
    InvalidMatchId,
    /// Neither a staged demo nor a download URL exists.
    MatchDataUnavailable,
    MetadataNotFound,
    /// Raw payload requested before any analysis was stored.
    ArtifactNotFound,
    /// Parser failed, timed out, or its breaker is open.
    ParserUnavailable,
    MetadataUnavailable,
    ArtifactIntegrityFault,
    PersistenceFault,
    Internal,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidMatchId => StatusCode::BAD_REQUEST,
            ErrorCode::MatchDataUnavailable
            | ErrorCode::MetadataNotFound
            | ErrorCode::ArtifactNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ParserUnavailable | ErrorCode::MetadataUnavailable => {
                StatusCode::BAD_GATEWAY
            }
            ErrorCode::ArtifactIntegrityFault | ErrorCode::PersistenceFault | ErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMatchId => "INVALID_MATCH_ID",
            ErrorCode::MatchDataUnavailable => "MATCH_DATA_UNAVAILABLE",
            ErrorCode::MetadataNotFound => "METADATA_NOT_FOUND",
            ErrorCode::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            ErrorCode::ParserUnavailable => "PARSER_UNAVAILABLE",
            ErrorCode::MetadataUnavailable => "METADATA_UNAVAILABLE",
            ErrorCode::ArtifactIntegrityFault => "ARTIFACT_INTEGRITY_FAULT",
            ErrorCode::PersistenceFault => "PERSISTENCE_FAULT",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMatchId => "Match id must be a positive integer",
            ErrorCode::MatchDataUnavailable => "No replay available for this match",
            ErrorCode::MetadataNotFound => "Match not found",
            ErrorCode::ArtifactNotFound => "No stored analysis for this match",
            ErrorCode::ParserUnavailable => "Replay parser unavailable",
            ErrorCode::MetadataUnavailable => "Match metadata provider unavailable",
            ErrorCode::ArtifactIntegrityFault => "Match data failed integrity checks",
            ErrorCode::PersistenceFault => "Artifact store unavailable",
            ErrorCode::Internal => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.summary())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn invalid_match_id(raw: &str) -> Self {
        Self::new(
            ErrorCode::InvalidMatchId,
            format!("'{}' is not a valid match id", raw),
        )
    }

    pub fn artifact_not_found(match_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ArtifactNotFound,
            format!("No stored analysis for match {}", match_id),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PersistenceFault, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<ReplayLensError> for ApiError {
    fn from(err: ReplayLensError) -> Self {
        let kind = err.kind();
        let code = match (&err, kind) {
            (ReplayLensError::Metadata(MetadataError::NotFound { .. }), _) => {
                ErrorCode::MetadataNotFound
            }
            (_, ErrorKind::ParserUnavailable) => ErrorCode::ParserUnavailable,
            (_, ErrorKind::MatchDataUnavailable) => ErrorCode::MatchDataUnavailable,
            (_, ErrorKind::ArtifactIntegrityFault) => ErrorCode::ArtifactIntegrityFault,
            (_, ErrorKind::UpstreamMetadataError) => ErrorCode::MetadataUnavailable,
            (_, ErrorKind::PersistenceFault) => ErrorCode::PersistenceFault,
            (_, ErrorKind::Configuration) => ErrorCode::Internal,
        };

        if code.status_code().is_server_error() {
            tracing::error!(kind = kind.as_str(), error = %err, "Request failed");
        } else {
            tracing::warn!(kind = kind.as_str(), error = %err, "Request failed");
        }

        // Only the not-found message is specific enough to expose.
        let api = match code {
            ErrorCode::MatchDataUnavailable => ApiError::new(code, err.to_string()),
            _ => ApiError::from_code(code),
        };
        api.with_details(serde_json::json!({ "kind": kind.as_str() }))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
