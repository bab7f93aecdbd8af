//! Error types for replaylens operations

use crate::MatchId;
use thiserror::Error;

/// Replay parser service errors.
///
/// Every variant except [`ParserError::InvalidRequest`] counts toward the
/// parser circuit breaker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParserError {
    #[error("Parser {operation} timed out: {reason}")]
    Timeout { operation: String, reason: String },

    #[error("Failed to connect to parser for {operation}: {reason}")]
    Connect { operation: String, reason: String },

    #[error("Parser {operation} returned status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from parser {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Circuit breaker open: parser {operation} temporarily unavailable")]
    CircuitOpen { operation: String },

    #[error("Invalid parser request for {operation}: {reason}")]
    InvalidRequest { operation: String, reason: String },
}

impl ParserError {
    /// Whether this failure originated from the parser itself (and so should
    /// be recorded by a circuit breaker).
    pub fn is_upstream_failure(&self) -> bool {
        !matches!(
            self,
            ParserError::InvalidRequest { .. } | ParserError::CircuitOpen { .. }
        )
    }
}

/// Match metadata provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Match {match_id} not found at metadata provider")]
    NotFound { match_id: MatchId },

    #[error("Metadata request for match {match_id} failed: {reason}")]
    Request { match_id: MatchId, reason: String },

    #[error("Metadata provider returned status {status} for match {match_id}")]
    Status { match_id: MatchId, status: u16 },

    #[error("Invalid metadata response for match {match_id}: {reason}")]
    InvalidResponse { match_id: MatchId, reason: String },
}

/// Data integrity faults in raw payloads or stored artifacts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Match start {start}s is after match end {total}s")]
    InvertedTimeline { start: u32, total: u32 },

    #[error("Timeline '{field}' has {actual} ticks, expected at least {expected}")]
    ShortTimeline {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Position sample at tick {tick} references unknown player {custom_id}")]
    UnknownPlayer { custom_id: u32, tick: usize },

    #[error("Player {custom_id} has more than one position sample at tick {tick}")]
    DuplicateSample { custom_id: u32, tick: usize },

    #[error("Invalid lane key '{key}': expected '<lane>_<team>'")]
    InvalidLaneKey { key: String },

    #[error("Invalid custom id '{value}'")]
    InvalidCustomId { value: String },

    #[error("Stored artifact for match {match_id} (schema v{schema_version}) is unreadable: {reason}")]
    UnreadableArtifact {
        match_id: MatchId,
        schema_version: i32,
        reason: String,
    },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Persistence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error during {operation}: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Storage pool unavailable: {reason}")]
    PoolUnavailable { reason: String },

    #[error("Compression failed: {reason}")]
    Compression { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse error classification surfaced to the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ParserUnavailable,
    MatchDataUnavailable,
    ArtifactIntegrityFault,
    UpstreamMetadataError,
    PersistenceFault,
    Configuration,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParserUnavailable => "parser_unavailable",
            ErrorKind::MatchDataUnavailable => "match_data_unavailable",
            ErrorKind::ArtifactIntegrityFault => "artifact_integrity_fault",
            ErrorKind::UpstreamMetadataError => "upstream_metadata_error",
            ErrorKind::PersistenceFault => "persistence_fault",
            ErrorKind::Configuration => "configuration",
        }
    }
}

/// Master error type for all replaylens errors.
#[derive(Debug, Clone, Error)]
pub enum ReplayLensError {
    #[error("Parser unavailable: {0}")]
    Parser(#[from] ParserError),

    #[error("No replay source available for match {match_id}")]
    MatchDataUnavailable { match_id: MatchId },

    #[error("Integrity fault: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ReplayLensError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReplayLensError::Parser(_) => ErrorKind::ParserUnavailable,
            ReplayLensError::MatchDataUnavailable { .. } => ErrorKind::MatchDataUnavailable,
            ReplayLensError::Integrity(_) => ErrorKind::ArtifactIntegrityFault,
            ReplayLensError::Metadata(_) => ErrorKind::UpstreamMetadataError,
            ReplayLensError::Storage(_) => ErrorKind::PersistenceFault,
            ReplayLensError::Config(_) => ErrorKind::Configuration,
        }
    }

    /// True for the breaker's fast-fail rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ReplayLensError::Parser(ParserError::CircuitOpen { .. }))
    }
}

/// Result type alias for replaylens operations.
pub type ReplayLensResult<T> = Result<T, ReplayLensError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_open_is_parser_unavailable() {
        let err = ReplayLensError::from(ParserError::CircuitOpen {
            operation: "parse".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::ParserUnavailable);
        assert!(err.is_circuit_open());
        assert!(err.to_string().contains("Circuit breaker open"));
    }

    #[test]
    fn test_live_parser_failure_is_not_circuit_open() {
        let err = ReplayLensError::from(ParserError::Status {
            operation: "parse".to_string(),
            status: 503,
            body: "busy".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::ParserUnavailable);
        assert!(!err.is_circuit_open());
    }

    #[test]
    fn test_upstream_failure_classification() {
        let timeout = ParserError::Timeout {
            operation: "check_demo".to_string(),
            reason: "deadline".to_string(),
        };
        let bad_request = ParserError::InvalidRequest {
            operation: "parse".to_string(),
            reason: "bad url".to_string(),
        };
        assert!(timeout.is_upstream_failure());
        assert!(!bad_request.is_upstream_failure());
    }

    #[test]
    fn test_kind_mapping() {
        let missing = ReplayLensError::MatchDataUnavailable {
            match_id: MatchId::new(42),
        };
        assert_eq!(missing.kind(), ErrorKind::MatchDataUnavailable);

        let integrity: ReplayLensError = IntegrityError::InvalidLaneKey {
            key: "north".to_string(),
        }
        .into();
        assert_eq!(integrity.kind(), ErrorKind::ArtifactIntegrityFault);

        let metadata: ReplayLensError = MetadataError::Status {
            match_id: MatchId::new(42),
            status: 500,
        }
        .into();
        assert_eq!(metadata.kind(), ErrorKind::UpstreamMetadataError);

        let storage: ReplayLensError = StorageError::LockPoisoned.into();
        assert_eq!(storage.kind(), ErrorKind::PersistenceFault);
    }

    #[test]
    fn test_short_timeline_display() {
        let err = IntegrityError::ShortTimeline {
            field: "damage",
            expected: 120,
            actual: 119,
        };
        let msg = err.to_string();
        assert!(msg.contains("damage"));
        assert!(msg.contains("120"));
        assert!(msg.contains("119"));
    }
}
