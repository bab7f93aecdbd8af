//! Artifact store trait.
//!
//! One record per `(match_id, schema_version)`. Writes are upserts so two
//! requests racing to persist the same match cannot corrupt the row.

use ::async_trait::async_trait;
use chrono::{DateTime, Utc};
use replaylens_core::{MatchId, ReplayLensResult};
use serde::{Deserialize, Serialize};

/// Primary key of a persisted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub match_id: MatchId,
    pub schema_version: i32,
}

impl ArtifactKey {
    pub fn new(match_id: MatchId, schema_version: i32) -> Self {
        Self {
            match_id,
            schema_version,
        }
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.match_id, self.schema_version)
    }
}

/// A stored artifact, without its raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub key: ArtifactKey,
    /// Artifact JSON as written. Decoding against the current schema is the
    /// caller's concern.
    pub artifact_data: serde_json::Value,
    pub etag: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Write request for [`ArtifactStore::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifactRecord {
    pub key: ArtifactKey,
    /// Gzip-compressed raw parser payload.
    pub raw_payload_gzip: Vec<u8>,
    pub artifact_data: serde_json::Value,
    pub etag: String,
}

/// Persistence for analysis artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the artifact stored under `key`.
    async fn get(&self, key: ArtifactKey) -> ReplayLensResult<Option<ArtifactRecord>>;

    /// Insert or replace the record under `record.key`.
    ///
    /// On conflict the artifact, payload and tag are replaced, `created_at`
    /// is kept and `updated_at` is refreshed.
    async fn upsert(&self, record: NewArtifactRecord) -> ReplayLensResult<ArtifactRecord>;

    /// Gzip bytes of the raw payload stored under `key`.
    async fn raw_payload(&self, key: ArtifactKey) -> ReplayLensResult<Option<Vec<u8>>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> ReplayLensResult<()>;
}
