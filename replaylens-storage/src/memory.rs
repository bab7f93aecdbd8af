//! In-memory artifact store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ::async_trait::async_trait;
use chrono::Utc;
use replaylens_core::ReplayLensResult;
use tokio::sync::RwLock;

use crate::store::{ArtifactKey, ArtifactRecord, ArtifactStore, NewArtifactRecord};

#[derive(Debug, Clone)]
struct StoredRow {
    record: ArtifactRecord,
    raw_payload_gzip: Vec<u8>,
}

/// Artifact store backed by a process-local map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactStore {
    rows: Arc<RwLock<HashMap<ArtifactKey, StoredRow>>>,
    upserts: Arc<AtomicUsize>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of `upsert` calls served since creation.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, key: ArtifactKey) -> ReplayLensResult<Option<ArtifactRecord>> {
        Ok(self.rows.read().await.get(&key).map(|row| row.record.clone()))
    }

    async fn upsert(&self, new: NewArtifactRecord) -> ReplayLensResult<ArtifactRecord> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let created_at = rows
            .get(&new.key)
            .map(|row| row.record.created_at)
            .unwrap_or(now);
        let record = ArtifactRecord {
            key: new.key,
            artifact_data: new.artifact_data,
            etag: new.etag,
            created_at,
            updated_at: now,
        };
        rows.insert(
            new.key,
            StoredRow {
                record: record.clone(),
                raw_payload_gzip: new.raw_payload_gzip,
            },
        );
        tracing::debug!(key = %new.key, "Stored artifact in memory");
        Ok(record)
    }

    async fn raw_payload(&self, key: ArtifactKey) -> ReplayLensResult<Option<Vec<u8>>> {
        Ok(self
            .rows
            .read()
            .await
            .get(&key)
            .map(|row| row.raw_payload_gzip.clone()))
    }

    async fn ping(&self) -> ReplayLensResult<()> {
        Ok(())
    }
}
