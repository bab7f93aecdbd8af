//! Analysis Orchestrator
//!
//! Drives one analysis request from cache lookup to a served artifact:
//!
//! 1. Cache lookup at `(match_id, schema_version)`. A hit is served (or
//!    answered `NotModified`) without touching any upstream.
//! 2. On a miss, resolve a raw payload through the replay source fallback
//!    chain: staged local demo first, then the metadata provider's signed
//!    download URL.
//! 3. Build the artifact, persist it with its tag, serve it.
//!
//! Concurrent misses for the same key are coalesced: the first request runs
//! the pipeline, the rest wait and then read its result from the store.

use std::sync::Arc;

use replaylens_core::{
    compute_etag, is_not_modified, AnalysisArtifact, IntegrityError, MatchId, ParserError,
    RawMatchPayload, ReplayLensError, ReplayLensResult,
};
use replaylens_storage::{gzip_json, ArtifactKey, ArtifactStore, NewArtifactRecord};
use replaylens_upstream::{
    LocalDemo, MetadataProvider, ReplayParser, SourceReference, CHECK_DEMO_OPERATION,
    PARSE_OPERATION,
};

use super::single_flight::SingleFlight;
use crate::telemetry::with_metrics;

// ============================================================================
// OUTCOME
// ============================================================================

/// Where a served artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    Cache,
    Computed,
}

/// Terminal state of a successful analysis request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Served {
        artifact: AnalysisArtifact,
        etag: String,
        source: ArtifactSource,
    },
    NotModified {
        etag: String,
    },
}

impl AnalysisOutcome {
    pub fn etag(&self) -> &str {
        match self {
            AnalysisOutcome::Served { etag, .. } | AnalysisOutcome::NotModified { etag } => etag,
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            AnalysisOutcome::Served {
                source: ArtifactSource::Cache,
                ..
            } => "served_cached",
            AnalysisOutcome::Served {
                source: ArtifactSource::Computed,
                ..
            } => "served_computed",
            AnalysisOutcome::NotModified { .. } => "not_modified",
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Cache-or-compute pipeline for match analysis.
pub struct AnalysisOrchestrator {
    store: Arc<dyn ArtifactStore>,
    parser: Arc<dyn ReplayParser>,
    metadata: Arc<dyn MetadataProvider>,
    schema_version: i32,
    flights: SingleFlight<ArtifactKey>,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        parser: Arc<dyn ReplayParser>,
        metadata: Arc<dyn MetadataProvider>,
        schema_version: i32,
    ) -> Self {
        Self {
            store,
            parser,
            metadata,
            schema_version,
            flights: SingleFlight::new(),
        }
    }

    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }

    fn key(&self, match_id: MatchId) -> ArtifactKey {
        ArtifactKey::new(match_id, self.schema_version)
    }

    /// Serve the analysis for `match_id`.
    ///
    /// `if_none_match` is the raw `If-None-Match` header, if any. Only a
    /// cache hit can answer `NotModified`.
    #[tracing::instrument(skip(self, if_none_match), fields(schema_version = self.schema_version))]
    pub async fn analyze(
        &self,
        match_id: MatchId,
        if_none_match: Option<&str>,
    ) -> ReplayLensResult<AnalysisOutcome> {
        let result = self.run(match_id, if_none_match).await;
        match &result {
            Ok(outcome) => {
                tracing::info!(outcome = outcome.metric_label(), etag = outcome.etag(), "Analysis served");
                with_metrics(|m| m.record_outcome(outcome.metric_label()));
            }
            Err(err) => {
                let label = format!("failed_{}", err.kind().as_str());
                with_metrics(|m| m.record_outcome(&label));
            }
        }
        result
    }

    async fn run(
        &self,
        match_id: MatchId,
        if_none_match: Option<&str>,
    ) -> ReplayLensResult<AnalysisOutcome> {
        let key = self.key(match_id);

        if let Some(outcome) = self.lookup(key, if_none_match).await? {
            return Ok(outcome);
        }

        let _flight = self.flights.acquire(&key).await;

        // A request ahead of us may have persisted while we waited.
        if let Some(outcome) = self.lookup(key, if_none_match).await? {
            tracing::debug!("Served artifact persisted by a concurrent request");
            return Ok(outcome);
        }

        let payload = self.fetch_payload(match_id).await?;
        let artifact = AnalysisArtifact::build(&payload)?;
        let etag = compute_etag(&artifact, self.schema_version)?;
        self.persist(key, &payload, &artifact, &etag).await?;

        Ok(AnalysisOutcome::Served {
            artifact,
            etag,
            source: ArtifactSource::Computed,
        })
    }

    /// Read and decode the stored artifact at `key`.
    ///
    /// The tag is recomputed from the decoded artifact so it always matches
    /// the body being served.
    async fn lookup(
        &self,
        key: ArtifactKey,
        if_none_match: Option<&str>,
    ) -> ReplayLensResult<Option<AnalysisOutcome>> {
        let Some(record) = self.store.get(key).await? else {
            return Ok(None);
        };

        let artifact: AnalysisArtifact =
            serde_json::from_value(record.artifact_data).map_err(|e| {
                IntegrityError::UnreadableArtifact {
                    match_id: key.match_id,
                    schema_version: key.schema_version,
                    reason: e.to_string(),
                }
            })?;
        let etag = compute_etag(&artifact, key.schema_version)?;
        if etag != record.etag {
            tracing::warn!(
                stored = %record.etag,
                computed = %etag,
                "Stored tag does not match artifact; serving recomputed tag"
            );
        }

        if if_none_match.is_some_and(|header| is_not_modified(header, &etag)) {
            return Ok(Some(AnalysisOutcome::NotModified { etag }));
        }
        Ok(Some(AnalysisOutcome::Served {
            artifact,
            etag,
            source: ArtifactSource::Cache,
        }))
    }

    /// Replay source fallback chain.
    ///
    /// Local check and local parse failures are downgraded; only the
    /// remote parse and the demo URL lookup can fail the request.
    async fn fetch_payload(&self, match_id: MatchId) -> ReplayLensResult<RawMatchPayload> {
        let local = match self.parser.check_local_demo(match_id).await {
            Ok(local) => local,
            Err(err) => {
                note_downgrade("local_check_failed", CHECK_DEMO_OPERATION, &err);
                LocalDemo::unavailable()
            }
        };

        if let Some(filename) = local.handle() {
            let source = SourceReference::local(self.parser.local_replay_dir(), filename);
            match self.parser.parse(&source).await {
                Ok(payload) => {
                    tracing::info!(filename, "Parsed staged local demo");
                    return Ok(payload);
                }
                Err(err) => note_downgrade("local_parse_failed", PARSE_OPERATION, &err),
            }
        }

        let demo_url = self
            .metadata
            .demo_url(match_id)
            .await?
            .ok_or(ReplayLensError::MatchDataUnavailable { match_id })?;

        with_metrics(|m| m.record_fallback("remote_parse"));
        tracing::info!("Parsing replay from remote download URL");
        self.parser
            .parse(&SourceReference::remote(&demo_url))
            .await
            .map_err(|err| {
                if matches!(err, ParserError::CircuitOpen { .. }) {
                    tracing::warn!(operation = PARSE_OPERATION, "Remote parse rejected: circuit open");
                    with_metrics(|m| m.record_circuit_rejection(PARSE_OPERATION));
                }
                ReplayLensError::from(err)
            })
    }

    async fn persist(
        &self,
        key: ArtifactKey,
        payload: &RawMatchPayload,
        artifact: &AnalysisArtifact,
        etag: &str,
    ) -> ReplayLensResult<()> {
        let raw_payload_gzip = gzip_json(payload)?;
        let artifact_data = serde_json::to_value(artifact).map_err(|e| {
            IntegrityError::Serialization {
                reason: e.to_string(),
            }
        })?;
        self.store
            .upsert(NewArtifactRecord {
                key,
                raw_payload_gzip,
                artifact_data,
                etag: etag.to_string(),
            })
            .await?;
        tracing::info!(%key, etag, "Persisted analysis artifact");
        Ok(())
    }

    /// Gzip bytes of the raw payload stored for `match_id`.
    pub async fn raw_payload(&self, match_id: MatchId) -> ReplayLensResult<Option<Vec<u8>>> {
        self.store.raw_payload(self.key(match_id)).await
    }

    /// Match metadata straight from the provider.
    pub async fn match_metadata(&self, match_id: MatchId) -> ReplayLensResult<serde_json::Value> {
        Ok(self.metadata.match_metadata(match_id).await?)
    }
}

/// Log and count a fallback step that swallowed `err`.
fn note_downgrade(stage: &'static str, operation: &'static str, err: &ParserError) {
    if matches!(err, ParserError::CircuitOpen { .. }) {
        tracing::warn!(stage, operation, "Skipping step: circuit open");
        with_metrics(|m| m.record_circuit_rejection(operation));
    } else {
        tracing::warn!(stage, operation, error = %err, "Falling back to next replay source");
    }
    with_metrics(|m| m.record_fallback(stage));
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("schema_version", &self.schema_version)
            .field("in_flight", &self.flights.in_flight())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
