//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use replaylens_storage::ArtifactStore;
use replaylens_upstream::{MetadataProvider, ReplayParser};

use crate::config::ApiConfig;
use crate::services::AnalysisOrchestrator;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    /// Same store the orchestrator writes to; used by readiness checks.
    pub store: Arc<dyn ArtifactStore>,
    /// Same parser the orchestrator calls; used to report breaker states.
    pub parser: Arc<dyn ReplayParser>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the orchestrator over the given gateways.
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn ArtifactStore>,
        parser: Arc<dyn ReplayParser>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            store.clone(),
            parser.clone(),
            metadata,
            config.schema_version,
        ));
        Self {
            config: Arc::new(config),
            orchestrator,
            store,
            parser,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Arc<AnalysisOrchestrator>, orchestrator);
crate::impl_from_ref!(Arc<dyn ArtifactStore>, store);
crate::impl_from_ref!(Arc<dyn ReplayParser>, parser);
crate::impl_from_ref!(Instant, start_time);
