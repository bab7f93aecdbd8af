//! Match Metadata Routes
//!
//! Passthrough of the metadata provider's match record.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use super::analysis::parse_match_id;
use crate::error::ApiResult;
use crate::services::AnalysisOrchestrator;
use crate::state::AppState;

/// GET /match/metadata/:match_id
pub async fn get_metadata(
    State(orchestrator): State<Arc<AnalysisOrchestrator>>,
    Path(match_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let match_id = parse_match_id(&match_id)?;
    let metadata = orchestrator.match_metadata(match_id).await?;
    Ok(Json(metadata))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/:match_id", get(get_metadata))
}
