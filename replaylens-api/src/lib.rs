//! replaylens API - HTTP surface for match analysis
//!
//! Serves per-match analysis artifacts built from replay parser output,
//! cached per schema version in an [`ArtifactStore`] and revalidated with
//! `ETag` / `If-None-Match`.
//!
//! Wiring:
//! - [`AnalysisOrchestrator`]: cache lookup, replay source fallback, persist
//! - [`PgArtifactStore`]: Postgres-backed store (in-memory store for dev/tests)
//! - [`create_api_router`]: axum router with CORS, tracing and metrics

#[macro_use]
pub mod macros;

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

pub use config::{ApiConfig, StoreBackend};
pub use db::{DbConfig, PgArtifactStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use services::{AnalysisOrchestrator, AnalysisOutcome, ArtifactSource};
pub use state::AppState;

pub use replaylens_storage::{ArtifactStore, InMemoryArtifactStore};
