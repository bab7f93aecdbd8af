//! replaylens API Server Entry Point
//!
//! Loads configuration, builds the artifact store and upstream clients, and
//! starts the Axum HTTP server.

use std::sync::Arc;

use replaylens_api::telemetry::{init_tracing, TelemetryConfig};
use replaylens_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, ArtifactStore, DbConfig,
    InMemoryArtifactStore, PgArtifactStore, StoreBackend,
};
use replaylens_core::ReplayLensError;
use replaylens_upstream::{
    CircuitBreakerConfig, DeadlockApiClient, MetadataConfig, ParserClient, ParserConfig,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env().map_err(ReplayLensError::from)?;
    let addr = api_config.socket_addr().map_err(ReplayLensError::from)?;

    let store = build_store(api_config.store).await?;

    let parser_config = ParserConfig::from_env();
    tracing::info!(base_url = %parser_config.base_url, "Configured replay parser");
    let parser = Arc::new(
        ParserClient::new(parser_config, CircuitBreakerConfig::from_env())
            .map_err(ReplayLensError::from)?,
    );
    let metadata =
        Arc::new(DeadlockApiClient::new(MetadataConfig::from_env()).map_err(ReplayLensError::from)?);

    tracing::info!(
        schema_version = api_config.schema_version,
        store = ?api_config.store,
        "Starting replaylens API server"
    );
    let state = AppState::new(api_config, store, parser, metadata);
    let app = create_api_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "Listening");

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn build_store(backend: StoreBackend) -> ApiResult<Arc<dyn ArtifactStore>> {
    match backend {
        StoreBackend::Postgres => {
            let store = PgArtifactStore::from_config(&DbConfig::from_env())?;
            store.migrate().await?;
            tracing::info!(pool_size = store.pool_size(), "Using Postgres artifact store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory artifact store; artifacts are lost on restart");
            Ok(Arc::new(InMemoryArtifactStore::new()))
        }
    }
}
