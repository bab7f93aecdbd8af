//! Probe endpoints for orchestrators and load balancers.
//!
//! `/health/ping` and `/health/live` never touch a dependency. `/health/ready`
//! pings the artifact store and reports the parser breakers.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use replaylens_core::CircuitState;
use replaylens_storage::ArtifactStore;
use replaylens_upstream::ReplayParser;
use serde::Serialize;

use crate::config::ApiConfig;
use crate::state::AppState;

/// Overall readiness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ready,
    /// Cached artifacts are served but fresh analyses may fail fast.
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreProbe {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitProbe {
    pub operation: String,
    pub state: CircuitState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: Readiness,
    pub schema_version: i32,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub store: StoreProbe,
    pub parser: Vec<CircuitProbe>,
}

impl ReadinessReport {
    fn verdict(store: &StoreProbe, parser: &[CircuitProbe]) -> Readiness {
        if !store.reachable {
            Readiness::Unavailable
        } else if parser.iter().any(|c| c.state != CircuitState::Closed) {
            Readiness::Degraded
        } else {
            Readiness::Ready
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.status {
            Readiness::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Readiness::Ready | Readiness::Degraded => StatusCode::OK,
        }
    }
}

/// GET /health/ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /health/live
pub async fn liveness(State(start_time): State<Instant>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "uptime_seconds": start_time.elapsed().as_secs(),
    }))
}

/// GET /health/ready
///
/// `503` only when the store is unreachable. Open parser circuits report
/// `degraded` with `200`.
pub async fn readiness(
    State(config): State<Arc<ApiConfig>>,
    State(store): State<Arc<dyn ArtifactStore>>,
    State(parser): State<Arc<dyn ReplayParser>>,
    State(start_time): State<Instant>,
) -> (StatusCode, Json<ReadinessReport>) {
    let store = probe_store(store.as_ref()).await;
    let parser: Vec<CircuitProbe> = parser
        .circuit_states()
        .into_iter()
        .map(|(operation, state)| CircuitProbe { operation, state })
        .collect();

    let report = ReadinessReport {
        status: ReadinessReport::verdict(&store, &parser),
        schema_version: config.schema_version,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: start_time.elapsed().as_secs(),
        store,
        parser,
    };
    if report.status != Readiness::Ready {
        tracing::warn!(status = ?report.status, "Readiness check not ready");
    }
    (report.status_code(), Json(report))
}

async fn probe_store(store: &dyn ArtifactStore) -> StoreProbe {
    let start = Instant::now();
    match store.ping().await {
        Ok(()) => StoreProbe {
            reachable: true,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => StoreProbe {
            reachable: false,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reachable() -> StoreProbe {
        StoreProbe {
            reachable: true,
            latency_ms: Some(1),
            error: None,
        }
    }

    fn circuit(state: CircuitState) -> CircuitProbe {
        CircuitProbe {
            operation: "parse".to_string(),
            state,
        }
    }

    #[test]
    fn test_verdict_ready_when_store_up_and_circuits_closed() {
        let parser = [circuit(CircuitState::Closed)];
        assert_eq!(ReadinessReport::verdict(&reachable(), &parser), Readiness::Ready);
    }

    #[test]
    fn test_verdict_degraded_on_half_open_circuit() {
        let parser = [circuit(CircuitState::Closed), circuit(CircuitState::HalfOpen)];
        assert_eq!(
            ReadinessReport::verdict(&reachable(), &parser),
            Readiness::Degraded
        );
    }

    #[test]
    fn test_unreachable_store_wins_over_circuits() {
        let store = StoreProbe {
            reachable: false,
            latency_ms: None,
            error: Some("pool exhausted".to_string()),
        };
        let parser = [circuit(CircuitState::Open)];
        let report = ReadinessReport {
            status: ReadinessReport::verdict(&store, &parser),
            schema_version: 1,
            version: "test",
            uptime_seconds: 0,
            store,
            parser: parser.to_vec(),
        };
        assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["store"]["error"], "pool exhausted");
        assert!(json["store"].get("latency_ms").is_none());
        assert_eq!(json["parser"][0]["state"], "open");
    }
}
