//! Prometheus metrics.
//!
//! Everything lives in one service registry under the `replaylens_` prefix.
//! `/metrics` renders that registry, not the process-global default one.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{ApiError, ApiResult};

const NAMESPACE: &str = "replaylens";

/// Remote parses routinely take minutes, so the tail reaches 300s.
const REQUEST_SECONDS_BUCKETS: &[f64] = &[
    0.005, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0, 30.0, 60.0, 120.0, 300.0,
];

pub static METRICS: Lazy<ApiResult<ReplayLensMetrics>> = Lazy::new(ReplayLensMetrics::new);

/// Run `f` against the service metrics; a failed registration is a no-op.
pub fn with_metrics(f: impl FnOnce(&ReplayLensMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal(format!("Failed to register {}: {}", name, e))
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> ApiResult<IntCounterVec> {
    let vec = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| registration_error(name, e))?;
    registry
        .register(Box::new(vec.clone()))
        .map_err(|e| registration_error(name, e))?;
    Ok(vec)
}

#[derive(Clone)]
pub struct ReplayLensMetrics {
    registry: Registry,
    /// method, route, status
    http_requests: IntCounterVec,
    /// method, route
    http_seconds: HistogramVec,
    /// served_cached, served_computed, not_modified, failed_<kind>
    pub analysis_outcomes: IntCounterVec,
    /// local_check_failed, local_parse_failed, remote_parse
    pub fallback_events: IntCounterVec,
    pub circuit_rejections: IntCounterVec,
}

impl ReplayLensMetrics {
    pub fn new() -> ApiResult<Self> {
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), None)
            .map_err(|e| registration_error("registry", e))?;

        let http_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .buckets(REQUEST_SECONDS_BUCKETS.to_vec()),
            &["method", "route"],
        )
        .map_err(|e| registration_error("http_request_duration_seconds", e))?;
        registry
            .register(Box::new(http_seconds.clone()))
            .map_err(|e| registration_error("http_request_duration_seconds", e))?;

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            .map_err(|e| registration_error("process", e))?;

        Ok(Self {
            http_requests: counter(
                &registry,
                "http_requests_total",
                "HTTP requests by route and status",
                &["method", "route", "status"],
            )?,
            http_seconds,
            analysis_outcomes: counter(
                &registry,
                "analysis_outcomes_total",
                "Analysis requests by terminal outcome",
                &["outcome"],
            )?,
            fallback_events: counter(
                &registry,
                "fallback_events_total",
                "Replay source fallback steps taken",
                &["stage"],
            )?,
            circuit_rejections: counter(
                &registry,
                "circuit_rejections_total",
                "Upstream calls rejected by an open circuit breaker",
                &["operation"],
            )?,
            registry,
        })
    }

    pub fn record_http_request(&self, method: &str, route: &str, status: u16, seconds: f64) {
        let status = status.to_string();
        self.http_requests
            .with_label_values(&[method, route, status.as_str()])
            .inc();
        self.http_seconds
            .with_label_values(&[method, route])
            .observe(seconds);
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.analysis_outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn record_fallback(&self, stage: &str) {
        self.fallback_events.with_label_values(&[stage]).inc();
    }

    pub fn record_circuit_rejection(&self, operation: &str) {
        self.circuit_rejections.with_label_values(&[operation]).inc();
    }

    /// Text exposition of the service registry.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// GET /metrics
pub async fn metrics_handler() -> Response {
    let rendered = match METRICS.as_ref() {
        Ok(metrics) => metrics.render().map_err(|e| e.to_string()),
        Err(e) => Err(e.message.clone()),
    };
    match rendered {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(reason) => {
            tracing::error!(error = %reason, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render_with_namespace() -> Result<(), String> {
        let metrics = ReplayLensMetrics::new().map_err(|e| e.message)?;
        metrics.record_fallback("local_check_failed");
        metrics.record_fallback("local_check_failed");
        metrics.record_outcome("served_cached");
        metrics.record_circuit_rejection("parse");
        metrics.record_http_request("GET", "/match/analysis/:match_id", 200, 0.015);

        assert_eq!(
            metrics
                .fallback_events
                .with_label_values(&["local_check_failed"])
                .get(),
            2
        );
        let text = metrics.render().map_err(|e| e.to_string())?;
        assert!(text.contains("replaylens_fallback_events_total{stage=\"local_check_failed\"} 2"));
        assert!(text.contains("replaylens_circuit_rejections_total{operation=\"parse\"} 1"));
        assert!(text.contains("route=\"/match/analysis/:match_id\""));
        Ok(())
    }

    #[test]
    fn test_instances_do_not_share_registries() -> Result<(), String> {
        let first = ReplayLensMetrics::new().map_err(|e| e.message)?;
        let second = ReplayLensMetrics::new().map_err(|e| e.message)?;
        first.record_outcome("not_modified");
        assert_eq!(
            second.analysis_outcomes.with_label_values(&["not_modified"]).get(),
            0
        );
        Ok(())
    }
}
