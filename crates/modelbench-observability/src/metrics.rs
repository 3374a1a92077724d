//! Metrics collection with Prometheus
//!
//! Counters and histograms for the agent surface:
//! - Agent request counts and durations
//! - Decisions emitted, by agent
//! - Provider call counts, by provider and outcome
//! - Persistence drops from the write-behind buffer

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    /// Agent invocations, by agent and result
    pub agent_requests_total: CounterVec,
    /// Agent request duration
    pub agent_duration_seconds: HistogramVec,
    /// Decisions handed to the pipeline, by agent
    pub decisions_emitted_total: CounterVec,
    /// Entries lost by the write-behind buffer
    pub persistence_drops_total: CounterVec,
    /// Provider calls, by provider, model, and outcome
    pub provider_calls_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let agent_requests_total = CounterVec::new(
            Opts::new("modelbench_agent_requests_total", "Agent invocations"),
            &["agent", "result"],
        )?;
        let agent_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "modelbench_agent_duration_seconds",
                "End-to-end agent request duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["agent"],
        )?;
        let decisions_emitted_total = CounterVec::new(
            Opts::new(
                "modelbench_decisions_emitted_total",
                "Decision records emitted",
            ),
            &["agent"],
        )?;
        let persistence_drops_total = CounterVec::new(
            Opts::new(
                "modelbench_persistence_drops_total",
                "Write-behind buffer entries dropped",
            ),
            &["agent"],
        )?;
        let provider_calls_total = CounterVec::new(
            Opts::new("modelbench_provider_calls_total", "Provider invocations"),
            &["provider", "model", "outcome"],
        )?;

        registry.register(Box::new(agent_requests_total.clone()))?;
        registry.register(Box::new(agent_duration_seconds.clone()))?;
        registry.register(Box::new(decisions_emitted_total.clone()))?;
        registry.register(Box::new(persistence_drops_total.clone()))?;
        registry.register(Box::new(provider_calls_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            agent_requests_total,
            agent_duration_seconds,
            decisions_emitted_total,
            persistence_drops_total,
            provider_calls_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Router exposing `/metrics` in Prometheus text format.
pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&metrics.registry().gather()) {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", err),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn counters_register_and_increment() {
        let metrics = Metrics::new().unwrap();
        metrics
            .agent_requests_total
            .with_label_values(&["benchmark", "success"])
            .inc();
        metrics
            .provider_calls_total
            .with_label_values(&["openai", "gpt-4o-mini", "success"])
            .inc();
        let gathered = metrics.registry().gather();
        assert!(!gathered.is_empty());
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text_format() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics
            .decisions_emitted_total
            .with_label_values(&["benchmark"])
            .inc();
        let app = metrics_router(metrics);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4"
        );
    }
}
