//! HTTP surface for the evaluation agents

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header::HeaderName};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use modelbench_agents::AgentRegistry;
use modelbench_core::Error;
use modelbench_decision::GatewayHealth;
use modelbench_observability::{Metrics, metrics_router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub health: Arc<GatewayHealth>,
    pub metrics: Arc<Metrics>,
}

/// Assemble the full application router.
pub fn build_router(state: AppState) -> Router {
    let metrics = Arc::clone(&state.metrics);
    Router::new()
        .route("/api/v1/agents/{agent_id}", post(invoke_agent))
        .route("/api/v1/agents", get(list_agents))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
        .merge(metrics_router(metrics))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn(attach_request_id))
}

async fn attach_request_id(req: axum::extract::Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }
    response
}

fn error_body(code: &str, message: &str, recoverable: bool) -> Value {
    json!({
        "success": false,
        "error": {
            "code": code,
            "message": message,
            "recoverable": recoverable,
        }
    })
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(error_body(
            "METHOD_NOT_ALLOWED",
            "this endpoint only accepts the documented method",
            true,
        )),
    )
        .into_response()
}

async fn invoke_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(agent) = state.registry.get(&agent_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(error_body(
                "UNKNOWN_AGENT",
                &format!("no agent registered under '{}'", agent_id),
                true,
            )),
        )
            .into_response();
    };

    let agent_headers = [
        (
            HeaderName::from_static("x-agent-id"),
            HeaderValue::from_str(agent.agent_id()).expect("agent id is ascii"),
        ),
        (
            HeaderName::from_static("x-agent-version"),
            HeaderValue::from_str(agent.agent_version()).expect("agent version is ascii"),
        ),
    ];

    let input = match body {
        Ok(Json(input)) => input,
        Err(rejection) => {
            let mut response = (
                StatusCode::BAD_REQUEST,
                Json(error_body("VALIDATION_ERROR", &rejection.to_string(), true)),
            )
                .into_response();
            response.headers_mut().extend(agent_headers);
            return response;
        }
    };

    if !state.health.is_healthy().await {
        warn!(agent_id, "rejecting request: durable-store gateway unreachable");
        let mut response = (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(error_body(
                "PERSISTENCE_ERROR",
                "durable-store gateway is unreachable",
                true,
            )),
        )
            .into_response();
        response.headers_mut().extend(agent_headers);
        return response;
    }

    let started = Instant::now();
    let result = agent.handle(input).await;
    state
        .metrics
        .agent_duration_seconds
        .with_label_values(&[agent.agent_id()])
        .observe(started.elapsed().as_secs_f64());

    let mut response = match result {
        Ok(outcome) => {
            info!(
                agent_id,
                decision_id = %outcome.decision_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "agent invocation succeeded"
            );
            state
                .metrics
                .agent_requests_total
                .with_label_values(&[agent.agent_id(), "success"])
                .inc();
            state
                .metrics
                .decisions_emitted_total
                .with_label_values(&[agent.agent_id()])
                .inc();
            let mut response = (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "decision_id": outcome.decision_id,
                    "data": outcome.data,
                })),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&outcome.decision_id) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("x-decision-id"), value);
            }
            response
        }
        Err(err) => {
            state
                .metrics
                .agent_requests_total
                .with_label_values(&[agent.agent_id(), "error"])
                .inc();
            match &err {
                Error::Validation(validation) => {
                    let mut body = error_body("VALIDATION_ERROR", &err.to_string(), true);
                    body["error"]["fields"] =
                        serde_json::to_value(&validation.errors).unwrap_or(Value::Null);
                    (StatusCode::BAD_REQUEST, Json(body)).into_response()
                }
                Error::Persistence(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(error_body("PERSISTENCE_ERROR", &err.to_string(), true)),
                )
                    .into_response(),
                _ => {
                    warn!(agent_id, error = %err, "agent invocation failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(error_body(err.code(), &err.to_string(), false)),
                    )
                        .into_response()
                }
            }
        }
    };
    response.headers_mut().extend(agent_headers);
    response
}

async fn list_agents(State(state): State<AppState>) -> Response {
    let agents: Vec<Value> = state
        .registry
        .ids()
        .into_iter()
        .filter_map(|id| state.registry.get(id))
        .map(|agent| {
            json!({
                "agent_id": agent.agent_id(),
                "agent_version": agent.agent_version(),
                "decision_type": agent.decision_type(),
            })
        })
        .collect();
    (
        StatusCode::OK,
        Json(json!({"success": true, "data": {"agents": agents}})),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    if state.health.is_healthy().await {
        (StatusCode::OK, Json(json!({"status": "healthy"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy"})),
        )
            .into_response()
    }
}

async fn ready(State(state): State<AppState>) -> Response {
    let gateway_ok = state.health.is_healthy().await;
    let body = json!({
        "status": if gateway_ok { "ready" } else { "not_ready" },
        "checks": {"ruvector_service": gateway_ok},
    });
    let status = if gateway_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
