//! End-to-end agent tests: scripted provider, mock gateway, real pipeline

use async_trait::async_trait;
use modelbench_agents::{AgentContext, AgentRegistry};
use modelbench_core::{CallOutcome, Error, FinishReason, ProviderTarget, TargetRef, TestCase};
use modelbench_decision::{DecisionPipeline, GatewayClient, GatewayConfig, PipelineConfig};
use modelbench_executor::{ConnectorFactory, Executor};
use modelbench_wire::{CallContext, Connector, InvokeResult};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

struct EchoConnector;

#[async_trait]
impl Connector for EchoConnector {
    async fn invoke(
        &self,
        target: &ProviderTarget,
        test: &TestCase,
        ctx: &CallContext,
    ) -> InvokeResult {
        let now = chrono::Utc::now();
        InvokeResult::new(CallOutcome {
            target_ref: TargetRef {
                provider_name: target.provider_name,
                model_id: target.model_id.clone(),
            },
            test_ref: test.test_id.clone(),
            iteration: ctx.iteration,
            success: true,
            content: ctx.save_response.then(|| format!("echo: {}", test.prompt)),
            finish_reason: FinishReason::Stop,
            latency_ms: 100,
            ttft_ms: None,
            tokens_per_second: Some(10.0),
            prompt_tokens: 5,
            completion_tokens: 1,
            input_cost_usd: 0.0001,
            output_cost_usd: 0.0001,
            error_kind: None,
            error_message: None,
            started_at: now,
            completed_at: now,
        })
    }
}

struct EchoFactory;

impl ConnectorFactory for EchoFactory {
    fn connector(&self, _target: &ProviderTarget) -> Arc<dyn Connector> {
        Arc::new(EchoConnector)
    }
}

async fn registry_against(server: &MockServer) -> (AgentRegistry, Arc<DecisionPipeline>) {
    let gateway =
        Arc::new(GatewayClient::new(GatewayConfig::new(server.uri(), "secret")).unwrap());
    let pipeline = Arc::new(DecisionPipeline::start(gateway, PipelineConfig::default()));
    let executor = Arc::new(Executor::new(Arc::new(EchoFactory)));
    let ctx = AgentContext::new(executor, Arc::clone(&pipeline));
    (AgentRegistry::with_default_agents(ctx), pipeline)
}

async fn mock_gateway() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/decisions"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/telemetry"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn registry_holds_all_thirteen_agents() {
    let server = mock_gateway().await;
    let (registry, _pipeline) = registry_against(&server).await;
    let ids = registry.ids();
    assert_eq!(ids.len(), 13);
    for id in [
        "benchmark",
        "output-consistency",
        "prompt-sensitivity",
        "golden-dataset-validator",
        "hallucination-detector",
        "regression-detection",
        "model-comparator",
        "bias-detection",
        "faithfulness-verification",
        "quality-scoring",
        "adversarial-prompt",
        "synthetic-data-generator",
        "stress-test",
    ] {
        assert!(registry.get(id).is_some(), "missing agent {id}");
    }
}

#[tokio::test]
async fn benchmark_agent_runs_and_persists_a_decision() {
    let server = mock_gateway().await;
    let (registry, pipeline) = registry_against(&server).await;

    let agent = registry.get("benchmark").unwrap();
    let outcome = agent
        .handle(json!({
            "targets": [{"provider_name": "openai", "model_id": "gpt-4o-mini"}],
            "tests": [{"test_id": "t1", "prompt": "Say OK"}],
            "config": {"concurrency": 1, "iterations_per_test": 3},
        }))
        .await
        .unwrap();

    assert!(!outcome.decision_id.is_empty());
    let group = &outcome.data["groups"][0];
    assert_eq!(group["stats"]["total"], 3);
    assert_eq!(group["stats"]["success_rate"], 1.0);

    pipeline.shutdown().await;
    let requests = server.received_requests().await.unwrap();
    let decision: Vec<&Request> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/v1/decisions")
        .collect();
    assert_eq!(decision.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&decision[0].body).unwrap();
    assert_eq!(body["agent_id"], "benchmark");
    assert_eq!(body["inputs_hash"].as_str().unwrap().len(), 64);
    assert!(body["confidence"].as_f64().unwrap() > 0.0);
    // The summary never carries raw prompts
    assert!(!body["inputs_summary"].to_string().contains("Say OK"));
}

#[tokio::test]
async fn consistency_agent_matches_the_reference_scores() {
    let server = mock_gateway().await;
    let (registry, pipeline) = registry_against(&server).await;
    let agent = registry.get("output-consistency").unwrap();

    let identical = agent
        .handle(json!({
            "groups": [{"outputs": ["hello world", "hello world", "hello world"]}],
            "similarity_method": "exact_match",
        }))
        .await
        .unwrap();
    assert_eq!(identical.data["groups"][0]["consistency_score"], 1.0);
    assert_eq!(identical.data["groups"][0]["is_consistent"], true);

    let divergent = agent
        .handle(json!({
            "groups": [{"outputs": ["hello world", "hello world", "goodbye world"]}],
            "similarity_method": "exact_match",
        }))
        .await
        .unwrap();
    let score = divergent.data["groups"][0]["consistency_score"].as_f64().unwrap();
    assert!((score - 2.0 / 3.0).abs() < 0.01);
    assert_eq!(divergent.data["groups"][0]["is_consistent"], false);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn hallucination_agent_flags_the_capital_contradiction() {
    let server = mock_gateway().await;
    let (registry, pipeline) = registry_against(&server).await;
    let agent = registry.get("hallucination-detector").unwrap();

    let outcome = agent
        .handle(json!({
            "claims": ["Paris is the capital of Germany"],
            "contexts": ["Paris is the capital of France."],
        }))
        .await
        .unwrap();

    let claim = &outcome.data["claims"][0];
    assert_eq!(claim["hallucination_type"], "contradiction");
    assert_eq!(claim["severity"], "critical");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn validation_failures_do_not_emit_decisions() {
    let server = mock_gateway().await;
    let (registry, pipeline) = registry_against(&server).await;
    let agent = registry.get("output-consistency").unwrap();

    let err = agent
        .handle(json!({"groups": [{"outputs": ["only one"]}]}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    pipeline.shutdown().await;
    let requests = server.received_requests().await.unwrap();
    assert!(
        requests
            .iter()
            .all(|r| r.url.path() != "/api/v1/decisions"),
        "no decision may be persisted for invalid input"
    );
}

#[tokio::test]
async fn stress_agent_runs_burst_phase() {
    let server = mock_gateway().await;
    let (registry, pipeline) = registry_against(&server).await;
    let agent = registry.get("stress-test").unwrap();

    let outcome = agent
        .handle(json!({
            "target": {"provider_name": "openai", "model_id": "gpt-4o-mini"},
            "test_type": "burst",
            "base_prompt": "ping",
            "total_requests": 8,
            "max_concurrency": 4,
        }))
        .await
        .unwrap();

    assert_eq!(outcome.data["total_requests"], 8);
    assert_eq!(outcome.data["overall_error_rate"], 0.0);
    assert_eq!(outcome.data["phases"][0]["label"], "burst");

    pipeline.shutdown().await;
}
