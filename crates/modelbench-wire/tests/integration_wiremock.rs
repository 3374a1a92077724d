//! Integration tests for the wire connectors using wiremock
//!
//! These mock the provider APIs to verify request shapes, response
//! decoding, streaming accumulation, and the error classification table.

use modelbench_catalog::Catalog;
use modelbench_core::{ErrorKind, FinishReason, ProviderName, ProviderTarget, TestCase};
use modelbench_wire::{
    CallContext, Connector, HttpClientConfig, create_client,
    anthropic::AnthropicConnector, google::GoogleConnector, openai::OpenAiCompatibleConnector,
};
use serial_test::serial;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx() -> CallContext {
    CallContext {
        timeout: Duration::from_secs(5),
        want_ttft: false,
        save_response: true,
        iteration: 0,
    }
}

fn openai_connector() -> OpenAiCompatibleConnector {
    let client = create_client(&HttpClientConfig::default()).unwrap();
    OpenAiCompatibleConnector::new(client, Catalog::builtin())
}

fn openai_target(server: &MockServer) -> ProviderTarget {
    ProviderTarget::new(ProviderName::Openai, "gpt-4o-mini").with_base_url(server.uri())
}

fn set_key(name: &str, value: &str) {
    // SAFETY: tests are serialized; nothing else touches the env concurrently
    unsafe { std::env::set_var(name, value) };
}

#[tokio::test]
#[serial]
async fn openai_success_parses_content_and_usage() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "Say OK"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-123",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "OK"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        })))
        .mount(&server)
        .await;

    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert!(result.outcome.success);
    assert_eq!(result.outcome.content.as_deref(), Some("OK"));
    assert_eq!(result.outcome.prompt_tokens, 5);
    assert_eq!(result.outcome.completion_tokens, 1);
    assert_eq!(result.outcome.finish_reason, FinishReason::Stop);
    assert!(result.outcome.input_cost_usd > 0.0);
    assert!(result.constraints.is_empty());
}

#[tokio::test]
#[serial]
async fn openai_500_classifies_as_server_error() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert!(!result.outcome.success);
    assert_eq!(result.outcome.error_kind, Some(ErrorKind::ServerError));
    assert!(result.outcome.error_message.unwrap().contains("HTTP 500"));
}

#[tokio::test]
#[serial]
async fn openai_429_carries_retry_after_hint() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert_eq!(result.outcome.error_kind, Some(ErrorKind::RateLimited));
    assert_eq!(result.retry_after, Some(Duration::from_secs(2)));
}

#[tokio::test]
#[serial]
async fn openai_401_is_authentication_error() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert_eq!(
        result.outcome.error_kind,
        Some(ErrorKind::AuthenticationError)
    );
}

#[tokio::test]
#[serial]
async fn openai_400_with_context_marker_is_context_exceeded() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"message": "This model's maximum context length is 128000 tokens"}
        })))
        .mount(&server)
        .await;

    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert_eq!(result.outcome.error_kind, Some(ErrorKind::ContextExceeded));
}

#[tokio::test]
#[serial]
async fn openai_missing_content_is_invalid_response() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant"}}]
        })))
        .mount(&server)
        .await;

    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert_eq!(result.outcome.error_kind, Some(ErrorKind::InvalidResponse));
}

#[tokio::test]
#[serial]
async fn openai_missing_usage_estimates_tokens() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "12345678"},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert!(result.outcome.success);
    // ceil(8 / 4) = 2
    assert_eq!(result.outcome.completion_tokens, 2);
    assert!(
        result
            .constraints
            .contains(&modelbench_core::Constraint::LowConfidenceResult)
    );
}

#[tokio::test]
#[serial]
async fn openai_client_deadline_is_timeout() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(serde_json::json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let fast = CallContext {
        timeout: Duration::from_millis(100),
        ..ctx()
    };
    let result = openai_connector()
        .invoke(&openai_target(&server), &TestCase::new("t1", "Say OK"), &fast)
        .await;

    assert_eq!(result.outcome.error_kind, Some(ErrorKind::Timeout));
}

#[tokio::test]
#[serial]
async fn openai_streaming_records_ttft_and_accumulates() {
    let server = MockServer::start().await;
    set_key("OPENAI_API_KEY", "test-key");

    let sse = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(sse, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let streaming = CallContext {
        want_ttft: true,
        ..ctx()
    };
    let result = openai_connector()
        .invoke(
            &openai_target(&server),
            &TestCase::new("t1", "Say OK"),
            &streaming,
        )
        .await;

    assert!(result.outcome.success);
    assert_eq!(result.outcome.content.as_deref(), Some("Hello"));
    assert!(result.outcome.ttft_ms.is_some());
    assert_eq!(result.outcome.prompt_tokens, 5);
    assert_eq!(result.outcome.completion_tokens, 2);
}

#[tokio::test]
#[serial]
async fn anthropic_success_with_version_header() {
    let server = MockServer::start().await;
    set_key("ANTHROPIC_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "msg_123",
            "content": [{"type": "text", "text": "OK"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 9, "output_tokens": 1}
        })))
        .mount(&server)
        .await;

    let client = create_client(&HttpClientConfig::default()).unwrap();
    let connector = AnthropicConnector::new(client, Catalog::builtin());
    let target = ProviderTarget::new(ProviderName::Anthropic, "claude-3-5-haiku-20241022")
        .with_base_url(server.uri());
    let result = connector
        .invoke(&target, &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert!(result.outcome.success);
    assert_eq!(result.outcome.content.as_deref(), Some("OK"));
    assert_eq!(result.outcome.prompt_tokens, 9);
    assert_eq!(result.outcome.completion_tokens, 1);
}

#[tokio::test]
#[serial]
async fn google_success_with_goog_header() {
    let server = MockServer::start().await;
    set_key("GOOGLE_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "OK"}], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 1}
        })))
        .mount(&server)
        .await;

    let client = create_client(&HttpClientConfig::default()).unwrap();
    let connector = GoogleConnector::new(client, Catalog::builtin());
    let target =
        ProviderTarget::new(ProviderName::Google, "gemini-1.5-flash").with_base_url(server.uri());
    let result = connector
        .invoke(&target, &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert!(result.outcome.success);
    assert_eq!(result.outcome.content.as_deref(), Some("OK"));
    assert_eq!(result.outcome.prompt_tokens, 4);
}

#[tokio::test]
#[serial]
async fn google_safety_block_is_content_filtered() {
    let server = MockServer::start().await;
    set_key("GOOGLE_API_KEY", "test-key");

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let client = create_client(&HttpClientConfig::default()).unwrap();
    let connector = GoogleConnector::new(client, Catalog::builtin());
    let target =
        ProviderTarget::new(ProviderName::Google, "gemini-1.5-flash").with_base_url(server.uri());
    let result = connector
        .invoke(&target, &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert_eq!(result.outcome.error_kind, Some(ErrorKind::ContentFiltered));
}

#[tokio::test]
#[serial]
async fn unresolvable_key_short_circuits_without_a_request() {
    let server = MockServer::start().await;
    // No mock mounted: a request reaching the server would 404 and the
    // classification below would differ
    unsafe { std::env::remove_var("TOGETHER_API_KEY") };

    let client = create_client(&HttpClientConfig::default()).unwrap();
    let connector = OpenAiCompatibleConnector::new(client, Catalog::builtin());
    let target = ProviderTarget::new(ProviderName::Together, "meta-llama/Llama-3.3-70B-Instruct-Turbo")
        .with_base_url(server.uri());
    let result = connector
        .invoke(&target, &TestCase::new("t1", "Say OK"), &ctx())
        .await;

    assert_eq!(
        result.outcome.error_kind,
        Some(ErrorKind::AuthenticationError)
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}
