//! Anthropic connector

use crate::common::{CallBuilder, UsageCounts, classify_status, classify_transport};
use crate::openai::{retry_after_hint, truncate_body};
use crate::secrets::resolve_api_key;
use crate::{CallContext, Connector, InvokeResult, default_base_url};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use modelbench_catalog::Catalog;
use modelbench_core::{ErrorKind, FinishReason, ProviderTarget, TestCase};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic requires an explicit output ceiling on every request.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicConnector {
    client: Client,
    catalog: &'static Catalog,
}

impl AnthropicConnector {
    pub fn new(client: Client, catalog: &'static Catalog) -> Self {
        Self { client, catalog }
    }

    fn request_body(target: &ProviderTarget, test: &TestCase, stream: bool) -> Value {
        let mut body = json!({
            "model": target.model_id,
            "max_tokens": test.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{"role": "user", "content": test.prompt}],
        });
        if let Some(temperature) = test.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = test.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(ref stop) = test.stop_sequences {
            body["stop_sequences"] = json!(stop);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn finish_reason(raw: Option<&str>) -> FinishReason {
        match raw {
            Some("max_tokens") => FinishReason::Length,
            Some("refusal") => FinishReason::ContentFilter,
            Some("tool_use") => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        }
    }

    fn usage_from(json: &Value) -> UsageCounts {
        UsageCounts {
            prompt_tokens: json["usage"]["input_tokens"].as_u64().map(|n| n as u32),
            completion_tokens: json["usage"]["output_tokens"].as_u64().map(|n| n as u32),
        }
    }

    fn parse_response(builder: CallBuilder<'_>, body: Value) -> InvokeResult {
        if body["stop_reason"].as_str() == Some("refusal") {
            return builder.failure(ErrorKind::ContentFiltered, "completion refused by model");
        }
        let Some(blocks) = body["content"].as_array() else {
            return builder.failure(ErrorKind::InvalidResponse, "response has no content blocks");
        };
        let content: String = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();
        if content.is_empty() && blocks.iter().all(|b| b["type"] != "text") {
            return builder.failure(ErrorKind::InvalidResponse, "no text content block");
        }
        let finish = Self::finish_reason(body["stop_reason"].as_str());
        builder.success(content, finish, Self::usage_from(&body), None)
    }

    async fn consume_stream(
        builder: CallBuilder<'_>,
        response: reqwest::Response,
        started: Instant,
    ) -> InvokeResult {
        let mut stream = response.bytes_stream().eventsource();
        let mut content = String::new();
        let mut ttft_ms: Option<u64> = None;
        let mut finish = FinishReason::Stop;
        let mut usage = UsageCounts::default();

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    return builder.failure(
                        ErrorKind::InvalidResponse,
                        format!("stream error: {}", err),
                    );
                }
            };
            let chunk: Value = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(_) => continue, // ping events carry no JSON payload
            };
            match chunk["type"].as_str() {
                Some("message_start") => {
                    usage.prompt_tokens = chunk["message"]["usage"]["input_tokens"]
                        .as_u64()
                        .map(|n| n as u32);
                }
                Some("content_block_delta") => {
                    if let Some(text) = chunk["delta"]["text"].as_str() {
                        if !text.is_empty() && ttft_ms.is_none() {
                            ttft_ms = Some(started.elapsed().as_millis() as u64);
                        }
                        content.push_str(text);
                    }
                }
                Some("message_delta") => {
                    if let Some(reason) = chunk["delta"]["stop_reason"].as_str() {
                        finish = Self::finish_reason(Some(reason));
                    }
                    if let Some(output) = chunk["usage"]["output_tokens"].as_u64() {
                        usage.completion_tokens = Some(output as u32);
                    }
                }
                Some("message_stop") => break,
                Some("error") => {
                    let message = chunk["error"]["message"]
                        .as_str()
                        .unwrap_or("provider stream error");
                    return builder.failure(ErrorKind::ServerError, message.to_string());
                }
                _ => {}
            }
        }

        if finish == FinishReason::ContentFilter && content.is_empty() {
            return builder.failure(ErrorKind::ContentFiltered, "stream refused by model");
        }
        builder.success(content, finish, usage, ttft_ms)
    }
}

#[async_trait]
impl Connector for AnthropicConnector {
    async fn invoke(
        &self,
        target: &ProviderTarget,
        test: &TestCase,
        ctx: &CallContext,
    ) -> InvokeResult {
        let builder = CallBuilder::start(target, test, ctx, self.catalog);
        let Some(api_key) = resolve_api_key(target) else {
            return builder.failure(
                ErrorKind::AuthenticationError,
                "API key reference could not be resolved",
            );
        };

        let stream = builder.should_stream();
        let base_url = target
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(target.provider_name).to_string());
        let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
        debug!(%url, model = %target.model_id, stream, "dispatching messages request");

        let started = Instant::now();
        let response = match self
            .client
            .post(&url)
            .timeout(ctx.timeout)
            .header("Content-Type", "application/json")
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&Self::request_body(target, test, stream))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return builder.failure(classify_transport(&err), err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let kind = classify_status(status.as_u16(), &body);
            let mut result = builder.failure(
                kind,
                format!("HTTP {}: {}", status.as_u16(), truncate_body(&body)),
            );
            if kind == ErrorKind::RateLimited {
                result.retry_after = retry_after_hint(&headers, &body);
            }
            return result;
        }

        if stream {
            Self::consume_stream(builder, response, started).await
        } else {
            match response.json::<Value>().await {
                Ok(body) => Self::parse_response(builder, body),
                Err(err) => builder.failure(
                    ErrorKind::InvalidResponse,
                    format!("unparseable response body: {}", err),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelbench_core::ProviderName;

    #[test]
    fn request_body_always_carries_max_tokens() {
        let target = ProviderTarget::new(ProviderName::Anthropic, "claude-3-5-haiku-20241022");
        let test = TestCase::new("t1", "Say OK");
        let body = AnthropicConnector::request_body(&target, &test, false);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"][0]["role"], "user");

        let mut capped = test.clone();
        capped.max_tokens = Some(64);
        let body = AnthropicConnector::request_body(&target, &capped, true);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(
            AnthropicConnector::finish_reason(Some("end_turn")),
            FinishReason::Stop
        );
        assert_eq!(
            AnthropicConnector::finish_reason(Some("max_tokens")),
            FinishReason::Length
        );
        assert_eq!(
            AnthropicConnector::finish_reason(Some("refusal")),
            FinishReason::ContentFilter
        );
        assert_eq!(
            AnthropicConnector::finish_reason(Some("stop_sequence")),
            FinishReason::Stop
        );
    }

    #[test]
    fn usage_reads_anthropic_field_names() {
        let body = json!({"usage": {"input_tokens": 12, "output_tokens": 7}});
        let usage = AnthropicConnector::usage_from(&body);
        assert_eq!(usage.prompt_tokens, Some(12));
        assert_eq!(usage.completion_tokens, Some(7));
    }
}
