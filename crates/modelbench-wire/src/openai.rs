//! OpenAI-compatible connector
//!
//! Serves every target speaking the `/v1/chat/completions` dialect:
//! openai, groq, together, perplexity, mistral, azure, and custom
//! endpoints.

use crate::common::{CallBuilder, UsageCounts, classify_status, classify_transport};
use crate::secrets::resolve_api_key;
use crate::{CallContext, Connector, InvokeResult, default_base_url, parse_retry_after};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use modelbench_catalog::Catalog;
use modelbench_core::{ErrorKind, FinishReason, ProviderTarget, TestCase};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct OpenAiCompatibleConnector {
    client: Client,
    catalog: &'static Catalog,
}

impl OpenAiCompatibleConnector {
    pub fn new(client: Client, catalog: &'static Catalog) -> Self {
        Self { client, catalog }
    }

    fn request_body(target: &ProviderTarget, test: &TestCase, stream: bool) -> Value {
        let mut body = json!({
            "model": target.model_id,
            "messages": [{"role": "user", "content": test.prompt}],
        });
        if let Some(max_tokens) = test.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = test.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = test.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(ref stop) = test.stop_sequences {
            body["stop"] = json!(stop);
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({"include_usage": true});
        }
        body
    }

    fn finish_reason(raw: Option<&str>) -> FinishReason {
        match raw {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("tool_calls") => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        }
    }

    fn usage_from(json: &Value) -> UsageCounts {
        UsageCounts {
            prompt_tokens: json["usage"]["prompt_tokens"]
                .as_u64()
                .map(|n| n as u32),
            completion_tokens: json["usage"]["completion_tokens"]
                .as_u64()
                .map(|n| n as u32),
        }
    }

    fn parse_response(builder: CallBuilder<'_>, body: Value) -> InvokeResult {
        let Some(choice) = body["choices"].get(0) else {
            return builder.failure(ErrorKind::InvalidResponse, "response has no choices");
        };
        if choice["finish_reason"].as_str() == Some("content_filter")
            && choice["message"]["content"].is_null()
        {
            return builder.failure(ErrorKind::ContentFiltered, "completion blocked by safety filter");
        }
        let Some(content) = choice["message"]["content"].as_str() else {
            return builder.failure(
                ErrorKind::InvalidResponse,
                "missing choices[0].message.content",
            );
        };
        let finish = Self::finish_reason(choice["finish_reason"].as_str());
        builder.success(content.to_string(), finish, Self::usage_from(&body), None)
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
            if event.data == "[DONE]" {
                break;
            }
            let chunk: Value = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(err) => {
                    return builder.failure(
                        ErrorKind::InvalidResponse,
                        format!("unparseable stream chunk: {}", err),
                    );
                }
            };
            if let Some(delta) = chunk["choices"][0]["delta"]["content"].as_str() {
                if !delta.is_empty() && ttft_ms.is_none() {
                    ttft_ms = Some(started.elapsed().as_millis() as u64);
                }
                content.push_str(delta);
            }
            if let Some(reason) = chunk["choices"][0]["finish_reason"].as_str() {
                finish = Self::finish_reason(Some(reason));
            }
            let chunk_usage = Self::usage_from(&chunk);
            if chunk_usage.prompt_tokens.is_some() {
                usage = chunk_usage;
            }
        }

        if content.is_empty() && finish == FinishReason::ContentFilter {
            return builder.failure(ErrorKind::ContentFiltered, "stream blocked by safety filter");
        }
        builder.success(content, finish, usage, ttft_ms)
    }
}

/// Keep error messages bounded; provider bodies can be large.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 240;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &body[..cut])
    }
}

/// Rate-limit hint from headers, falling back to a `retry_after` field in
/// the error body.
pub(crate) fn retry_after_hint(headers: &reqwest::header::HeaderMap, body: &str) -> Option<Duration> {
    let from_header = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let from_body = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v["retry_after"]
            .as_u64()
            .or_else(|| v["error"]["retry_after"].as_u64())
    });
    from_header.or(from_body).map(Duration::from_secs)
}

#[async_trait]
impl Connector for OpenAiCompatibleConnector {
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
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        debug!(%url, model = %target.model_id, stream, "dispatching chat completion");

        let started = Instant::now();
        let mut request = self
            .client
            .post(&url)
            .timeout(ctx.timeout)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(target, test, stream));
        if !api_key.is_empty() {
            request = request.bearer_auth(&api_key);
        }

        let response = match request.send().await {
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
