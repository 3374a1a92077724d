//! Google (Gemini) connector

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

pub struct GoogleConnector {
    client: Client,
    catalog: &'static Catalog,
}

impl GoogleConnector {
    pub fn new(client: Client, catalog: &'static Catalog) -> Self {
        Self { client, catalog }
    }

    fn request_body(test: &TestCase) -> Value {
        let mut generation_config = json!({});
        if let Some(max_tokens) = test.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temperature) = test.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(top_p) = test.top_p {
            generation_config["topP"] = json!(top_p);
        }
        if let Some(ref stop) = test.stop_sequences {
            generation_config["stopSequences"] = json!(stop);
        }
        json!({
            "contents": [{"role": "user", "parts": [{"text": test.prompt}]}],
            "generationConfig": generation_config,
        })
    }

    fn finish_reason(raw: Option<&str>) -> FinishReason {
        match raw {
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("PROHIBITED_CONTENT") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }

    fn usage_from(json: &Value) -> UsageCounts {
        UsageCounts {
            prompt_tokens: json["usageMetadata"]["promptTokenCount"]
                .as_u64()
                .map(|n| n as u32),
            completion_tokens: json["usageMetadata"]["candidatesTokenCount"]
                .as_u64()
                .map(|n| n as u32),
        }
    }

    fn candidate_text(candidate: &Value) -> String {
        candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn parse_response(builder: CallBuilder<'_>, body: Value) -> InvokeResult {
        if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
            return builder.failure(
                ErrorKind::ContentFiltered,
                format!("prompt blocked: {}", reason),
            );
        }
        let Some(candidate) = body["candidates"].get(0) else {
            return builder.failure(ErrorKind::InvalidResponse, "response has no candidates");
        };
        let finish = Self::finish_reason(candidate["finishReason"].as_str());
        let content = Self::candidate_text(candidate);
        if content.is_empty() && finish == FinishReason::ContentFilter {
            return builder.failure(ErrorKind::ContentFiltered, "candidate blocked by safety filter");
        }
        if content.is_empty() && candidate["content"]["parts"].is_null() {
            return builder.failure(ErrorKind::InvalidResponse, "candidate has no content parts");
        }
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
                Err(err) => {
                    return builder.failure(
                        ErrorKind::InvalidResponse,
                        format!("unparseable stream chunk: {}", err),
                    );
                }
            };
            if let Some(candidate) = chunk["candidates"].get(0) {
                let text = Self::candidate_text(candidate);
                if !text.is_empty() {
                    if ttft_ms.is_none() {
                        ttft_ms = Some(started.elapsed().as_millis() as u64);
                    }
                    content.push_str(&text);
                }
                if let Some(reason) = candidate["finishReason"].as_str() {
                    finish = Self::finish_reason(Some(reason));
                }
            }
            let chunk_usage = Self::usage_from(&chunk);
            if chunk_usage.prompt_tokens.is_some() {
                usage = chunk_usage;
            }
        }

        if finish == FinishReason::ContentFilter && content.is_empty() {
            return builder.failure(ErrorKind::ContentFiltered, "stream blocked by safety filter");
        }
        builder.success(content, finish, usage, ttft_ms)
    }
}

#[async_trait]
impl Connector for GoogleConnector {
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
        let url = if stream {
            format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                base_url.trim_end_matches('/'),
                target.model_id
            )
        } else {
            format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                target.model_id
            )
        };
        debug!(%url, model = %target.model_id, stream, "dispatching generateContent request");

        let started = Instant::now();
        let response = match self
            .client
            .post(&url)
            .timeout(ctx.timeout)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &api_key)
            .json(&Self::request_body(test))
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

    #[test]
    fn request_body_shape() {
        let mut test = TestCase::new("t1", "Say OK");
        test.max_tokens = Some(32);
        test.top_p = Some(0.9);
        let body = GoogleConnector::request_body(&test);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Say OK");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 32);
        assert_eq!(body["generationConfig"]["topP"], 0.9);
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(GoogleConnector::finish_reason(Some("STOP")), FinishReason::Stop);
        assert_eq!(
            GoogleConnector::finish_reason(Some("MAX_TOKENS")),
            FinishReason::Length
        );
        assert_eq!(
            GoogleConnector::finish_reason(Some("SAFETY")),
            FinishReason::ContentFilter
        );
    }

    #[test]
    fn usage_reads_gemini_field_names() {
        let body = json!({"usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 4}});
        let usage = GoogleConnector::usage_from(&body);
        assert_eq!(usage.prompt_tokens, Some(9));
        assert_eq!(usage.completion_tokens, Some(4));
    }

    #[test]
    fn parts_concatenate() {
        let candidate = json!({
            "content": {"parts": [{"text": "Hello "}, {"text": "world"}]},
            "finishReason": "STOP"
        });
        assert_eq!(GoogleConnector::candidate_text(&candidate), "Hello world");
    }
}
