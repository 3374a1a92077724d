//! Shared pieces of every connector: status classification, timing, and
//! outcome assembly.

use crate::{CallContext, InvokeResult};
use chrono::{DateTime, Utc};
use modelbench_catalog::{Catalog, ModelEntry};
use modelbench_core::{
    CallOutcome, Constraint, ErrorKind, FinishReason, ProviderTarget, TargetRef, TestCase,
};
use std::time::Instant;

/// Markers a 400 body carries when the prompt blew the context window.
const CONTEXT_MARKERS: &[&str] = &[
    "context length",
    "context_length",
    "maximum context",
    "too many tokens",
    "input is too long",
    "prompt is too long",
];

/// Markers of a provider-signaled safety block in an error body.
const SAFETY_MARKERS: &[&str] = &["content_filter", "content policy", "safety", "blocked"];

/// The mandatory HTTP status classification table.
pub fn classify_status(status: u16, body: &str) -> ErrorKind {
    let lowered = body.to_lowercase();
    match status {
        408 | 504 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        401 | 403 => ErrorKind::AuthenticationError,
        400 if CONTEXT_MARKERS.iter().any(|m| lowered.contains(m)) => ErrorKind::ContextExceeded,
        400 if SAFETY_MARKERS.iter().any(|m| lowered.contains(m)) => ErrorKind::ContentFiltered,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    }
}

/// Classification for transport-level failures.
pub fn classify_transport(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::ConnectionError
    } else if err.is_decode() || err.is_body() {
        ErrorKind::InvalidResponse
    } else {
        ErrorKind::ConnectionError
    }
}

/// Token counts as reported by the provider; `None` means absent from the
/// response body and triggers estimation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageCounts {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// Collects timing and pricing context for one invocation and assembles
/// the final outcome.
pub struct CallBuilder<'a> {
    target: &'a ProviderTarget,
    test: &'a TestCase,
    ctx: &'a CallContext,
    entry: ModelEntry,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl<'a> CallBuilder<'a> {
    pub fn start(
        target: &'a ProviderTarget,
        test: &'a TestCase,
        ctx: &'a CallContext,
        catalog: &Catalog,
    ) -> Self {
        Self {
            target,
            test,
            ctx,
            entry: catalog.entry(target.provider_name, &target.model_id),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn entry(&self) -> ModelEntry {
        self.entry
    }

    /// Streaming is used only when the caller wants TTFT and the catalog
    /// marks the model capable.
    pub fn should_stream(&self) -> bool {
        self.ctx.want_ttft && self.entry.supports_streaming
    }

    pub fn target_ref(&self) -> TargetRef {
        TargetRef {
            provider_name: self.target.provider_name,
            model_id: self.target.model_id.clone(),
        }
    }

    fn estimate(text: &str) -> u32 {
        (text.len() as u32).div_ceil(4)
    }

    pub fn success(
        self,
        content: String,
        finish_reason: FinishReason,
        usage: UsageCounts,
        ttft_ms: Option<u64>,
    ) -> InvokeResult {
        let latency_ms = self.started.elapsed().as_millis() as u64;
        let mut constraints = Vec::new();

        let prompt_tokens = usage
            .prompt_tokens
            .unwrap_or_else(|| Self::estimate(&self.test.prompt));
        let completion_tokens = match usage.completion_tokens {
            Some(n) => n,
            None => {
                constraints.push(Constraint::LowConfidenceResult);
                Self::estimate(&content)
            }
        };
        if self.entry.is_unknown() {
            constraints.push(Constraint::LowConfidenceResult);
        }

        let (input_cost_usd, output_cost_usd) =
            self.entry.cost_usd(prompt_tokens, completion_tokens);
        let tokens_per_second = if latency_ms > 0 && completion_tokens > 0 {
            Some(f64::from(completion_tokens) / (latency_ms as f64 / 1000.0))
        } else {
            None
        };

        let outcome = CallOutcome {
            target_ref: self.target_ref(),
            test_ref: self.test.test_id.clone(),
            iteration: self.ctx.iteration,
            success: true,
            content: self.ctx.save_response.then_some(content),
            finish_reason,
            latency_ms,
            ttft_ms,
            tokens_per_second,
            prompt_tokens,
            completion_tokens,
            input_cost_usd,
            output_cost_usd,
            error_kind: None,
            error_message: None,
            started_at: self.started_at,
            completed_at: Utc::now(),
        };

        InvokeResult {
            outcome,
            constraints,
            retry_after: None,
        }
    }

    pub fn failure(self, kind: ErrorKind, message: impl Into<String>) -> InvokeResult {
        let latency_ms = self.started.elapsed().as_millis() as u64;
        let outcome = CallOutcome {
            latency_ms,
            started_at: self.started_at,
            completed_at: Utc::now(),
            ..CallOutcome::failure(
                self.target_ref(),
                self.test.test_id.clone(),
                self.ctx.iteration,
                kind,
                message,
            )
        };
        InvokeResult::new(outcome)
    }
}
