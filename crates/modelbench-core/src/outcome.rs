//! Call outcomes: the result of one `(target, test, iteration)` invocation

use crate::types::ProviderName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a completion stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
}

/// Classified failure cause, present iff `!success`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    ContextExceeded,
    InvalidResponse,
    ServerError,
    ConnectionError,
    AuthenticationError,
    ContentFiltered,
    Unknown,
}

impl ErrorKind {
    /// Whether the executor may retry a call that failed this way.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::ServerError
                | ErrorKind::ConnectionError
        )
    }
}

/// Identifies the `(provider, model)` a call was made against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetRef {
    pub provider_name: ProviderName,
    pub model_id: String,
}

impl TargetRef {
    pub fn group_key(&self) -> String {
        format!("{}/{}", self.provider_name, self.model_id)
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_name, self.model_id)
    }
}

/// Result of a single invocation. Immutable once written: the executor
/// publishes each outcome exactly once through the outcome channel and no
/// task mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallOutcome {
    pub target_ref: TargetRef,
    pub test_ref: String,
    pub iteration: u32,
    pub success: bool,
    /// Present iff `save_responses` and `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    /// Total wall time of the call
    pub latency_ms: u64,
    /// Time to first token, if the call streamed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CallOutcome {
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.input_cost_usd + self.output_cost_usd
    }

    /// Failed outcome skeleton; the executor fills timing before publishing.
    pub fn failure(
        target_ref: TargetRef,
        test_ref: impl Into<String>,
        iteration: u32,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            target_ref,
            test_ref: test_ref.into(),
            iteration,
            success: false,
            content: None,
            finish_reason: FinishReason::Error,
            latency_ms: 0,
            ttft_ms: None,
            tokens_per_second: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            input_cost_usd: 0.0,
            output_cost_usd: 0.0,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            started_at: now,
            completed_at: now,
        }
    }
}
