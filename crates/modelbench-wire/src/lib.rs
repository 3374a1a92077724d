//! ModelBench wire adapters
//!
//! Per-provider request encoders, response decoders, streaming chunk
//! parsers, and the mandatory error classifier. Every provider maps onto
//! the same capability surface: `invoke` one `(target, test)` pair and get
//! back a fully classified [`CallOutcome`].
//!
//! The adapter layer never retries; retry policy lives in the executor so
//! budget bookkeeping stays centralized.

pub mod anthropic;
pub mod client;
pub mod common;
pub mod google;
pub mod openai;
pub mod retry_after;
pub mod secrets;

pub use client::{HttpClientConfig, create_client};
pub use retry_after::parse_retry_after;

use async_trait::async_trait;
use modelbench_core::{CallOutcome, Constraint, ProviderName, ProviderTarget, TestCase};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, WireError>;

/// Wire dialect a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAiCompatible,
    Anthropic,
    Google,
}

/// Which dialect serves a provider. The OpenAI-compatible dialect covers
/// openai, groq, together, perplexity, mistral, azure, and custom targets.
pub fn dialect_for(provider: ProviderName) -> Dialect {
    match provider {
        ProviderName::Anthropic => Dialect::Anthropic,
        ProviderName::Google => Dialect::Google,
        _ => Dialect::OpenAiCompatible,
    }
}

/// Default API root per provider, overridable via `ProviderTarget::base_url`.
pub fn default_base_url(provider: ProviderName) -> &'static str {
    match provider {
        ProviderName::Openai | ProviderName::Azure | ProviderName::Custom => {
            "https://api.openai.com"
        }
        ProviderName::Anthropic => "https://api.anthropic.com",
        ProviderName::Google => "https://generativelanguage.googleapis.com",
        ProviderName::Mistral => "https://api.mistral.ai",
        ProviderName::Groq => "https://api.groq.com/openai",
        ProviderName::Together => "https://api.together.xyz",
        ProviderName::Perplexity => "https://api.perplexity.ai",
    }
}

/// Per-call context the executor hands down.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Effective deadline: `min(per-call timeout, job deadline, target deadline)`
    pub timeout: Duration,
    /// Stream the response to capture time-to-first-token when the model
    /// supports it
    pub want_ttft: bool,
    /// Keep the response body on the outcome
    pub save_response: bool,
    pub iteration: u32,
}

/// What one invocation produced: the outcome itself plus annotations the
/// executor folds into the job's `constraints_applied` set and uses to
/// schedule retries.
#[derive(Debug, Clone)]
pub struct InvokeResult {
    pub outcome: CallOutcome,
    pub constraints: Vec<Constraint>,
    /// Rate-limit hint from a 429, honored by the executor's backoff
    pub retry_after: Option<Duration>,
}

impl InvokeResult {
    pub fn new(outcome: CallOutcome) -> Self {
        Self {
            outcome,
            constraints: Vec::new(),
            retry_after: None,
        }
    }
}

/// Uniform capability surface over vendor wire protocols.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Invoke one `(target, test)` pair. Never fails at the call level:
    /// every error is classified into the outcome.
    async fn invoke(
        &self,
        target: &ProviderTarget,
        test: &TestCase,
        ctx: &CallContext,
    ) -> InvokeResult;

    /// Rough token estimate used when the provider omits usage counts.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.len() as u32).div_ceil(4)
    }
}

/// Build the connector serving a target's dialect.
pub fn connector_for(
    target: &ProviderTarget,
    catalog: &'static modelbench_catalog::Catalog,
    client: reqwest::Client,
) -> Arc<dyn Connector> {
    match dialect_for(target.provider_name) {
        Dialect::OpenAiCompatible => {
            Arc::new(openai::OpenAiCompatibleConnector::new(client, catalog))
        }
        Dialect::Anthropic => Arc::new(anthropic::AnthropicConnector::new(client, catalog)),
        Dialect::Google => Arc::new(google::GoogleConnector::new(client, catalog)),
    }
}
