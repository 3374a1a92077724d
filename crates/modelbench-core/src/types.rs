//! Job input types: provider targets, test cases, execution configuration

use crate::validate::{ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Supported provider backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Openai,
    Anthropic,
    Google,
    Mistral,
    Groq,
    Together,
    Perplexity,
    Azure,
    Custom,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Openai => "openai",
            ProviderName::Anthropic => "anthropic",
            ProviderName::Google => "google",
            ProviderName::Mistral => "mistral",
            ProviderName::Groq => "groq",
            ProviderName::Together => "together",
            ProviderName::Perplexity => "perplexity",
            ProviderName::Azure => "azure",
            ProviderName::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selection of one backend: `(provider, model)` plus call policy.
///
/// `api_key_ref` is an opaque handle; the actual secret is resolved from the
/// environment by the wire layer and never stored or logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderTarget {
    pub provider_name: ProviderName,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_ref: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

impl ProviderTarget {
    pub fn new(provider_name: ProviderName, model_id: impl Into<String>) -> Self {
        Self {
            provider_name,
            model_id: model_id.into(),
            base_url: None,
            api_key_ref: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key_ref(mut self, api_key_ref: impl Into<String>) -> Self {
        self.api_key_ref = Some(api_key_ref.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require(!self.model_id.is_empty(), "model_id", "must not be empty");
        v.require(self.timeout_ms > 0, "timeout_ms", "must be > 0");
        if self.provider_name == ProviderName::Custom {
            v.require(
                self.base_url.is_some(),
                "base_url",
                "required for custom providers",
            );
        }
        v.finish()
    }
}

/// A single prompt to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub test_id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl TestCase {
    pub fn new(test_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require(!self.test_id.is_empty(), "test_id", "must not be empty");
        v.require(!self.prompt.is_empty(), "prompt", "must not be empty");
        if let Some(max_tokens) = self.max_tokens {
            v.require(max_tokens > 0, "max_tokens", "must be > 0");
        }
        if let Some(temperature) = self.temperature {
            v.require(
                (0.0..=2.0).contains(&temperature),
                "temperature",
                "must be within 0..2",
            );
        }
        if let Some(top_p) = self.top_p {
            v.require((0.0..=1.0).contains(&top_p), "top_p", "must be within 0..1");
        }
        v.finish()
    }
}

/// Recognized execution options, each with a default.
///
/// Unknown keys are rejected at deserialization so the canonical input
/// hash stays stable across harness versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub concurrency: usize,
    pub warm_up_runs: u32,
    pub iterations_per_test: u32,
    pub save_responses: bool,
    pub fail_fast: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_requests: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            warm_up_runs: 0,
            iterations_per_test: 1,
            save_responses: true,
            fail_fast: false,
            max_duration_ms: None,
            max_total_cost_usd: None,
            max_total_requests: None,
            request_delay_ms: None,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require(self.concurrency >= 1, "concurrency", "must be >= 1");
        v.require(
            self.iterations_per_test >= 1,
            "iterations_per_test",
            "must be >= 1",
        );
        if let Some(max_duration_ms) = self.max_duration_ms {
            v.require(max_duration_ms > 0, "max_duration_ms", "must be > 0");
        }
        if let Some(max_total_cost_usd) = self.max_total_cost_usd {
            v.require(
                max_total_cost_usd > 0.0,
                "max_total_cost_usd",
                "must be > 0",
            );
        }
        if let Some(max_total_requests) = self.max_total_requests {
            v.require(max_total_requests > 0, "max_total_requests", "must be > 0");
        }
        v.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ProviderName::Openai).unwrap(),
            "\"openai\""
        );
        assert_eq!(
            serde_json::to_string(&ProviderName::Anthropic).unwrap(),
            "\"anthropic\""
        );
    }

    #[test]
    fn target_defaults() {
        let target = ProviderTarget::new(ProviderName::Openai, "gpt-4o-mini");
        assert_eq!(target.timeout_ms, 30_000);
        assert_eq!(target.max_retries, 2);
        assert!(target.validate().is_ok());
    }

    #[test]
    fn custom_target_requires_base_url() {
        let target = ProviderTarget::new(ProviderName::Custom, "local-model");
        let err = target.validate().unwrap_err();
        assert_eq!(err.errors[0].path, "base_url");

        let target = target.with_base_url("http://localhost:8000");
        assert!(target.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let target = ProviderTarget::new(ProviderName::Openai, "gpt-4o-mini").with_timeout_ms(0);
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_case_bounds() {
        let mut test = TestCase::new("t1", "Say OK");
        assert!(test.validate().is_ok());

        test.temperature = Some(2.5);
        test.top_p = Some(1.5);
        let err = test.validate().unwrap_err();
        let paths: Vec<_> = err.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"temperature"));
        assert!(paths.contains(&"top_p"));
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let test = TestCase::new("t1", "");
        assert!(test.validate().is_err());
    }

    #[test]
    fn execution_config_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.iterations_per_test, 1);
        assert!(config.save_responses);
        assert!(!config.fail_fast);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let raw = r#"{"concurrency": 2, "warp_speed": true}"#;
        let parsed: Result<ExecutionConfig, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ExecutionConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
