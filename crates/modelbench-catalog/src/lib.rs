//! Pricing & model catalog
//!
//! A read-mostly mapping from `(provider, model)` to unit prices and
//! capability flags. The catalog is built once at startup and immutable
//! afterwards. Lookups for unknown models never fail: they return the
//! zero entry, which records cost as 0 and surfaces as a
//! `low_confidence_result` constraint on the decision.

use modelbench_core::ProviderName;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-model pricing and capability entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelEntry {
    pub input_usd_per_1k_tokens: f64,
    pub output_usd_per_1k_tokens: f64,
    /// 0 = unknown
    pub context_window_tokens: u32,
    pub supports_streaming: bool,
    pub supports_vision: bool,
}

impl ModelEntry {
    /// The entry returned for models the catalog does not know.
    pub const UNKNOWN: ModelEntry = ModelEntry {
        input_usd_per_1k_tokens: 0.0,
        output_usd_per_1k_tokens: 0.0,
        context_window_tokens: 0,
        supports_streaming: false,
        supports_vision: false,
    };

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    /// Split input/output cost in USD for a token count pair.
    pub fn cost_usd(&self, prompt_tokens: u32, completion_tokens: u32) -> (f64, f64) {
        (
            f64::from(prompt_tokens) / 1000.0 * self.input_usd_per_1k_tokens,
            f64::from(completion_tokens) / 1000.0 * self.output_usd_per_1k_tokens,
        )
    }
}

/// Immutable catalog of known models.
pub struct Catalog {
    entries: HashMap<(ProviderName, String), ModelEntry>,
}

impl Catalog {
    /// Build a catalog from explicit entries.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (ProviderName, String, ModelEntry)>,
    ) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(provider, model, entry)| ((provider, model), entry))
                .collect(),
        }
    }

    /// The built-in table of well-known models.
    pub fn builtin() -> &'static Catalog {
        static CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog::from_entries(builtin_entries()));
        &CATALOG
    }

    /// Look up a model; unknown models yield [`ModelEntry::UNKNOWN`].
    pub fn entry(&self, provider: ProviderName, model_id: &str) -> ModelEntry {
        self.entries
            .get(&(provider, model_id.to_string()))
            .copied()
            .unwrap_or_else(|| {
                tracing::debug!(provider = %provider, model_id, "model not in catalog, pricing as zero");
                ModelEntry::UNKNOWN
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry(
    input: f64,
    output: f64,
    context: u32,
    streaming: bool,
    vision: bool,
) -> ModelEntry {
    ModelEntry {
        input_usd_per_1k_tokens: input,
        output_usd_per_1k_tokens: output,
        context_window_tokens: context,
        supports_streaming: streaming,
        supports_vision: vision,
    }
}

fn builtin_entries() -> Vec<(ProviderName, String, ModelEntry)> {
    use ProviderName::*;
    let rows: Vec<(ProviderName, &str, ModelEntry)> = vec![
        // OpenAI
        (Openai, "gpt-4o", entry(0.0025, 0.01, 128_000, true, true)),
        (Openai, "gpt-4o-mini", entry(0.00015, 0.0006, 128_000, true, true)),
        (Openai, "gpt-4-turbo", entry(0.01, 0.03, 128_000, true, true)),
        (Openai, "gpt-3.5-turbo", entry(0.0005, 0.0015, 16_385, true, false)),
        (Openai, "o1-mini", entry(0.0011, 0.0044, 128_000, true, false)),
        // Anthropic
        (Anthropic, "claude-3-5-sonnet-20241022", entry(0.003, 0.015, 200_000, true, true)),
        (Anthropic, "claude-3-5-haiku-20241022", entry(0.0008, 0.004, 200_000, true, false)),
        (Anthropic, "claude-3-opus-20240229", entry(0.015, 0.075, 200_000, true, true)),
        // Google
        (Google, "gemini-1.5-pro", entry(0.00125, 0.005, 2_097_152, true, true)),
        (Google, "gemini-1.5-flash", entry(0.000075, 0.0003, 1_048_576, true, true)),
        (Google, "gemini-2.0-flash", entry(0.0001, 0.0004, 1_048_576, true, true)),
        // Mistral
        (Mistral, "mistral-large-latest", entry(0.002, 0.006, 128_000, true, false)),
        (Mistral, "mistral-small-latest", entry(0.0002, 0.0006, 32_000, true, false)),
        // Groq
        (Groq, "llama-3.1-8b-instant", entry(0.00005, 0.00008, 131_072, true, false)),
        (Groq, "llama-3.3-70b-versatile", entry(0.00059, 0.00079, 131_072, true, false)),
        // Together
        (Together, "meta-llama/Llama-3.3-70B-Instruct-Turbo", entry(0.00088, 0.00088, 131_072, true, false)),
        // Perplexity
        (Perplexity, "sonar", entry(0.001, 0.001, 127_072, true, false)),
        (Perplexity, "sonar-pro", entry(0.003, 0.015, 200_000, true, false)),
        // Azure mirrors OpenAI list prices
        (Azure, "gpt-4o", entry(0.0025, 0.01, 128_000, true, true)),
        (Azure, "gpt-4o-mini", entry(0.00015, 0.0006, 128_000, true, true)),
    ];
    rows.into_iter()
        .map(|(p, m, e)| (p, m.to_string(), e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_prices() {
        let entry = Catalog::builtin().entry(ProviderName::Openai, "gpt-4o-mini");
        assert!(!entry.is_unknown());
        assert!(entry.supports_streaming);
        let (input, output) = entry.cost_usd(1000, 1000);
        assert!((input - 0.00015).abs() < 1e-12);
        assert!((output - 0.0006).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_costs_zero_and_does_not_fail() {
        let entry = Catalog::builtin().entry(ProviderName::Openai, "gpt-99-ultra");
        assert!(entry.is_unknown());
        assert_eq!(entry.cost_usd(5000, 5000), (0.0, 0.0));
        assert!(!entry.supports_streaming);
        assert_eq!(entry.context_window_tokens, 0);
    }

    #[test]
    fn cost_scales_per_thousand_tokens() {
        let entry = Catalog::builtin().entry(ProviderName::Anthropic, "claude-3-5-haiku-20241022");
        let (input, output) = entry.cost_usd(500, 250);
        assert!((input - 0.0004).abs() < 1e-12);
        assert!((output - 0.001).abs() < 1e-12);
    }

    #[test]
    fn custom_catalog_from_entries() {
        let catalog = Catalog::from_entries(vec![(
            ProviderName::Custom,
            "local-llama".to_string(),
            ModelEntry {
                input_usd_per_1k_tokens: 0.0,
                output_usd_per_1k_tokens: 0.0,
                context_window_tokens: 8192,
                supports_streaming: true,
                supports_vision: false,
            },
        )]);
        assert_eq!(catalog.len(), 1);
        let entry = catalog.entry(ProviderName::Custom, "local-llama");
        assert!(entry.supports_streaming);
        // Zero-priced but known: context window distinguishes it from UNKNOWN
        assert!(!entry.is_unknown());
    }

    #[test]
    fn builtin_covers_every_streaming_dialect() {
        let catalog = Catalog::builtin();
        assert!(catalog.len() >= 15);
        for provider in [
            ProviderName::Openai,
            ProviderName::Anthropic,
            ProviderName::Google,
            ProviderName::Groq,
        ] {
            assert!(
                catalog
                    .entries
                    .keys()
                    .any(|(p, _)| *p == provider),
                "missing provider {provider}"
            );
        }
    }
}
