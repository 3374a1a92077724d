//! API key resolution
//!
//! Targets carry an opaque `api_key_ref`, never the secret itself. The
//! handle resolves to an environment variable named `<REF>_API_KEY`
//! (uppercased, hyphens mapped to underscores). Resolved keys are used for
//! the outgoing request only: never logged, never hashed into the input
//! hash, never persisted.

use modelbench_core::{ProviderTarget, ProviderName};

/// Environment variable name a key reference resolves to.
pub fn env_var_for(key_ref: &str) -> String {
    format!(
        "{}_API_KEY",
        key_ref.to_uppercase().replace('-', "_")
    )
}

/// Resolve a target's API key. Falls back to the provider name as the
/// reference when the target carries none (`openai` → `OPENAI_API_KEY`).
/// Local custom endpoints frequently run unauthenticated, so a missing
/// key for `custom` resolves to an empty token instead of failing.
pub fn resolve_api_key(target: &ProviderTarget) -> Option<String> {
    let key_ref = target
        .api_key_ref
        .clone()
        .unwrap_or_else(|| target.provider_name.to_string());
    match std::env::var(env_var_for(&key_ref)) {
        Ok(key) if !key.is_empty() => Some(key),
        _ if target.provider_name == ProviderName::Custom => Some(String::new()),
        _ => None,
    }
}
