//! Decision records: the append-only audit event every agent emits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Constraints the harness applied while producing a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    MaxDurationExceeded,
    MaxCostExceeded,
    RateLimitApplied,
    FailFastTriggered,
    WarmUpSkipped,
    ConcurrencyLimited,
    ProviderUnavailable,
    MaxSamplesExceeded,
    TimeoutExceeded,
    SampleMismatch,
    LowConfidenceResult,
}

/// One weighted component of a confidence score. Weights across a record
/// must sum to at most 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceFactor {
    pub factor: String,
    pub weight: f64,
    pub value: f64,
}

impl ConfidenceFactor {
    pub fn new(factor: impl Into<String>, weight: f64, value: f64) -> Self {
        Self {
            factor: factor.into(),
            weight,
            value: value.clamp(0.0, 1.0),
        }
    }

    /// Weighted sum of factors, clamped to [0, 1].
    pub fn combine(factors: &[ConfidenceFactor]) -> f64 {
        factors
            .iter()
            .map(|f| f.weight * f.value)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

/// Where a decision was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRef {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

impl ExecutionRef {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            trace_id: None,
            span_id: None,
            parent_span_id: None,
        }
    }
}

impl Default for ExecutionRef {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only audit event. Never mutated after emission; persisted
/// through the durable-store gateway only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub agent_id: String,
    pub agent_version: String,
    pub decision_type: String,
    pub decision_id: String,
    /// SHA-256 over the canonical JSON form of the agent input, 64 hex chars
    pub inputs_hash: String,
    /// Small structured digest of the inputs; never raw prompts
    pub inputs_summary: serde_json::Value,
    pub outputs: serde_json::Value,
    pub confidence: f64,
    pub confidence_factors: Vec<ConfidenceFactor>,
    pub constraints_applied: Vec<Constraint>,
    pub execution_ref: ExecutionRef,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Telemetry event appended alongside decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn decision_emitted(agent_id: &str, decision_id: &str, confidence: f64) -> Self {
        Self {
            event: "decision_emitted".to_string(),
            agent_id: agent_id.to_string(),
            decision_id: Some(decision_id.to_string()),
            confidence: Some(confidence),
            timestamp: Utc::now(),
        }
    }

    pub fn persistence_drop(agent_id: &str) -> Self {
        Self {
            event: "persistence_drop".to_string(),
            agent_id: agent_id.to_string(),
            decision_id: None,
            confidence: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_wire_format() {
        assert_eq!(
            serde_json::to_string(&Constraint::FailFastTriggered).unwrap(),
            "\"fail_fast_triggered\""
        );
        assert_eq!(
            serde_json::to_string(&Constraint::LowConfidenceResult).unwrap(),
            "\"low_confidence_result\""
        );
    }

    #[test]
    fn combine_clamps_and_weights() {
        let factors = vec![
            ConfidenceFactor::new("success_rate", 0.4, 1.0),
            ConfidenceFactor::new("latency_consistency", 0.2, 0.5),
            ConfidenceFactor::new("provider_reliability", 0.2, 1.0),
            ConfidenceFactor::new("sample_size", 0.2, 0.8),
        ];
        let combined = ConfidenceFactor::combine(&factors);
        assert!((combined - 0.86).abs() < 1e-12);
        assert!(factors.iter().map(|f| f.weight).sum::<f64>() <= 1.0);
    }

    #[test]
    fn factor_value_is_clamped() {
        let f = ConfidenceFactor::new("sample_size", 0.2, 3.0);
        assert_eq!(f.value, 1.0);
        let f = ConfidenceFactor::new("sample_size", 0.2, -1.0);
        assert_eq!(f.value, 0.0);
    }

    #[test]
    fn execution_ref_gets_fresh_id() {
        let a = ExecutionRef::new();
        let b = ExecutionRef::new();
        assert_ne!(a.execution_id, b.execution_id);
        assert!(a.trace_id.is_none());
    }
}
