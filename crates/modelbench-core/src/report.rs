//! Job reports: per-call outcomes plus per-group aggregates

use crate::decision::Constraint;
use crate::outcome::CallOutcome;
use crate::types::ProviderName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated statistics for one `(provider, model)` group.
///
/// Latency statistics cover successful calls only; cost and token totals
/// cover every outcome in the group, including failures that accrued
/// prompt cost.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregatedStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub mean_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub stddev_latency_ms: f64,
    pub total_tokens: u64,
    pub avg_tokens_per_request: f64,
    pub total_cost_usd: f64,
    pub avg_cost_per_request_usd: f64,
    pub avg_tokens_per_second: f64,
}

/// One `(provider, model)` group within a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupStats {
    pub provider_name: ProviderName,
    pub model_id: String,
    pub stats: AggregatedStats,
}

/// The executor's output: everything derived from the outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub outcomes: Vec<CallOutcome>,
    /// Sorted by `(provider_name, model_id)` for deterministic output
    pub groups: Vec<GroupStats>,
    pub constraints_applied: Vec<Constraint>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl JobReport {
    pub fn total_cost_usd(&self) -> f64 {
        self.groups.iter().map(|g| g.stats.total_cost_usd).sum()
    }

    pub fn overall_success_rate(&self) -> f64 {
        let total: u64 = self.groups.iter().map(|g| g.stats.total).sum();
        if total == 0 {
            return 0.0;
        }
        let succeeded: u64 = self.groups.iter().map(|g| g.stats.succeeded).sum();
        succeeded as f64 / total as f64
    }

    pub fn group(&self, provider_name: ProviderName, model_id: &str) -> Option<&GroupStats> {
        self.groups
            .iter()
            .find(|g| g.provider_name == provider_name && g.model_id == model_id)
    }
}
