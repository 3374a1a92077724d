//! Benchmark agent: run a job plan and report aggregated statistics

use crate::registry::{Agent, AgentContext, AgentOutcome};
use crate::parse_input;
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, JobPlan, JobReport, Result};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

pub struct BenchmarkAgent {
    ctx: AgentContext,
}

impl BenchmarkAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

/// Confidence for a finished benchmark:
/// `0.4·success_rate + 0.2·latency_consistency + 0.2·provider_reliability
///  + 0.2·log10(total+1)/2`, each factor clamped to [0, 1].
pub(crate) fn confidence_factors(report: &JobReport) -> Vec<ConfidenceFactor> {
    let success_rate = report.overall_success_rate();

    let latencies: Vec<f64> = report
        .outcomes
        .iter()
        .filter(|o| o.success)
        .map(|o| o.latency_ms as f64)
        .collect();
    let mean = modelbench_stats::mean(&latencies);
    let latency_consistency = if mean > 0.0 {
        1.0 - (modelbench_stats::stddev(&latencies) / mean).min(1.0)
    } else {
        0.0
    };

    let groups_responding = report
        .groups
        .iter()
        .filter(|g| g.stats.succeeded > 0)
        .count();
    let provider_reliability = if report.groups.is_empty() {
        0.0
    } else {
        groups_responding as f64 / report.groups.len() as f64
    };

    let total: u64 = report.groups.iter().map(|g| g.stats.total).sum();
    let sample_size = ((total as f64 + 1.0).log10() / 2.0).clamp(0.0, 1.0);

    vec![
        ConfidenceFactor::new("success_rate", 0.4, success_rate),
        ConfidenceFactor::new("latency_consistency", 0.2, latency_consistency),
        ConfidenceFactor::new("provider_reliability", 0.2, provider_reliability),
        ConfidenceFactor::new("sample_size", 0.2, sample_size),
    ]
}

/// Digest of a plan for the audit record; never the raw prompts.
pub(crate) fn plan_summary(plan: &JobPlan) -> Value {
    json!({
        "targets": plan
            .targets
            .iter()
            .map(|t| format!("{}/{}", t.provider_name, t.model_id))
            .collect::<Vec<_>>(),
        "tests": plan.tests.len(),
        "iterations_per_test": plan.config.iterations_per_test,
        "concurrency": plan.config.concurrency,
    })
}

#[async_trait]
impl Agent for BenchmarkAgent {
    fn agent_id(&self) -> &'static str {
        "benchmark"
    }

    fn decision_type(&self) -> &'static str {
        "benchmark_report"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let plan: JobPlan = parse_input(&input)?;
        let report = self.ctx.executor.run(&plan).await?;

        let factors = confidence_factors(&report);
        let constraints = report.constraints_applied.clone();
        let outputs = serde_json::to_value(&report)?;

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            plan_summary(&plan),
            outputs,
            factors,
            constraints,
            started,
        ))
    }
}
