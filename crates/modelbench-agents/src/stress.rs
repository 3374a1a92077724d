//! Stress-test agent: drive one target through load shapes and report
//! per-phase statistics
//!
//! Only test types with concrete generation rules exist here; shapes the
//! product has not specified (context overflow and friends) are rejected
//! at validation.

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{
    AggregatedStats, ConfidenceFactor, Constraint, ExecutionConfig, JobPlan, ProviderTarget,
    Result, TestCase, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StressTestType {
    /// Everything at once at maximum concurrency
    Burst,
    /// Steady paced load at low concurrency
    Sustained,
    /// Doubling concurrency stages sharing the request budget
    RampUp,
    /// The full request count at each concurrency level
    ConcurrencySweep,
    /// Doubling prompt sizes at fixed concurrency
    PayloadSize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StressInput {
    pub target: ProviderTarget,
    pub test_type: StressTestType,
    pub base_prompt: String,
    #[serde(default = "default_requests")]
    pub total_requests: u32,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// Pacing for the sustained shape
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_duration_ms: Option<u64>,
    #[serde(default)]
    pub max_total_cost_usd: Option<f64>,
}

fn default_requests() -> u32 {
    20
}

fn default_concurrency() -> usize {
    8
}

impl StressInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.nested("target", self.target.validate());
        v.require(!self.base_prompt.is_empty(), "base_prompt", "must not be empty");
        v.require(self.total_requests >= 1, "total_requests", "must be >= 1");
        v.require(self.max_concurrency >= 1, "max_concurrency", "must be >= 1");
        Ok(v.finish()?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub label: String,
    pub concurrency: usize,
    pub requests: u64,
    pub error_rate: f64,
    pub throughput_rps: f64,
    pub stats: AggregatedStats,
}

/// Doubling concurrency levels up to the cap: 1, 2, 4, … max.
pub(crate) fn concurrency_levels(max: usize) -> Vec<usize> {
    let mut levels = Vec::new();
    let mut level = 1usize;
    while level < max {
        levels.push(level);
        level *= 2;
    }
    levels.push(max);
    levels.dedup();
    levels
}

/// One executor phase shaping the load.
struct Phase {
    label: String,
    concurrency: usize,
    iterations: u32,
    request_delay_ms: Option<u64>,
    prompt: String,
}

fn phases_for(input: &StressInput) -> Vec<Phase> {
    match input.test_type {
        StressTestType::Burst => vec![Phase {
            label: "burst".to_string(),
            concurrency: input.max_concurrency,
            iterations: input.total_requests,
            request_delay_ms: None,
            prompt: input.base_prompt.clone(),
        }],
        StressTestType::Sustained => vec![Phase {
            label: "sustained".to_string(),
            concurrency: input.max_concurrency.min(2),
            iterations: input.total_requests,
            request_delay_ms: input.request_delay_ms.or(Some(100)),
            prompt: input.base_prompt.clone(),
        }],
        StressTestType::RampUp => {
            let levels = concurrency_levels(input.max_concurrency);
            let per_stage = (input.total_requests / levels.len() as u32).max(1);
            levels
                .into_iter()
                .map(|concurrency| Phase {
                    label: format!("ramp-{}", concurrency),
                    concurrency,
                    iterations: per_stage,
                    request_delay_ms: None,
                    prompt: input.base_prompt.clone(),
                })
                .collect()
        }
        StressTestType::ConcurrencySweep => concurrency_levels(input.max_concurrency)
            .into_iter()
            .map(|concurrency| Phase {
                label: format!("sweep-{}", concurrency),
                concurrency,
                iterations: input.total_requests,
                request_delay_ms: None,
                prompt: input.base_prompt.clone(),
            })
            .collect(),
        StressTestType::PayloadSize => [1usize, 2, 4, 8]
            .into_iter()
            .map(|multiplier| Phase {
                label: format!("payload-x{}", multiplier),
                concurrency: input.max_concurrency.min(2),
                iterations: (input.total_requests / 4).max(1),
                request_delay_ms: None,
                prompt: input.base_prompt.repeat(multiplier),
            })
            .collect(),
    }
}

pub struct StressTestAgent {
    ctx: AgentContext,
}

impl StressTestAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for StressTestAgent {
    fn agent_id(&self) -> &'static str {
        "stress-test"
    }

    fn decision_type(&self) -> &'static str {
        "stress_report"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: StressInput = parse_input(&input)?;
        parsed.validate()?;

        let mut results: Vec<PhaseResult> = Vec::new();
        let mut constraints: BTreeSet<Constraint> = BTreeSet::new();
        for phase in phases_for(&parsed) {
            info!(label = %phase.label, concurrency = phase.concurrency, "running stress phase");
            let plan = JobPlan::new(
                vec![parsed.target.clone()],
                vec![TestCase::new(phase.label.clone(), phase.prompt.clone())],
                ExecutionConfig {
                    concurrency: phase.concurrency,
                    iterations_per_test: phase.iterations,
                    save_responses: false,
                    request_delay_ms: phase.request_delay_ms,
                    max_duration_ms: parsed.max_duration_ms,
                    max_total_cost_usd: parsed.max_total_cost_usd,
                    ..Default::default()
                },
            );
            let report = self.ctx.executor.run(&plan).await?;
            constraints.extend(report.constraints_applied.iter().copied());

            let stats = report
                .groups
                .first()
                .map(|g| g.stats.clone())
                .unwrap_or_default();
            let duration_s = (report.duration_ms as f64 / 1000.0).max(f64::EPSILON);
            results.push(PhaseResult {
                label: phase.label,
                concurrency: phase.concurrency,
                requests: stats.total,
                error_rate: if stats.total > 0 {
                    stats.failed as f64 / stats.total as f64
                } else {
                    0.0
                },
                throughput_rps: stats.total as f64 / duration_s,
                stats,
            });
        }

        let total_requests: u64 = results.iter().map(|p| p.requests).sum();
        let total_failed: u64 = results.iter().map(|p| p.stats.failed).sum();
        let overall_error_rate = if total_requests > 0 {
            total_failed as f64 / total_requests as f64
        } else {
            0.0
        };

        let outputs = json!({
            "test_type": parsed.test_type,
            "phases": results,
            "total_requests": total_requests,
            "overall_error_rate": overall_error_rate,
        });

        let factors = vec![
            ConfidenceFactor::new(
                "request_volume",
                0.5,
                (total_requests as f64 / 50.0).min(1.0),
            ),
            ConfidenceFactor::new("run_completeness", 0.5, 1.0 - overall_error_rate),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({
                "test_type": parsed.test_type,
                "total_requests": parsed.total_requests,
                "target": format!("{}/{}", parsed.target.provider_name, parsed.target.model_id),
            }),
            outputs,
            factors,
            constraints.into_iter().collect(),
            started,
        ))
    }
}
