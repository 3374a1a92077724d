//! Model-comparator agent: run one suite across several targets and rank
//! them

use crate::benchmark::plan_summary;
use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, JobPlan, JobReport, Result, Validator};
use modelbench_stats::welch_t_test;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, Clone, Serialize)]
pub struct ModelRanking {
    pub group: String,
    pub score: f64,
    pub success_rate: f64,
    pub mean_latency_ms: f64,
    pub avg_cost_per_request_usd: f64,
}

/// Composite ranking: success dominates, then latency, then cost. Latency
/// and cost are scored relative to the best group so the composite stays
/// in [0, 1].
pub(crate) fn rank_groups(report: &JobReport) -> Vec<ModelRanking> {
    let best_latency = report
        .groups
        .iter()
        .filter(|g| g.stats.succeeded > 0)
        .map(|g| g.stats.mean_latency_ms)
        .fold(f64::INFINITY, f64::min);
    let best_cost = report
        .groups
        .iter()
        .filter(|g| g.stats.avg_cost_per_request_usd > 0.0)
        .map(|g| g.stats.avg_cost_per_request_usd)
        .fold(f64::INFINITY, f64::min);

    let mut rankings: Vec<ModelRanking> = report
        .groups
        .iter()
        .map(|g| {
            let latency_score = if g.stats.succeeded == 0 || g.stats.mean_latency_ms <= 0.0 {
                0.0
            } else {
                (best_latency / g.stats.mean_latency_ms).clamp(0.0, 1.0)
            };
            let cost_score = if g.stats.avg_cost_per_request_usd <= 0.0 {
                // Unpriced models neither win nor lose on cost
                0.5
            } else {
                (best_cost / g.stats.avg_cost_per_request_usd).clamp(0.0, 1.0)
            };
            ModelRanking {
                group: format!("{}/{}", g.provider_name, g.model_id),
                score: 0.5 * g.stats.success_rate + 0.3 * latency_score + 0.2 * cost_score,
                success_rate: g.stats.success_rate,
                mean_latency_ms: g.stats.mean_latency_ms,
                avg_cost_per_request_usd: g.stats.avg_cost_per_request_usd,
            }
        })
        .collect();
    rankings.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.group.cmp(&b.group)));
    rankings
}

pub struct ComparatorAgent {
    ctx: AgentContext,
}

impl ComparatorAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for ComparatorAgent {
    fn agent_id(&self) -> &'static str {
        "model-comparator"
    }

    fn decision_type(&self) -> &'static str {
        "model_comparison"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let plan: JobPlan = parse_input(&input)?;
        {
            let mut v = Validator::new();
            v.require(
                plan.targets.len() >= 2,
                "targets",
                "comparison needs at least 2 targets",
            );
            v.finish()?;
        }
        let report = self.ctx.executor.run(&plan).await?;

        let rankings = rank_groups(&report);
        let winner = rankings.first().map(|r| r.group.clone());

        // Head-to-head latency significance between the top two
        let head_to_head = if rankings.len() >= 2 {
            let latencies = |key: &str| -> Vec<f64> {
                report
                    .outcomes
                    .iter()
                    .filter(|o| o.success && o.target_ref.group_key() == key)
                    .map(|o| o.latency_ms as f64)
                    .collect()
            };
            let first = latencies(&rankings[0].group);
            let second = latencies(&rankings[1].group);
            let t = welch_t_test(&first, &second);
            Some(json!({
                "groups": [rankings[0].group.clone(), rankings[1].group.clone()],
                "latency_p_value": t.p_value,
                "significant": t.p_value < 0.05,
            }))
        } else {
            None
        };

        let outputs = json!({
            "rankings": rankings,
            "winner": winner,
            "head_to_head": head_to_head,
            "groups": report.groups,
        });

        let factors = crate::benchmark::confidence_factors(&report);
        let constraints = report.constraints_applied.clone();

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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use modelbench_core::{AggregatedStats, GroupStats, ProviderName};

    fn report(groups: Vec<GroupStats>) -> JobReport {
        let now = Utc::now();
        JobReport {
            correlation_id: None,
            outcomes: vec![],
            groups,
            constraints_applied: vec![],
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    fn group(provider: ProviderName, model: &str, rate: f64, latency: f64, cost: f64) -> GroupStats {
        GroupStats {
            provider_name: provider,
            model_id: model.to_string(),
            stats: AggregatedStats {
                total: 10,
                succeeded: (rate * 10.0) as u64,
                failed: 10 - (rate * 10.0) as u64,
                success_rate: rate,
                mean_latency_ms: latency,
                avg_cost_per_request_usd: cost,
                ..Default::default()
            },
        }
    }

    #[test]
    fn reliable_fast_cheap_wins() {
        let rankings = rank_groups(&report(vec![
            group(ProviderName::Openai, "gpt-4o-mini", 1.0, 100.0, 0.0001),
            group(ProviderName::Anthropic, "claude-3-5-haiku-20241022", 1.0, 200.0, 0.0004),
            group(ProviderName::Groq, "llama-3.1-8b-instant", 0.1, 50.0, 0.00005),
        ]));
        assert_eq!(rankings[0].group, "openai/gpt-4o-mini");
        // The mostly-failing group ranks last despite being fastest
        assert_eq!(rankings[2].group, "groq/llama-3.1-8b-instant");
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let rankings = rank_groups(&report(vec![
            group(ProviderName::Openai, "gpt-4o", 1.0, 100.0, 0.01),
            group(ProviderName::Openai, "gpt-4o-mini", 0.0, 0.0, 0.0),
        ]));
        for ranking in rankings {
            assert!((0.0..=1.0).contains(&ranking.score), "{ranking:?}");
        }
    }

    #[test]
    fn ties_break_deterministically_by_name() {
        let rankings = rank_groups(&report(vec![
            group(ProviderName::Openai, "model-b", 1.0, 100.0, 0.001),
            group(ProviderName::Openai, "model-a", 1.0, 100.0, 0.001),
        ]));
        assert_eq!(rankings[0].group, "openai/model-a");
    }
}
