//! Regression-detection agent: statistical comparison of two job reports

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, JobReport, Result, Validator};
use modelbench_stats::{cohens_d, confidence_interval, mann_whitney_u, mean, welch_t_test};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegressionInput {
    pub baseline: JobReport,
    pub candidate: JobReport,
    #[serde(default = "default_significance")]
    pub significance_level: f64,
}

fn default_significance() -> f64 {
    0.05
}

impl RegressionInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.require(
            !self.baseline.outcomes.is_empty(),
            "baseline.outcomes",
            "must not be empty",
        );
        v.require(
            !self.candidate.outcomes.is_empty(),
            "candidate.outcomes",
            "must not be empty",
        );
        v.require(
            (0.0..1.0).contains(&self.significance_level),
            "significance_level",
            "must be within 0..1",
        );
        Ok(v.finish()?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricComparison {
    pub group: String,
    pub metric: &'static str,
    pub baseline_mean: f64,
    pub candidate_mean: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub mann_whitney_p: f64,
    pub cohens_d: f64,
    pub candidate_ci_lower: f64,
    pub candidate_ci_upper: f64,
    /// Significant and worse than baseline
    pub regression: bool,
}

fn group_samples(report: &JobReport, key: &str, metric: &str) -> Vec<f64> {
    report
        .outcomes
        .iter()
        .filter(|o| o.success && o.target_ref.group_key() == key)
        .filter_map(|o| match metric {
            "latency_ms" => Some(o.latency_ms as f64),
            "cost_usd" => Some(o.total_cost_usd()),
            "tokens_per_second" => o.tokens_per_second,
            _ => None,
        })
        .collect()
}

/// Compare one metric for one group across the two reports. For latency
/// and cost, larger is worse; for throughput, smaller is worse.
pub(crate) fn compare_metric(
    group: &str,
    metric: &'static str,
    baseline: &[f64],
    candidate: &[f64],
    alpha: f64,
) -> MetricComparison {
    let t = welch_t_test(baseline, candidate);
    let u = mann_whitney_u(baseline, candidate);
    let d = cohens_d(baseline, candidate);
    let ci = confidence_interval(candidate, 0.95);
    let baseline_mean = mean(baseline);
    let candidate_mean = mean(candidate);

    let worse = match metric {
        "tokens_per_second" => candidate_mean < baseline_mean,
        _ => candidate_mean > baseline_mean,
    };

    MetricComparison {
        group: group.to_string(),
        metric,
        baseline_mean,
        candidate_mean,
        t_statistic: t.t_statistic,
        p_value: t.p_value,
        mann_whitney_p: u.p_value,
        cohens_d: d,
        candidate_ci_lower: ci.lower,
        candidate_ci_upper: ci.upper,
        regression: worse && t.p_value < alpha,
    }
}

pub struct RegressionAgent {
    ctx: AgentContext,
}

impl RegressionAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

const METRICS: [&str; 3] = ["latency_ms", "cost_usd", "tokens_per_second"];

#[async_trait]
impl Agent for RegressionAgent {
    fn agent_id(&self) -> &'static str {
        "regression-detection"
    }

    fn decision_type(&self) -> &'static str {
        "regression_analysis"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: RegressionInput = parse_input(&input)?;
        parsed.validate()?;

        // Only groups present in both reports can be compared
        let baseline_keys: std::collections::BTreeSet<String> = parsed
            .baseline
            .groups
            .iter()
            .map(|g| format!("{}/{}", g.provider_name, g.model_id))
            .collect();
        let shared_keys: Vec<String> = parsed
            .candidate
            .groups
            .iter()
            .map(|g| format!("{}/{}", g.provider_name, g.model_id))
            .filter(|k| baseline_keys.contains(k))
            .collect();

        let mut comparisons = Vec::new();
        let mut min_samples = usize::MAX;
        for key in &shared_keys {
            for metric in METRICS {
                let baseline = group_samples(&parsed.baseline, key, metric);
                let candidate = group_samples(&parsed.candidate, key, metric);
                if baseline.is_empty() || candidate.is_empty() {
                    continue;
                }
                min_samples = min_samples.min(baseline.len()).min(candidate.len());
                comparisons.push(compare_metric(
                    key,
                    metric,
                    &baseline,
                    &candidate,
                    parsed.significance_level,
                ));
            }
        }
        if min_samples == usize::MAX {
            min_samples = 0;
        }

        let regressions: Vec<&MetricComparison> =
            comparisons.iter().filter(|c| c.regression).collect();
        let regression_count = regressions.len();

        let outputs = json!({
            "comparisons": comparisons,
            "shared_groups": shared_keys,
            "regressions_detected": regression_count,
            "significance_level": parsed.significance_level,
        });

        let factors = vec![
            ConfidenceFactor::new("sample_size", 0.5, (min_samples as f64 / 30.0).min(1.0)),
            ConfidenceFactor::new(
                "group_coverage",
                0.5,
                if parsed.candidate.groups.is_empty() {
                    0.0
                } else {
                    shared_keys.len() as f64 / parsed.candidate.groups.len() as f64
                },
            ),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({
                "baseline_outcomes": parsed.baseline.outcomes.len(),
                "candidate_outcomes": parsed.candidate.outcomes.len(),
                "shared_groups": shared_keys.len(),
            }),
            outputs,
            factors,
            vec![],
            started,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_latency_regression_is_flagged() {
        let baseline: Vec<f64> = (0..20).map(|i| 100.0 + (i % 5) as f64).collect();
        let candidate: Vec<f64> = (0..20).map(|i| 200.0 + (i % 5) as f64).collect();
        let cmp = compare_metric("openai/gpt-4o-mini", "latency_ms", &baseline, &candidate, 0.05);
        assert!(cmp.regression);
        assert!(cmp.p_value < 0.01);
        assert!(cmp.cohens_d > 1.0);
    }

    #[test]
    fn improvement_is_not_a_regression() {
        let baseline: Vec<f64> = (0..20).map(|i| 200.0 + (i % 5) as f64).collect();
        let candidate: Vec<f64> = (0..20).map(|i| 100.0 + (i % 5) as f64).collect();
        let cmp = compare_metric("openai/gpt-4o-mini", "latency_ms", &baseline, &candidate, 0.05);
        assert!(!cmp.regression);
    }

    #[test]
    fn throughput_direction_is_inverted() {
        let baseline: Vec<f64> = (0..20).map(|i| 50.0 + (i % 3) as f64).collect();
        let candidate: Vec<f64> = (0..20).map(|i| 20.0 + (i % 3) as f64).collect();
        let cmp = compare_metric(
            "openai/gpt-4o-mini",
            "tokens_per_second",
            &baseline,
            &candidate,
            0.05,
        );
        assert!(cmp.regression);
    }

    #[test]
    fn noise_is_not_significant() {
        let baseline = [100.0, 104.0, 98.0, 101.0, 99.0, 103.0];
        let candidate = [101.0, 103.0, 99.0, 102.0, 100.0, 98.0];
        let cmp = compare_metric("openai/gpt-4o-mini", "latency_ms", &baseline, &candidate, 0.05);
        assert!(!cmp.regression);
        assert!(cmp.p_value > 0.05);
    }
}
