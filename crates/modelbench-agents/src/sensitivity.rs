//! Prompt-sensitivity agent: how much do small prompt changes move the
//! output distribution

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{
    ConfidenceFactor, ExecutionConfig, JobPlan, ProviderTarget, Result, TestCase, Validator,
};
use modelbench_similarity::{SimilarityMethod, SimilarityOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensitivityInput {
    pub target: ProviderTarget,
    pub base_prompt: String,
    pub perturbations: Vec<String>,
    #[serde(default = "default_samples")]
    pub samples_per_prompt: u32,
    #[serde(default)]
    pub similarity_method: SimilarityMethod,
    #[serde(default)]
    pub options: SimilarityOptions,
    #[serde(default)]
    pub config: ExecutionConfig,
}

fn default_samples() -> u32 {
    3
}

impl SensitivityInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.nested("target", self.target.validate());
        v.require(!self.base_prompt.is_empty(), "base_prompt", "must not be empty");
        v.require(
            !self.perturbations.is_empty(),
            "perturbations",
            "must not be empty",
        );
        v.require(
            self.samples_per_prompt >= 2,
            "samples_per_prompt",
            "needs at least 2 samples to measure variance",
        );
        Ok(v.finish()?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerturbationVariance {
    pub prompt_index: usize,
    pub variance: f64,
    pub samples: usize,
}

/// Variance of one prompt's samples: `1 − mean pairwise similarity`,
/// self-pairs included, matching the consistency agent's convention.
pub(crate) fn variance_of(
    samples: &[String],
    method: SimilarityMethod,
    options: SimilarityOptions,
) -> f64 {
    1.0 - crate::consistency::group_score(samples, method, options)
}

pub struct SensitivityAgent {
    ctx: AgentContext,
}

impl SensitivityAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for SensitivityAgent {
    fn agent_id(&self) -> &'static str {
        "prompt-sensitivity"
    }

    fn decision_type(&self) -> &'static str {
        "sensitivity_analysis"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: SensitivityInput = parse_input(&input)?;
        parsed.validate()?;

        // One test per prompt variant; iterations supply the samples
        let mut tests = vec![TestCase::new("base", parsed.base_prompt.clone())];
        for (i, perturbation) in parsed.perturbations.iter().enumerate() {
            tests.push(TestCase::new(format!("perturbation-{}", i), perturbation.clone()));
        }
        let mut config = parsed.config.clone();
        config.iterations_per_test = parsed.samples_per_prompt;
        config.save_responses = true;
        let plan = JobPlan::new(vec![parsed.target.clone()], tests, config);

        let report = self.ctx.executor.run(&plan).await?;

        let mut variances = Vec::new();
        let mut all_sampled = 0usize;
        for (i, test) in plan.tests.iter().enumerate() {
            let samples: Vec<String> = report
                .outcomes
                .iter()
                .filter(|o| o.success && o.test_ref == test.test_id)
                .filter_map(|o| o.content.clone())
                .collect();
            all_sampled += samples.len();
            variances.push(PerturbationVariance {
                prompt_index: i,
                variance: if samples.len() >= 2 {
                    variance_of(&samples, parsed.similarity_method, parsed.options)
                } else {
                    0.0
                },
                samples: samples.len(),
            });
        }

        let overall_variance = modelbench_stats::mean(
            &variances.iter().map(|p| p.variance).collect::<Vec<_>>(),
        );
        let expected = plan.work_item_count() as usize;

        let outputs = json!({
            "base_variance": variances.first().map(|p| p.variance).unwrap_or(0.0),
            "perturbations": &variances[1..],
            "overall_variance": overall_variance,
            "samples_collected": all_sampled,
        });

        let factors = vec![
            ConfidenceFactor::new(
                "sample_completeness",
                0.6,
                if expected > 0 {
                    all_sampled as f64 / expected as f64
                } else {
                    0.0
                },
            ),
            ConfidenceFactor::new(
                "samples_per_prompt",
                0.4,
                (f64::from(parsed.samples_per_prompt) / 5.0).min(1.0),
            ),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({
                "perturbations": parsed.perturbations.len(),
                "samples_per_prompt": parsed.samples_per_prompt,
                "target": format!("{}/{}", parsed.target.provider_name, parsed.target.model_id),
            }),
            outputs,
            factors,
            report.constraints_applied.clone(),
            started,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_samples_have_zero_variance() {
        let samples = vec!["same".to_string(), "same".to_string(), "same".to_string()];
        assert_eq!(
            variance_of(
                &samples,
                SimilarityMethod::ExactMatch,
                SimilarityOptions::default()
            ),
            0.0
        );
    }

    #[test]
    fn divergent_samples_have_positive_variance() {
        let samples = vec![
            "alpha response".to_string(),
            "beta response".to_string(),
            "gamma response".to_string(),
        ];
        let variance = variance_of(
            &samples,
            SimilarityMethod::ExactMatch,
            SimilarityOptions::default(),
        );
        // 3 self-pairs match out of 6 total pairs
        assert!((variance - 0.5).abs() < 1e-9);
    }

    #[test]
    fn validation_requires_two_samples() {
        let input = SensitivityInput {
            target: ProviderTarget::new(modelbench_core::ProviderName::Openai, "gpt-4o-mini"),
            base_prompt: "base".to_string(),
            perturbations: vec!["variant".to_string()],
            samples_per_prompt: 1,
            similarity_method: SimilarityMethod::ExactMatch,
            options: SimilarityOptions::default(),
            config: ExecutionConfig::default(),
        };
        assert!(input.validate().is_err());
    }
}
