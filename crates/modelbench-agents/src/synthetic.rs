//! Synthetic-data generator agent: produce evaluation samples from seed
//! instructions and deduplicate near-identical generations

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{
    ConfidenceFactor, ExecutionConfig, JobPlan, ProviderTarget, Result, TestCase, Validator,
};
use modelbench_similarity::{SimilarityMethod, SimilarityOptions, similarity};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

/// Generations at or above this similarity to an accepted sample are
/// discarded as duplicates.
const DEDUP_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyntheticInput {
    pub target: ProviderTarget,
    /// Instruction prompts; each is sampled `count_per_seed` times
    pub seed_prompts: Vec<String>,
    #[serde(default = "default_count")]
    pub count_per_seed: u32,
    #[serde(default)]
    pub config: ExecutionConfig,
}

fn default_count() -> u32 {
    3
}

impl SyntheticInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.nested("target", self.target.validate());
        v.require(!self.seed_prompts.is_empty(), "seed_prompts", "must not be empty");
        v.require(self.count_per_seed >= 1, "count_per_seed", "must be >= 1");
        for (i, seed) in self.seed_prompts.iter().enumerate() {
            v.require(
                !seed.trim().is_empty(),
                format!("seed_prompts[{}]", i),
                "must not be empty",
            );
        }
        Ok(v.finish()?)
    }
}

/// Keep the first of each near-duplicate cluster, preserving order.
pub(crate) fn dedup_samples(samples: Vec<String>) -> (Vec<String>, usize) {
    let options = SimilarityOptions::default();
    let mut kept: Vec<String> = Vec::new();
    let mut removed = 0usize;
    for sample in samples {
        let duplicate = kept.iter().any(|existing| {
            similarity(existing, &sample, SimilarityMethod::Levenshtein, options)
                >= DEDUP_THRESHOLD
        });
        if duplicate {
            removed += 1;
        } else {
            kept.push(sample);
        }
    }
    (kept, removed)
}

pub struct SyntheticDataAgent {
    ctx: AgentContext,
}

impl SyntheticDataAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for SyntheticDataAgent {
    fn agent_id(&self) -> &'static str {
        "synthetic-data-generator"
    }

    fn decision_type(&self) -> &'static str {
        "synthetic_dataset"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: SyntheticInput = parse_input(&input)?;
        parsed.validate()?;

        let tests: Vec<TestCase> = parsed
            .seed_prompts
            .iter()
            .enumerate()
            .map(|(i, seed)| TestCase::new(format!("seed-{}", i), seed.clone()))
            .collect();
        let mut config = parsed.config.clone();
        config.iterations_per_test = parsed.count_per_seed;
        config.save_responses = true;
        let plan = JobPlan::new(vec![parsed.target.clone()], tests, config);
        let report = self.ctx.executor.run(&plan).await?;

        let generated: Vec<String> = report
            .outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.content.clone())
            .filter(|c| !c.trim().is_empty())
            .collect();
        let generated_count = generated.len();
        let (samples, duplicates_removed) = dedup_samples(generated);
        let requested = plan.work_item_count();

        let kept = samples.len();
        let outputs = json!({
            "samples": samples,
            "requested": requested,
            "generated": generated_count,
            "kept": kept,
            "duplicates_removed": duplicates_removed,
        });

        let factors = vec![
            ConfidenceFactor::new(
                "yield",
                0.5,
                if requested > 0 {
                    kept as f64 / requested as f64
                } else {
                    0.0
                },
            ),
            ConfidenceFactor::new("run_completeness", 0.5, report.overall_success_rate()),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({
                "seeds": parsed.seed_prompts.len(),
                "count_per_seed": parsed.count_per_seed,
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
    fn exact_duplicates_are_removed() {
        let (kept, removed) = dedup_samples(vec![
            "a generated record".to_string(),
            "a generated record".to_string(),
            "something else entirely".to_string(),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 1);
        assert_eq!(kept[0], "a generated record");
    }

    #[test]
    fn near_duplicates_are_removed() {
        let (kept, removed) = dedup_samples(vec![
            "the user ordered four widgets on monday".to_string(),
            "the user ordered four widgets on tuesday".to_string(),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 1);
    }

    #[test]
    fn distinct_samples_survive() {
        let (kept, removed) = dedup_samples(vec![
            "invoice for consulting services".to_string(),
            "weather report for the weekend".to_string(),
            "recipe with twelve ingredients".to_string(),
        ]);
        assert_eq!(kept.len(), 3);
        assert_eq!(removed, 0);
    }
}
