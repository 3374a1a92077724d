//! Output-consistency agent: how stable is a model across repeated runs
//! of the same prompt

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, Result, Validator};
use modelbench_similarity::{SimilarityMethod, SimilarityOptions, similarity};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

pub const DEFAULT_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyInput {
    pub groups: Vec<OutputGroup>,
    #[serde(default)]
    pub similarity_method: SimilarityMethod,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub options: SimilarityOptions,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputGroup {
    #[serde(default)]
    pub prompt_id: Option<String>,
    pub outputs: Vec<String>,
}

impl ConsistencyInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.require(!self.groups.is_empty(), "groups", "must not be empty");
        v.require(
            (0.0..=1.0).contains(&self.threshold),
            "threshold",
            "must be within 0..1",
        );
        for (i, group) in self.groups.iter().enumerate() {
            v.require(
                group.outputs.len() >= 2,
                format!("groups[{}].outputs", i),
                "needs at least 2 outputs to measure consistency",
            );
        }
        Ok(v.finish()?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupConsistency {
    pub prompt_id: Option<String>,
    pub consistency_score: f64,
    pub is_consistent: bool,
    pub sample_count: usize,
}

/// Mean similarity over all unordered output pairs, self-pairs included.
/// Three identical outputs score 1.0; two identical plus one divergent
/// score 4/6 under exact match.
pub(crate) fn group_score(
    outputs: &[String],
    method: SimilarityMethod,
    options: SimilarityOptions,
) -> f64 {
    let n = outputs.len();
    if n == 0 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut pairs = 0u32;
    for i in 0..n {
        for j in i..n {
            sum += similarity(&outputs[i], &outputs[j], method, options);
            pairs += 1;
        }
    }
    sum / f64::from(pairs)
}

pub struct ConsistencyAgent {
    ctx: AgentContext,
}

impl ConsistencyAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for ConsistencyAgent {
    fn agent_id(&self) -> &'static str {
        "output-consistency"
    }

    fn decision_type(&self) -> &'static str {
        "consistency_assessment"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: ConsistencyInput = parse_input(&input)?;
        parsed.validate()?;

        let groups: Vec<GroupConsistency> = parsed
            .groups
            .iter()
            .map(|group| {
                let score = group_score(&group.outputs, parsed.similarity_method, parsed.options);
                GroupConsistency {
                    prompt_id: group.prompt_id.clone(),
                    consistency_score: score,
                    is_consistent: score >= parsed.threshold,
                    sample_count: group.outputs.len(),
                }
            })
            .collect();

        let scores: Vec<f64> = groups.iter().map(|g| g.consistency_score).collect();
        let overall = modelbench_stats::mean(&scores);
        let consistent = groups.iter().filter(|g| g.is_consistent).count();
        let total_samples: usize = groups.iter().map(|g| g.sample_count).sum();
        let group_count = groups.len();

        let outputs = json!({
            "groups": groups,
            "overall_score": overall,
            "consistent_groups": consistent,
            "total_groups": group_count,
            "threshold": parsed.threshold,
        });

        let factors = vec![
            ConfidenceFactor::new("sample_size", 0.5, (total_samples as f64 / 10.0).min(1.0)),
            ConfidenceFactor::new(
                "score_separation",
                0.5,
                ((overall - parsed.threshold).abs() * 4.0).min(1.0),
            ),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({"groups": group_count, "samples": total_samples}),
            outputs,
            factors,
            vec![],
            started,
        ))
    }
}
