//! Quality-scoring agent: heuristic, reference-free scoring of responses

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, Result, Validator};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityInput {
    pub samples: Vec<QualitySample>,
    #[serde(default)]
    pub weights: QualityWeights,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualitySample {
    #[serde(default)]
    pub prompt: Option<String>,
    pub response: String,
}

/// Per-criterion weights; they are normalized before scoring so any
/// positive mix works.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityWeights {
    pub length: f64,
    pub lexical_diversity: f64,
    pub structure: f64,
    pub non_repetition: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            length: 0.2,
            lexical_diversity: 0.3,
            structure: 0.2,
            non_repetition: 0.3,
        }
    }
}

impl QualityInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.require(!self.samples.is_empty(), "samples", "must not be empty");
        let weight_sum = self.weights.length
            + self.weights.lexical_diversity
            + self.weights.structure
            + self.weights.non_repetition;
        v.require(weight_sum > 0.0, "weights", "must sum to a positive value");
        for (i, sample) in self.samples.iter().enumerate() {
            v.require(
                !sample.response.trim().is_empty(),
                format!("samples[{}].response", i),
                "must not be empty",
            );
        }
        Ok(v.finish()?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityScore {
    pub length: f64,
    pub lexical_diversity: f64,
    pub structure: f64,
    pub non_repetition: f64,
    pub composite: f64,
}

/// Adequate-length score: ramps up to 1.0 at 50 words, degrades past 800.
fn length_score(word_count: usize) -> f64 {
    let words = word_count as f64;
    if words <= 50.0 {
        words / 50.0
    } else if words <= 800.0 {
        1.0
    } else {
        (1600.0 - words).max(0.0) / 800.0
    }
}

/// Share of distinct words among all words.
fn lexical_diversity(words: &[&str]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
    distinct.len() as f64 / words.len() as f64
}

/// Sentence punctuation and paragraph presence.
fn structure_score(text: &str) -> f64 {
    let has_terminator = text.contains(['.', '!', '?']);
    let multi_sentence = text.matches(['.', '!', '?']).count() >= 2;
    match (has_terminator, multi_sentence) {
        (true, true) => 1.0,
        (true, false) => 0.7,
        _ => 0.3,
    }
}

/// 1 minus the share of repeated word 4-grams.
fn non_repetition_score(words: &[&str]) -> f64 {
    if words.len() < 4 {
        return 1.0;
    }
    let total = words.len() - 3;
    let distinct: HashSet<&[&str]> = words.windows(4).collect();
    distinct.len() as f64 / total as f64
}

pub(crate) fn score_sample(text: &str, weights: QualityWeights) -> QualityScore {
    let words: Vec<&str> = text.split_whitespace().collect();
    let length = length_score(words.len());
    let diversity = lexical_diversity(&words);
    let structure = structure_score(text);
    let non_repetition = non_repetition_score(&words);

    let weight_sum =
        weights.length + weights.lexical_diversity + weights.structure + weights.non_repetition;
    let composite = (weights.length * length
        + weights.lexical_diversity * diversity
        + weights.structure * structure
        + weights.non_repetition * non_repetition)
        / weight_sum;

    QualityScore {
        length,
        lexical_diversity: diversity,
        structure,
        non_repetition,
        composite,
    }
}

pub struct QualityAgent {
    ctx: AgentContext,
}

impl QualityAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for QualityAgent {
    fn agent_id(&self) -> &'static str {
        "quality-scoring"
    }

    fn decision_type(&self) -> &'static str {
        "quality_assessment"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: QualityInput = parse_input(&input)?;
        parsed.validate()?;

        let scores: Vec<QualityScore> = parsed
            .samples
            .iter()
            .map(|sample| score_sample(&sample.response, parsed.weights))
            .collect();

        let composites: Vec<f64> = scores.iter().map(|s| s.composite).collect();
        let sample_count = scores.len();
        let mean_quality = modelbench_stats::mean(&composites);

        let outputs = json!({
            "scores": scores,
            "sample_count": sample_count,
            "mean_quality": mean_quality,
            "min_quality": composites.iter().copied().fold(f64::INFINITY, f64::min),
            "stddev_quality": modelbench_stats::stddev(&composites),
        });

        let factors = vec![
            ConfidenceFactor::new("sample_size", 0.6, (sample_count as f64 / 20.0).min(1.0)),
            // Heuristic criteria only; never fully confident without a
            // reference or judge
            ConfidenceFactor::new("criteria_strength", 0.4, 0.6),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({"samples": sample_count}),
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
    fn coherent_paragraph_scores_well() {
        let text = "The migration completed in three phases. Each phase validated row counts \
                    before moving on. The final phase swapped the read path and kept the old \
                    tables for a week as a fallback.";
        let score = score_sample(text, QualityWeights::default());
        assert!(score.composite > 0.7, "{score:?}");
        assert_eq!(score.structure, 1.0);
    }

    #[test]
    fn repeated_text_is_penalized() {
        let degenerate = "the same four words ".repeat(40);
        let score = score_sample(&degenerate, QualityWeights::default());
        assert!(score.non_repetition < 0.2);
        assert!(score.lexical_diversity < 0.1);
        assert!(score.composite < 0.5);
    }

    #[test]
    fn one_word_answer_scores_low_on_length() {
        let score = score_sample("Yes", QualityWeights::default());
        assert!(score.length < 0.1);
    }

    #[test]
    fn overlong_output_degrades() {
        let rambling = "word ".repeat(1700);
        let score = score_sample(&rambling, QualityWeights::default());
        assert_eq!(score.length, 0.0);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for text in ["", "short", &"unique words never repeat ".repeat(10)] {
            if text.is_empty() {
                continue;
            }
            let score = score_sample(text, QualityWeights::default());
            for value in [
                score.length,
                score.lexical_diversity,
                score.structure,
                score.non_repetition,
                score.composite,
            ] {
                assert!((0.0..=1.0).contains(&value), "{text}: {value}");
            }
        }
    }
}
