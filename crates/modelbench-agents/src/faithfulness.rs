//! Faithfulness-verification agent: is a generated summary supported by
//! its source text, sentence by sentence

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, Result, Validator};
use modelbench_similarity::{
    SimilarityOptions, contradicts, keyword_overlap, ngram_similarity,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

pub const DEFAULT_THRESHOLD: f64 = 0.45;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaithfulnessInput {
    /// Source document the candidate must stay grounded in
    pub source: String,
    /// Generated text to verify
    pub candidate: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub options: SimilarityOptions,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl FaithfulnessInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.require(!self.source.trim().is_empty(), "source", "must not be empty");
        v.require(
            !self.candidate.trim().is_empty(),
            "candidate",
            "must not be empty",
        );
        v.require(
            (0.0..=1.0).contains(&self.threshold),
            "threshold",
            "must be within 0..1",
        );
        Ok(v.finish()?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SentenceSupport {
    pub sentence: String,
    pub support_score: f64,
    pub supported: bool,
    pub contradicted: bool,
}

/// Naive sentence splitter: terminal punctuation followed by whitespace.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Support of a candidate sentence: best blend of n-gram and keyword
/// agreement against any source sentence.
pub(crate) fn sentence_support(
    sentence: &str,
    source_sentences: &[String],
    options: SimilarityOptions,
) -> (f64, bool) {
    let mut best = 0.0f64;
    let mut contradicted = false;
    for source in source_sentences {
        let score = 0.5 * ngram_similarity(sentence, source, options)
            + 0.5 * keyword_overlap(sentence, source, options);
        if score > best {
            best = score;
        }
        if contradicts(sentence, source, options) {
            contradicted = true;
        }
    }
    (best, contradicted)
}

pub struct FaithfulnessAgent {
    ctx: AgentContext,
}

impl FaithfulnessAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for FaithfulnessAgent {
    fn agent_id(&self) -> &'static str {
        "faithfulness-verification"
    }

    fn decision_type(&self) -> &'static str {
        "faithfulness_assessment"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: FaithfulnessInput = parse_input(&input)?;
        parsed.validate()?;

        let source_sentences = split_sentences(&parsed.source);
        let candidate_sentences = split_sentences(&parsed.candidate);

        let assessments: Vec<SentenceSupport> = candidate_sentences
            .iter()
            .map(|sentence| {
                let (score, contradicted) =
                    sentence_support(sentence, &source_sentences, parsed.options);
                SentenceSupport {
                    sentence: sentence.clone(),
                    support_score: score,
                    supported: score >= parsed.threshold && !contradicted,
                    contradicted,
                }
            })
            .collect();

        let scores: Vec<f64> = assessments.iter().map(|a| a.support_score).collect();
        let supported = assessments.iter().filter(|a| a.supported).count();
        let contradicted = assessments.iter().filter(|a| a.contradicted).count();
        let sentence_count = assessments.len();
        let faithfulness_score = if sentence_count == 0 {
            0.0
        } else {
            supported as f64 / sentence_count as f64
        };

        let outputs = json!({
            "sentences": assessments,
            "sentence_count": sentence_count,
            "supported_count": supported,
            "contradicted_count": contradicted,
            "faithfulness_score": faithfulness_score,
            "mean_support": modelbench_stats::mean(&scores),
            "is_faithful": faithfulness_score >= 0.8 && contradicted == 0,
        });

        let factors = vec![
            ConfidenceFactor::new(
                "source_coverage",
                0.5,
                (source_sentences.len() as f64 / 5.0).min(1.0),
            ),
            ConfidenceFactor::new(
                "sentence_count",
                0.5,
                (sentence_count as f64 / 5.0).min(1.0),
            ),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({
                "source_sentences": source_sentences.len(),
                "candidate_sentences": sentence_count,
            }),
            outputs,
            factors,
            vec![],
            started,
        ))
    }
}
