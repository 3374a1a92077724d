//! Hallucination detector: classify claims against reference contexts

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, Result, Validator};
use modelbench_similarity::{SimilarityOptions, contradicts, ngram_similarity};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::instrument;

pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Support below which a claim counts as fabricated outright.
const FABRICATION_CUTOFF: f64 = 0.2;
/// Support below which a claim is unsupported.
const UNSUPPORTED_CUTOFF: f64 = 0.4;
/// Unmatched-keyword ratio above which a supported claim is exaggerated.
const EXAGGERATION_CUTOFF: f64 = 0.4;
/// Overlap needed for the keyword-substitution contradiction signal.
const SUBSTITUTION_OVERLAP: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HallucinationInput {
    /// Array form only; single-claim callers wrap
    pub claims: Vec<String>,
    pub contexts: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub options: SimilarityOptions,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl HallucinationInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.require(!self.claims.is_empty(), "claims", "must not be empty");
        v.require(!self.contexts.is_empty(), "contexts", "must not be empty");
        v.require(
            (0.0..=1.0).contains(&self.threshold),
            "threshold",
            "must be within 0..1",
        );
        for (i, claim) in self.claims.iter().enumerate() {
            v.require(
                !claim.trim().is_empty(),
                format!("claims[{}]", i),
                "must not be empty",
            );
        }
        Ok(v.finish()?)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HallucinationType {
    Fabrication,
    Unsupported,
    Contradiction,
    PartialSupport,
    Exaggeration,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimAssessment {
    pub claim: String,
    pub hallucination_type: HallucinationType,
    pub severity: Severity,
    pub support_score: f64,
    pub unmatched_ratio: f64,
}

/// Keywords in `claim` with no counterpart in `context`, as a ratio of the
/// claim's keywords. Claims without keywords count as fully matched.
fn unmatched_ratio(claim: &str, context: &str, options: SimilarityOptions) -> f64 {
    // keyword_overlap is symmetric Jaccard; the asymmetric ratio needs the
    // claim side only, so recompute from overlap and set sizes is not
    // possible. Walk the tokens directly instead.
    let tokens = |text: &str| -> std::collections::HashSet<String> {
        modelbench_similarity::normalize(text, options)
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|t| t.chars().count() >= 3)
            .collect()
    };
    let claim_tokens = tokens(claim);
    if claim_tokens.is_empty() {
        return 0.0;
    }
    let context_tokens = tokens(context);
    let unmatched = claim_tokens
        .iter()
        .filter(|t| !context_tokens.contains(*t))
        .count();
    unmatched as f64 / claim_tokens.len() as f64
}

/// Contradiction signal: either the one-sided negation heuristic, or a
/// keyword substitution inside an otherwise near-identical sentence
/// ("capital of Germany" vs "capital of France").
fn is_contradiction(claim: &str, context: &str, options: SimilarityOptions) -> bool {
    if contradicts(claim, context, options) {
        return true;
    }
    if ngram_similarity(claim, context, options) < SUBSTITUTION_OVERLAP {
        return false;
    }
    let claim_unmatched = unmatched_ratio(claim, context, options);
    let context_unmatched = unmatched_ratio(context, claim, options);
    claim_unmatched > 0.0 && context_unmatched > 0.0
}

/// Classify one claim against the contexts. Priorities apply top-to-bottom
/// and stop at the first hit.
pub(crate) fn classify(
    claim: &str,
    contexts: &[String],
    threshold: f64,
    options: SimilarityOptions,
) -> ClaimAssessment {
    let mut support_score = 0.0;
    let mut best_context: Option<&String> = None;
    for context in contexts {
        let score = ngram_similarity(claim, context, options);
        if best_context.is_none() || score > support_score {
            support_score = score;
            best_context = Some(context);
        }
    }
    let avg_unmatched = modelbench_stats::mean(
        &contexts
            .iter()
            .map(|c| unmatched_ratio(claim, c, options))
            .collect::<Vec<_>>(),
    );

    let contradiction = best_context
        .map(|c| is_contradiction(claim, c, options))
        .unwrap_or(false);

    let hallucination_type = if support_score < FABRICATION_CUTOFF {
        HallucinationType::Fabrication
    } else if support_score < UNSUPPORTED_CUTOFF {
        HallucinationType::Unsupported
    } else if contradiction {
        HallucinationType::Contradiction
    } else if support_score < threshold {
        HallucinationType::PartialSupport
    } else if avg_unmatched > EXAGGERATION_CUTOFF {
        HallucinationType::Exaggeration
    } else {
        HallucinationType::None
    };

    let severity = match hallucination_type {
        HallucinationType::Fabrication => Severity::Critical,
        // The negation cue is a low-precision signal; when the claim is
        // otherwise fully supported it is the sole evidence, so severity
        // drops one notch
        HallucinationType::Contradiction => {
            if support_score >= threshold {
                Severity::High
            } else {
                Severity::Critical
            }
        }
        HallucinationType::Unsupported => Severity::High,
        HallucinationType::PartialSupport => Severity::Medium,
        HallucinationType::Exaggeration => Severity::Medium,
        HallucinationType::None => Severity::None,
    };

    ClaimAssessment {
        claim: claim.to_string(),
        hallucination_type,
        severity,
        support_score,
        unmatched_ratio: avg_unmatched,
    }
}

pub struct HallucinationAgent {
    ctx: AgentContext,
}

impl HallucinationAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for HallucinationAgent {
    fn agent_id(&self) -> &'static str {
        "hallucination-detector"
    }

    fn decision_type(&self) -> &'static str {
        "hallucination_assessment"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: HallucinationInput = parse_input(&input)?;
        parsed.validate()?;

        let assessments: Vec<ClaimAssessment> = parsed
            .claims
            .iter()
            .map(|claim| classify(claim, &parsed.contexts, parsed.threshold, parsed.options))
            .collect();

        let hallucinated = assessments
            .iter()
            .filter(|a| a.hallucination_type != HallucinationType::None)
            .count();
        let claim_count = assessments.len();
        let mean_support = modelbench_stats::mean(
            &assessments.iter().map(|a| a.support_score).collect::<Vec<_>>(),
        );

        let outputs = json!({
            "claims": assessments,
            "claims_total": claim_count,
            "hallucinated_count": hallucinated,
            "hallucination_rate": hallucinated as f64 / claim_count as f64,
            "threshold": parsed.threshold,
        });

        let factors = vec![
            ConfidenceFactor::new("context_coverage", 0.4, (parsed.contexts.len() as f64 / 3.0).min(1.0)),
            ConfidenceFactor::new("sample_size", 0.3, (claim_count as f64 / 10.0).min(1.0)),
            ConfidenceFactor::new("support_signal", 0.3, mean_support),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({"claims": claim_count, "contexts": parsed.contexts.len()}),
            outputs,
            factors,
            vec![],
            started,
        ))
    }
}
