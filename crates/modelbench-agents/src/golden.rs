//! Golden-dataset validator: compare candidate outputs against golden
//! references

use crate::parse_input;
use crate::registry::{Agent, AgentContext, AgentOutcome};
use async_trait::async_trait;
use modelbench_core::{ConfidenceFactor, Result, Validator};
use modelbench_similarity::{
    SimilarityMethod, SimilarityOptions, exact_match, similarity,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoldenInput {
    pub samples: Vec<GoldenSample>,
    #[serde(default)]
    pub thresholds: MatchThresholds,
    #[serde(default)]
    pub similarity_method: SimilarityMethod,
    #[serde(default)]
    pub options: SimilarityOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoldenSample {
    pub golden: String,
    pub candidate: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchThresholds {
    /// Similarity at or above which a pair matches semantically
    pub semantic: f64,
    /// Similarity at or above which a pair matches partially
    pub partial: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            semantic: 0.85,
            partial: 0.5,
        }
    }
}

impl GoldenInput {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.require(!self.samples.is_empty(), "samples", "must not be empty");
        v.require(
            (0.0..=1.0).contains(&self.thresholds.semantic),
            "thresholds.semantic",
            "must be within 0..1",
        );
        v.require(
            (0.0..=1.0).contains(&self.thresholds.partial),
            "thresholds.partial",
            "must be within 0..1",
        );
        v.require(
            self.thresholds.partial <= self.thresholds.semantic,
            "thresholds.partial",
            "must not exceed thresholds.semantic",
        );
        for (i, sample) in self.samples.iter().enumerate() {
            v.require(
                !sample.golden.is_empty(),
                format!("samples[{}].golden", i),
                "must not be empty",
            );
        }
        Ok(v.finish()?)
    }
}

/// Classification priority order; the walk stops at the first hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Semantic,
    Partial,
    Structural,
    NoMatch,
    Error,
}

impl MatchType {
    pub fn passed(&self) -> bool {
        matches!(self, MatchType::Exact | MatchType::Semantic | MatchType::Structural)
    }

    fn severity(&self) -> &'static str {
        match self {
            MatchType::Exact | MatchType::Semantic | MatchType::Structural => "none",
            MatchType::Partial => "minor",
            MatchType::NoMatch => "major",
            MatchType::Error => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub match_type: MatchType,
    pub passed: bool,
    pub severity: &'static str,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Shape signature of a JSON document: object keys and nesting, with
/// scalar values erased. Two documents match structurally when their
/// signatures agree even though their values differ.
fn structure_signature(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(structure_signature).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<_> = map.iter().collect();
            keys.sort_by_key(|(k, _)| k.clone());
            let inner: Vec<String> = keys
                .iter()
                .map(|(k, v)| format!("{}:{}", k, structure_signature(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
    }
}

fn structural_match(golden: &str, candidate: &str) -> bool {
    let golden_json: Value = match serde_json::from_str::<Value>(golden) {
        Ok(v) if v.is_object() || v.is_array() => v,
        _ => return false,
    };
    let candidate_json: Value = match serde_json::from_str::<Value>(candidate) {
        Ok(v) if v.is_object() || v.is_array() => v,
        _ => return false,
    };
    structure_signature(&golden_json) == structure_signature(&candidate_json)
}

/// Walk the match types in fixed priority order.
pub(crate) fn classify(
    sample: &GoldenSample,
    thresholds: MatchThresholds,
    method: SimilarityMethod,
    options: SimilarityOptions,
) -> SampleResult {
    let (match_type, score) = if sample.candidate.trim().is_empty() {
        (MatchType::Error, 0.0)
    } else if exact_match(&sample.golden, &sample.candidate, options) == 1.0 {
        (MatchType::Exact, 1.0)
    } else {
        let score = similarity(&sample.golden, &sample.candidate, method, options);
        if score >= thresholds.semantic {
            (MatchType::Semantic, score)
        } else if score >= thresholds.partial {
            (MatchType::Partial, score)
        } else if structural_match(&sample.golden, &sample.candidate) {
            (MatchType::Structural, score)
        } else {
            (MatchType::NoMatch, score)
        }
    };

    SampleResult {
        match_type,
        passed: match_type.passed(),
        severity: match_type.severity(),
        score,
        category: sample.category.clone(),
    }
}

pub struct GoldenDatasetAgent {
    ctx: AgentContext,
}

impl GoldenDatasetAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Agent for GoldenDatasetAgent {
    fn agent_id(&self) -> &'static str {
        "golden-dataset-validator"
    }

    fn decision_type(&self) -> &'static str {
        "golden_validation"
    }

    #[instrument(skip(self, input))]
    async fn handle(&self, input: Value) -> Result<AgentOutcome> {
        let started = Instant::now();
        let parsed: GoldenInput = parse_input(&input)?;
        parsed.validate()?;

        let results: Vec<SampleResult> = parsed
            .samples
            .iter()
            .map(|sample| {
                classify(
                    sample,
                    parsed.thresholds,
                    parsed.similarity_method,
                    parsed.options,
                )
            })
            .collect();

        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();

        let mut by_match_type: BTreeMap<MatchType, usize> = BTreeMap::new();
        let mut by_category: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for result in &results {
            *by_match_type.entry(result.match_type).or_default() += 1;
            if let Some(category) = &result.category {
                let entry = by_category.entry(category.clone()).or_default();
                entry.0 += 1;
                if result.passed {
                    entry.1 += 1;
                }
            }
        }
        let by_match_type: BTreeMap<String, usize> = by_match_type
            .into_iter()
            .map(|(k, v)| (serde_json::to_string(&k).unwrap_or_default().replace('"', ""), v))
            .collect();
        let by_category: BTreeMap<String, Value> = by_category
            .into_iter()
            .map(|(k, (t, p))| {
                (
                    k,
                    json!({"total": t, "passed": p, "pass_rate": p as f64 / t as f64}),
                )
            })
            .collect();

        let outputs = json!({
            "samples": results,
            "total": total,
            "passed": passed,
            "pass_rate": passed as f64 / total as f64,
            "by_match_type": by_match_type,
            "by_category": by_category,
        });

        let factors = vec![
            ConfidenceFactor::new("sample_size", 0.6, (total as f64 / 20.0).min(1.0)),
            ConfidenceFactor::new(
                "classification_margin",
                0.4,
                (parsed.thresholds.semantic - parsed.thresholds.partial).min(1.0),
            ),
        ];

        Ok(self.ctx.emit(
            self.agent_id(),
            self.agent_version(),
            self.decision_type(),
            &input,
            json!({"samples": total}),
            outputs,
            factors,
            vec![],
            started,
        ))
    }
}
