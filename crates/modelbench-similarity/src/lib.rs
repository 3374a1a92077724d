//! Similarity kernel
//!
//! Text comparison primitives shared by the consistency, sensitivity,
//! hallucination, and golden-dataset agents. All operations NFC-normalize
//! and lowercase their inputs unless `case_sensitive` is set; runs of
//! whitespace collapse to a single space under `trim_whitespace`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Which similarity operation an agent asked for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    ExactMatch,
    #[default]
    Levenshtein,
    JaccardTokens,
    NgramSimilarity,
    KeywordOverlap,
}

/// Normalization switches applied before any comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SimilarityOptions {
    pub case_sensitive: bool,
    pub trim_whitespace: bool,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            trim_whitespace: true,
        }
    }
}

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("word regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Tokens shorter than this never participate in token-level measures.
const MIN_TOKEN_LEN: usize = 3;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "was", "were", "been", "being", "have", "has", "had",
        "this", "that", "these", "those", "with", "from", "into", "will", "would", "could",
        "should", "can", "may", "might", "must", "not", "but", "its", "his", "her", "their",
        "our", "your", "all", "any", "each", "more", "most", "some", "such", "than", "then",
        "too", "very", "also", "just", "about", "over", "under", "between", "out", "off",
    ]
    .into_iter()
    .collect()
});

static NEGATION_CUES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "not", "never", "no", "cannot", "can't", "won't", "isn't", "aren't", "wasn't",
        "weren't", "doesn't", "don't", "didn't", "shouldn't", "couldn't", "wouldn't",
        "neither", "nor", "none", "nothing",
    ]
});

/// Apply the normalization switches.
pub fn normalize(text: &str, options: SimilarityOptions) -> String {
    let mut out: String = text.nfc().collect();
    if !options.case_sensitive {
        out = out.to_lowercase();
    }
    if options.trim_whitespace {
        out = WHITESPACE_RE.replace_all(out.trim(), " ").into_owned();
    }
    out
}

/// Dispatch on the selected method.
pub fn similarity(a: &str, b: &str, method: SimilarityMethod, options: SimilarityOptions) -> f64 {
    match method {
        SimilarityMethod::ExactMatch => exact_match(a, b, options),
        SimilarityMethod::Levenshtein => normalized_levenshtein(a, b, options),
        SimilarityMethod::JaccardTokens => jaccard_tokens(a, b, options),
        SimilarityMethod::NgramSimilarity => ngram_similarity(a, b, options),
        SimilarityMethod::KeywordOverlap => keyword_overlap(a, b, options),
    }
}

/// 1.0 iff the strings are equal after normalization.
pub fn exact_match(a: &str, b: &str, options: SimilarityOptions) -> f64 {
    if normalize(a, options) == normalize(b, options) {
        1.0
    } else {
        0.0
    }
}

/// `1 - distance / max(len_a, len_b)` over normalized chars; both empty → 1.
pub fn normalized_levenshtein(a: &str, b: &str, options: SimilarityOptions) -> f64 {
    let a = normalize(a, options);
    let b = normalize(b, options);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(&a, &b) as f64 / max_len as f64
}

fn tokens(text: &str) -> HashSet<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Jaccard over word tokens of length ≥ 3.
pub fn jaccard_tokens(a: &str, b: &str, options: SimilarityOptions) -> f64 {
    jaccard(&tokens(&normalize(a, options)), &tokens(&normalize(b, options)))
}

fn char_ngrams(text: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        return HashSet::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

const NGRAM_SIZES: [usize; 4] = [2, 3, 4, 5];
const NGRAM_WEIGHTS: [f64; 4] = [0.2, 0.3, 0.3, 0.2];

/// Weighted Jaccard over character n-grams, n ∈ {2,3,4,5}.
pub fn ngram_similarity(a: &str, b: &str, options: SimilarityOptions) -> f64 {
    let a = normalize(a, options);
    let b = normalize(b, options);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut score = 0.0;
    for (&n, &w) in NGRAM_SIZES.iter().zip(NGRAM_WEIGHTS.iter()) {
        score += w * jaccard(&char_ngrams(&a, n), &char_ngrams(&b, n));
    }
    score.clamp(0.0, 1.0)
}

/// Jaccard over tokens of length ≥ 3 with stopwords removed.
pub fn keyword_overlap(a: &str, b: &str, options: SimilarityOptions) -> f64 {
    let keywords = |text: &str| -> HashSet<String> {
        tokens(text)
            .into_iter()
            .filter(|t| !STOPWORDS.contains(t.to_lowercase().as_str()))
            .collect()
    };
    jaccard(
        &keywords(&normalize(a, options)),
        &keywords(&normalize(b, options)),
    )
}

fn contains_negation(text: &str) -> bool {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .any(|m| NEGATION_CUES.contains(&m.as_str()))
        // Contracted cues carry an apostrophe, which \w+ splits
        || NEGATION_CUES
            .iter()
            .filter(|c| c.contains('\''))
            .any(|c| lowered.contains(c))
}

/// Contradiction heuristic: fires when exactly one side carries a negation
/// cue and the texts still overlap heavily (n-gram similarity ≥ 0.3).
///
/// A low-precision signal by construction: paraphrases using antonyms
/// without explicit negation ("rarely" vs "often") are not caught, and
/// negated restatements of unrelated content are. Callers downgrade
/// severity when this is the sole evidence.
pub fn contradicts(a: &str, b: &str, options: SimilarityOptions) -> bool {
    let neg_a = contains_negation(a);
    let neg_b = contains_negation(b);
    if neg_a == neg_b {
        return false;
    }
    ngram_similarity(a, b, options) >= 0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> SimilarityOptions {
        SimilarityOptions::default()
    }

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize("  Hello   World  ", opts()), "hello world");
        let case_sensitive = SimilarityOptions {
            case_sensitive: true,
            trim_whitespace: true,
        };
        assert_eq!(normalize("Hello  World", case_sensitive), "Hello World");
        let raw = SimilarityOptions {
            case_sensitive: true,
            trim_whitespace: false,
        };
        assert_eq!(normalize("a  b", raw), "a  b");
    }

    #[test]
    fn exact_match_post_normalization() {
        assert_eq!(exact_match("Hello World", "hello  world", opts()), 1.0);
        assert_eq!(exact_match("hello", "goodbye", opts()), 0.0);
    }

    #[test]
    fn levenshtein_identity_and_symmetry() {
        assert_eq!(normalized_levenshtein("abc", "abc", opts()), 1.0);
        assert_eq!(normalized_levenshtein("", "", opts()), 1.0);
        let ab = normalized_levenshtein("kitten", "sitting", opts());
        let ba = normalized_levenshtein("sitting", "kitten", opts());
        assert_eq!(ab, ba);
        // distance 3 over max len 7
        assert!((ab - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
    }

    #[test]
    fn jaccard_tokens_edges() {
        assert_eq!(jaccard_tokens("", "", opts()), 1.0);
        assert_eq!(jaccard_tokens("hello world", "", opts()), 0.0);
        assert_eq!(jaccard_tokens("hello world", "hello world", opts()), 1.0);
        // Tokens shorter than 3 chars are dropped: "is" and "a" do not count
        assert_eq!(
            jaccard_tokens("it is a cat", "it is a cat", opts()),
            1.0
        );
        assert!((jaccard_tokens("hello world", "goodbye world", opts()) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn exact_match_implies_unit_scores() {
        let (a, b) = ("The Quick Brown Fox", "the quick brown fox");
        assert_eq!(exact_match(a, b, opts()), 1.0);
        assert_eq!(normalized_levenshtein(a, b, opts()), 1.0);
        assert_eq!(jaccard_tokens(a, b, opts()), 1.0);
    }

    #[test]
    fn ngram_similarity_bounds() {
        assert_eq!(ngram_similarity("", "", opts()), 1.0);
        let same = ngram_similarity("paris is the capital", "paris is the capital", opts());
        assert!((same - 1.0).abs() < 1e-12);
        let close = ngram_similarity(
            "paris is the capital of france",
            "paris is the capital of germany",
            opts(),
        );
        assert!(close > 0.3 && close < 1.0);
        let far = ngram_similarity("alpha beta", "zzz qqq", opts());
        assert!(far < 0.1);
    }

    #[test]
    fn keyword_overlap_ignores_stopwords() {
        // "the" and "was" are stopwords; content words drive the score
        let score = keyword_overlap(
            "the deploy was successful",
            "the deploy was a failure",
            opts(),
        );
        assert!(score < 1.0);
        assert!(score > 0.0);
        assert_eq!(
            keyword_overlap("the the the", "and and and", opts()),
            1.0
        );
    }

    #[test]
    fn similarity_laws_hold_across_methods() {
        let methods = [
            SimilarityMethod::ExactMatch,
            SimilarityMethod::Levenshtein,
            SimilarityMethod::JaccardTokens,
            SimilarityMethod::NgramSimilarity,
            SimilarityMethod::KeywordOverlap,
        ];
        let samples = ["hello world", "the quick brown fox", ""];
        for method in methods {
            for x in samples {
                assert_eq!(similarity(x, x, method, opts()), 1.0, "{method:?} sim(x,x)");
                for y in samples {
                    let xy = similarity(x, y, method, opts());
                    let yx = similarity(y, x, method, opts());
                    assert!((xy - yx).abs() < 1e-12, "{method:?} symmetry");
                    assert!((0.0..=1.0).contains(&xy), "{method:?} range");
                }
            }
        }
    }

    #[test]
    fn contradiction_requires_one_sided_negation_and_overlap() {
        // One side negated, heavy overlap: fires
        assert!(contradicts(
            "the service is not available in europe",
            "the service is available in europe",
            opts()
        ));
        // Both sides negated: no signal
        assert!(!contradicts(
            "it is not ready",
            "it is not ready yet",
            opts()
        ));
        // Negation but unrelated text: no overlap, no signal
        assert!(!contradicts("never gonna happen", "quantum flux capacitor", opts()));
        // No negation on either side: never fires
        assert!(!contradicts(
            "paris is the capital of france",
            "paris is the capital of germany",
            opts()
        ));
    }

    #[test]
    fn contracted_negations_are_detected() {
        assert!(contains_negation("it won't work"));
        assert!(contains_negation("this isn't right"));
        assert!(contains_negation("never"));
        assert!(!contains_negation("nothingness aside, it works"));
    }
}
