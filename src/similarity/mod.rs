//! Text similarity scoring
//!
//! The reference scorer is lexical (Jaccard over lowercase alphanumeric
//! tokens). Everything that ranks candidates goes through the
//! [`SimilarityScorer`] trait, so an embedding-backed scorer can be plugged
//! in without touching the store or its callers.

pub mod classifier;

use crate::types::{normalize_input, ErrorSignature};
use std::collections::HashSet;

pub use classifier::{classify_error, ErrorBucket};

/// Capability for scoring how alike two strings are
///
/// Implementations must return a value in `[0, 1]`, be symmetric, and score
/// a non-empty string against itself as `1.0`.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;

    /// Scorer name (for logging)
    fn name(&self) -> &str {
        "custom"
    }
}

/// Jaccard similarity over lowercase alphanumeric tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardScorer;

impl SimilarityScorer for JaccardScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        jaccard(a, b)
    }

    fn name(&self) -> &str {
        "jaccard"
    }
}

/// Split text into its set of lowercase alphanumeric tokens
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` of the token sets
///
/// Strings without any tokens (punctuation only) fall back to comparing
/// their normalized form, which keeps the function reflexive for them.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);

    if tokens_a.is_empty() && tokens_b.is_empty() {
        let (na, nb) = (normalize_input(a), normalize_input(b));
        return if !na.is_empty() && na == nb { 1.0 } else { 0.0 };
    }

    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;

    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Compare two error signatures
///
/// Signatures in different buckets never match. Within a bucket the score is
/// the lexical similarity of the messages; file path and position are
/// ignored.
pub fn signature_similarity(scorer: &dyn SimilarityScorer, a: &ErrorSignature, b: &ErrorSignature) -> f64 {
    if a.bucket() != b.bucket() {
        return 0.0;
    }
    scorer.score(&a.message, &b.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_strings() {
        assert_eq!(jaccard("Register a new block", "register a NEW block"), 1.0);
    }

    #[test]
    fn test_empty_strings() {
        assert_eq!(jaccard("", "something"), 0.0);
        assert_eq!(jaccard("something", ""), 0.0);
        assert_eq!(jaccard("", ""), 0.0);
    }

    #[test]
    fn test_punctuation_only_is_reflexive() {
        assert_eq!(jaccard(";;", ";;"), 1.0);
        assert_eq!(jaccard(";;", "{}"), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        // {a, b, c} vs {a, b, d}: 2 shared out of 4
        assert_eq!(jaccard("a b c", "a b d"), 0.5);
        assert_eq!(jaccard("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_tokenize_splits_on_symbols() {
        let tokens = tokenize("Item.register(ModItems::SWORD);");
        assert!(tokens.contains("item"));
        assert!(tokens.contains("register"));
        assert!(tokens.contains("moditems"));
        assert!(tokens.contains("sword"));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_signature_similarity_requires_same_bucket() {
        let scorer = JaccardScorer;
        let a = ErrorSignature::new("syntax", "missing semicolon at line 5");
        let b = ErrorSignature::new("syntax", "missing semicolon at line 42");
        let c = ErrorSignature::new("null-reference", "missing semicolon at line 5");

        assert!(signature_similarity(&scorer, &a, &b) > 0.5);
        assert_eq!(signature_similarity(&scorer, &a, &c), 0.0);
    }

    proptest! {
        #[test]
        fn prop_jaccard_is_symmetric(a in "[a-z ;.]{0,40}", b in "[a-z ;.]{0,40}") {
            prop_assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        }

        #[test]
        fn prop_jaccard_in_unit_range(a in ".{0,40}", b in ".{0,40}") {
            let score = jaccard(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_jaccard_is_reflexive(a in "[a-zA-Z0-9]{1,10}( [a-zA-Z0-9]{1,10}){0,5}") {
            prop_assert_eq!(jaccard(&a, &a), 1.0);
        }
    }
}
