//! Core data types for the pattern cache
//!
//! This module defines the values the store owns and hands out copies of:
//! pattern identities, categories, remembered entries, structured error
//! signatures and match results.

use crate::similarity::classifier::ErrorBucket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Namespace for deterministic (v5) pattern ids
const PATTERN_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d0f_3c2a_94be_4f5e_8a17_2c4b_91d0_e35f);

/// Effectiveness assigned to a freshly remembered pattern
pub const INITIAL_EFFECTIVENESS: f32 = 0.5;

/// Step applied on each success/failure report
pub const EFFECTIVENESS_STEP: f32 = 0.1;

/// Patterns at or above this effectiveness count as reliable
pub const RELIABLE_EFFECTIVENESS: f32 = 0.8;

/// Stable identifier for a remembered pattern
///
/// Derived from `(category, normalized input)` so that remembering the same
/// input twice lands on the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub Uuid);

impl PatternId {
    /// Derive the id for a normalized key within a category
    pub fn derive(category: PatternCategory, normalized_key: &str) -> Self {
        let name = format!("{}:{}", category.as_str(), normalized_key);
        Self(Uuid::new_v5(&PATTERN_ID_NAMESPACE, name.as_bytes()))
    }

    /// Parse a pattern ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Use case a pattern was produced for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// Generated code for a natural-language request
    CodeGeneration,

    /// Fixes for compiler/runtime errors
    ErrorResolution,

    /// Generated documentation
    Documentation,

    /// Features added to existing code
    FeatureAddition,

    /// Class skeletons
    ClassStructure,

    /// Method bodies
    MethodImplementation,
}

impl PatternCategory {
    /// Every category, in a stable order
    pub const ALL: [PatternCategory; 6] = [
        PatternCategory::CodeGeneration,
        PatternCategory::ErrorResolution,
        PatternCategory::Documentation,
        PatternCategory::FeatureAddition,
        PatternCategory::ClassStructure,
        PatternCategory::MethodImplementation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::CodeGeneration => "code_generation",
            PatternCategory::ErrorResolution => "error_resolution",
            PatternCategory::Documentation => "documentation",
            PatternCategory::FeatureAddition => "feature_addition",
            PatternCategory::ClassStructure => "class_structure",
            PatternCategory::MethodImplementation => "method_implementation",
        }
    }

    /// Whether lookups in this category are restricted to an error bucket
    pub fn is_bucketed(&self) -> bool {
        matches!(self, PatternCategory::ErrorResolution)
    }
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PatternCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        PatternCategory::ALL
            .into_iter()
            .find(|category| category.as_str().replace('_', "") == key)
            .ok_or_else(|| format!("unknown pattern category: {}", s))
    }
}

/// Normalize free text for identity purposes
///
/// Lowercases, trims and collapses whitespace runs, so formatting noise does
/// not produce distinct patterns.
pub fn normalize_input(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structured compiler/runtime error used for error-resolution patterns
///
/// File path and position are kept for display only; they never take part in
/// identity or similarity so the same defect class recurs across files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSignature {
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl ErrorSignature {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            file_path: None,
            line: None,
            column: None,
        }
    }

    /// Attach the location the error was reported at
    pub fn at(mut self, file_path: impl Into<String>, line: u32, column: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Coarse bucket this error belongs to
    pub fn bucket(&self) -> ErrorBucket {
        ErrorBucket::for_signature(self)
    }
}

/// What a caller looks up or remembers
#[derive(Debug, Clone, PartialEq)]
pub enum PatternInput {
    /// Free-form prompt text
    Text(String),

    /// Structured error (error-resolution flows)
    Error(ErrorSignature),
}

impl PatternInput {
    /// Text used for lexical similarity
    pub fn text(&self) -> &str {
        match self {
            PatternInput::Text(text) => text,
            PatternInput::Error(signature) => &signature.message,
        }
    }

    /// Bucket used to restrict candidates; only bucketed categories have one
    pub fn bucket(&self, category: PatternCategory) -> Option<ErrorBucket> {
        if !category.is_bucketed() {
            return None;
        }
        Some(match self {
            PatternInput::Text(text) => crate::similarity::classifier::classify_error(text),
            PatternInput::Error(signature) => signature.bucket(),
        })
    }

    /// Deterministic id of this input within `category`
    pub fn pattern_id(&self, category: PatternCategory) -> PatternId {
        let normalized = normalize_input(self.text());
        match self.bucket(category) {
            Some(bucket) => PatternId::derive(category, &format!("{}:{}", bucket, normalized)),
            None => PatternId::derive(category, &normalized),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }
}

impl From<&str> for PatternInput {
    fn from(text: &str) -> Self {
        PatternInput::Text(text.to_string())
    }
}

impl From<String> for PatternInput {
    fn from(text: String) -> Self {
        PatternInput::Text(text)
    }
}

impl From<ErrorSignature> for PatternInput {
    fn from(signature: ErrorSignature) -> Self {
        PatternInput::Error(signature)
    }
}

/// A remembered (input -> output) pair with usage statistics
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEntry {
    // === Identity ===
    pub id: PatternId,
    pub category: PatternCategory,

    // === Content ===
    /// Prompt text, or the error message for signature entries
    pub input: String,
    pub signature: Option<ErrorSignature>,
    /// Error bucket, present for bucketed categories only
    pub bucket: Option<ErrorBucket>,
    pub output: String,

    // === Feedback ===
    pub use_count: u32,
    /// Running estimate in [0, 1] of how often reuse worked out
    pub effectiveness: f32,
    /// Units (tokens) one reuse saves; falls back to the configured default
    pub estimated_units: Option<u32>,

    // === Lifecycle ===
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Last local or remote modification
    pub updated_at: DateTime<Utc>,
    /// Modified locally since the last successful remote sync
    pub dirty: bool,
    /// `updated_at` of the last copy downloaded from the remote
    pub remote_updated_at: Option<DateTime<Utc>>,
}

impl PatternEntry {
    /// Create a fresh, dirty entry
    pub fn new(category: PatternCategory, input: PatternInput, output: impl Into<String>) -> Self {
        let now = Utc::now();
        let id = input.pattern_id(category);
        let bucket = input.bucket(category);
        let (text, signature) = match input {
            PatternInput::Text(text) => (text, None),
            PatternInput::Error(signature) => (signature.message.clone(), Some(signature)),
        };

        Self {
            id,
            category,
            input: text,
            signature,
            bucket,
            output: output.into(),
            use_count: 1,
            effectiveness: INITIAL_EFFECTIVENESS,
            estimated_units: None,
            created_at: now,
            last_used_at: now,
            updated_at: now,
            dirty: true,
            remote_updated_at: None,
        }
    }

    pub fn with_estimated_units(mut self, units: u32) -> Self {
        self.estimated_units = Some(units);
        self
    }

    /// Input as it was remembered
    pub fn pattern_input(&self) -> PatternInput {
        match &self.signature {
            Some(signature) => PatternInput::Error(signature.clone()),
            None => PatternInput::Text(self.input.clone()),
        }
    }

    /// Record one reuse
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.use_count = self.use_count.saturating_add(1);
        self.last_used_at = now.max(self.created_at);
        self.updated_at = now.max(self.updated_at);
    }

    /// Nudge effectiveness toward 1 on success, toward 0 on failure
    pub fn adjust_effectiveness(&mut self, success: bool, now: DateTime<Utc>) {
        let delta = if success {
            EFFECTIVENESS_STEP
        } else {
            -EFFECTIVENESS_STEP
        };
        // Three decimals, so repeated steps land on exact tenths
        self.effectiveness = (((self.effectiveness + delta) * 1000.0).round() / 1000.0).clamp(0.0, 1.0);
        self.updated_at = now.max(self.updated_at);
        self.dirty = true;
    }

    pub fn is_reliable(&self) -> bool {
        self.effectiveness >= RELIABLE_EFFECTIVENESS
    }
}

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Similar,
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    /// Pass back to `report_outcome` after applying the output
    pub id: PatternId,
    pub category: PatternCategory,
    pub output: String,
    /// Similarity to the query (1.0 for exact hits)
    pub score: f64,
    pub kind: MatchKind,
    pub effectiveness: f32,
    pub use_count: u32,
    pub estimated_units: Option<u32>,
}

impl PatternMatch {
    pub(crate) fn from_entry(entry: &PatternEntry, score: f64, kind: MatchKind) -> Self {
        Self {
            id: entry.id,
            category: entry.category,
            output: entry.output.clone(),
            score,
            kind,
            effectiveness: entry.effectiveness,
            use_count: entry.use_count,
            estimated_units: entry.estimated_units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_id_is_deterministic() {
        let a = PatternInput::from("Create a  Block class").pattern_id(PatternCategory::CodeGeneration);
        let b = PatternInput::from("create a block class ").pattern_id(PatternCategory::CodeGeneration);
        assert_eq!(a, b);
    }

    #[test]
    fn test_pattern_id_depends_on_category() {
        let input = PatternInput::from("create a block class");
        assert_ne!(
            input.pattern_id(PatternCategory::CodeGeneration),
            input.pattern_id(PatternCategory::Documentation)
        );
    }

    #[test]
    fn test_error_signature_id_ignores_location() {
        let a = ErrorSignature::new("syntax", "';' expected").at("src/A.java", 3, 14);
        let b = ErrorSignature::new("syntax", "';' expected").at("src/B.java", 90, 2);
        assert_eq!(
            PatternInput::from(a).pattern_id(PatternCategory::ErrorResolution),
            PatternInput::from(b).pattern_id(PatternCategory::ErrorResolution)
        );
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            "error_resolution".parse::<PatternCategory>().unwrap(),
            PatternCategory::ErrorResolution
        );
        assert_eq!(
            "ClassStructure".parse::<PatternCategory>().unwrap(),
            PatternCategory::ClassStructure
        );
        assert_eq!(
            "method-implementation".parse::<PatternCategory>().unwrap(),
            PatternCategory::MethodImplementation
        );
        assert!("refactoring".parse::<PatternCategory>().is_err());
    }

    #[test]
    fn test_new_entry_defaults() {
        let entry = PatternEntry::new(PatternCategory::CodeGeneration, "make a sword".into(), "class Sword {}");
        assert_eq!(entry.use_count, 1);
        assert_eq!(entry.effectiveness, INITIAL_EFFECTIVENESS);
        assert!(entry.dirty);
        assert!(entry.bucket.is_none());
        assert!(entry.last_used_at >= entry.created_at);
    }

    #[test]
    fn test_effectiveness_is_clamped() {
        let mut entry = PatternEntry::new(PatternCategory::CodeGeneration, "x".into(), "y");
        for _ in 0..20 {
            entry.adjust_effectiveness(true, Utc::now());
        }
        assert_eq!(entry.effectiveness, 1.0);
        assert!(entry.is_reliable());

        for _ in 0..20 {
            entry.adjust_effectiveness(false, Utc::now());
        }
        assert_eq!(entry.effectiveness, 0.0);
        assert!(!entry.is_reliable());
    }

    #[test]
    fn test_normalize_input() {
        assert_eq!(normalize_input("  Foo\tBAR \n baz "), "foo bar baz");
        assert_eq!(normalize_input("   "), "");
    }
}
