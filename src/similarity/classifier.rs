//! Error message classification
//!
//! Buckets compiler/runtime errors into a handful of coarse classes. Error
//! patterns are only ever compared within a bucket.

use crate::types::ErrorSignature;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Coarse error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorBucket {
    Syntax,
    UndefinedSymbol,
    TypeMismatch,
    NullReference,
    DuplicateDefinition,
    Other,
}

impl ErrorBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorBucket::Syntax => "syntax",
            ErrorBucket::UndefinedSymbol => "undefined-symbol",
            ErrorBucket::TypeMismatch => "type-mismatch",
            ErrorBucket::NullReference => "null-reference",
            ErrorBucket::DuplicateDefinition => "duplicate-definition",
            ErrorBucket::Other => "other",
        }
    }

    /// Interpret an `error_type` string that already names a bucket
    ///
    /// Accepts the canonical labels along with `_`/space separated and
    /// `-error` suffixed spellings (`syntax_error`, `null pointer`, ...).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase().replace(['_', ' '], "-");
        let label = label.strip_suffix("-error").unwrap_or(&label);

        match label {
            "syntax" => Some(ErrorBucket::Syntax),
            "undefined-symbol" | "unresolved-symbol" | "undefined" | "unresolved" => {
                Some(ErrorBucket::UndefinedSymbol)
            }
            "type-mismatch" | "type" => Some(ErrorBucket::TypeMismatch),
            "null-reference" | "null-pointer" | "null" => Some(ErrorBucket::NullReference),
            "duplicate-definition" | "duplicate" => Some(ErrorBucket::DuplicateDefinition),
            "other" | "general" | "unknown" => Some(ErrorBucket::Other),
            _ => None,
        }
    }

    /// Bucket of a signature: its `error_type` if that names a bucket,
    /// otherwise whatever the message classifies as
    pub fn for_signature(signature: &ErrorSignature) -> Self {
        Self::from_label(&signature.error_type).unwrap_or_else(|| classify_error(&signature.message))
    }
}

impl std::fmt::Display for ErrorBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first match wins.
static BUCKET_PATTERNS: Lazy<Vec<(ErrorBucket, Regex)>> = Lazy::new(|| {
    vec![
        (
            ErrorBucket::DuplicateDefinition,
            Regex::new(r"(?i)(already defined|already declared|duplicate (class|definition|declaration|variable|method|field)|redefinition of|defined multiple times)")
                .expect("valid duplicate-definition regex"),
        ),
        (
            ErrorBucket::TypeMismatch,
            Regex::new(r"(?i)(incompatible types|inconvertible types|type mismatch|mismatched types|cannot be converted to|cannot be applied to|bad operand type|classcastexception|cannot cast)")
                .expect("valid type-mismatch regex"),
        ),
        (
            ErrorBucket::UndefinedSymbol,
            Regex::new(r"(?i)(cannot find symbol|cannot resolve (symbol|method|class)|symbol not found|undefined (symbol|variable|reference|method)|is not defined|unresolved (reference|import|symbol)|package \S+ does not exist)")
                .expect("valid undefined-symbol regex"),
        ),
        (
            ErrorBucket::NullReference,
            Regex::new(r"(?i)(nullpointerexception|null pointer|null reference|\bnpe\b|because .* is null)")
                .expect("valid null-reference regex"),
        ),
        (
            ErrorBucket::Syntax,
            Regex::new(r"(?i)(syntax error|unexpected token|illegal start of (expression|type)|'[^']+' expected|missing semicolon|unclosed (string|comment|literal)|reached end of file while parsing)")
                .expect("valid syntax regex"),
        ),
    ]
});

/// Classify an error message into a bucket
pub fn classify_error(message: &str) -> ErrorBucket {
    BUCKET_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(message))
        .map(|(bucket, _)| *bucket)
        .unwrap_or(ErrorBucket::Other)
}
