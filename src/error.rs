//! Error types for the pattern cache
//!
//! This module provides structured error definitions using thiserror. Errors
//! raised by the store, persistence and sync layers are propagated as
//! `Result`s; the `PatternCache` facade absorbs them and degrades to a miss.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for pattern cache operations
#[derive(Error, Debug)]
pub enum PatternCacheError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network request failed (connect, timeout, body decode)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Remote rejected our credentials
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Remote asked us to back off
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Remote returned an unexpected status
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// A store lock was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Pattern not found
    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for pattern cache operations
pub type Result<T> = std::result::Result<T, PatternCacheError>;

impl From<anyhow::Error> for PatternCacheError {
    fn from(err: anyhow::Error) -> Self {
        PatternCacheError::Other(format!("{:#}", err))
    }
}

impl PatternCacheError {
    /// Whether a sync attempt failing with this error is worth retrying
    /// within the same cycle
    pub fn is_retryable(&self) -> bool {
        match self {
            PatternCacheError::RateLimitExceeded(_) => true,
            PatternCacheError::NetworkError(msg) => msg.contains("timed out") || msg.contains("timeout"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PatternCacheError::PatternNotFound("test-id".to_string());
        assert_eq!(err.to_string(), "Pattern not found: test-id");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json");
        assert!(json_err.is_err());

        let err: PatternCacheError = json_err.unwrap_err().into();
        assert!(matches!(err, PatternCacheError::Serialization(_)));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(PatternCacheError::RateLimitExceeded("slow down".into()).is_retryable());
        assert!(PatternCacheError::NetworkError("operation timed out".into()).is_retryable());
        assert!(!PatternCacheError::AuthenticationError("bad token".into()).is_retryable());
        assert!(!PatternCacheError::NetworkError("connection refused".into()).is_retryable());
    }
}
