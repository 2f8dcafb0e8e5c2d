//! Pattern cache configuration
//!
//! Settings load from TOML. Every field has a default so a partial file (or
//! no file at all) is valid. Durations are written as whole seconds.
//!
//! Credentials for the remote service are not part of the file; they come
//! from a [`CredentialProvider`].

use crate::sync::CredentialProvider;
use crate::types::PatternCategory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Environment variable holding the remote bearer token
pub const TOKEN_ENV_VAR: &str = "PATTERN_CACHE_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternCacheConfig {
    /// Global switch; a disabled cache never matches and never learns
    pub enabled: bool,

    /// Capacity of each category
    pub max_patterns_per_category: usize,

    /// Minimum similarity for a fuzzy match
    pub similarity_threshold: f64,

    /// Units credited per hit when the entry has no estimate of its own
    pub estimated_units_per_hit: u64,

    pub persistence: PersistenceConfig,

    pub sync: SyncConfig,
}

/// Local snapshot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,

    /// Snapshot file; `None` means the platform data directory
    pub path: Option<PathBuf>,

    /// Quiet period before a write (in seconds)
    #[serde(with = "serde_duration")]
    pub debounce: Duration,
}

/// Remote sync settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,

    /// Base URL of the pattern service
    pub endpoint: Option<String>,

    /// Time between sync cycles (in seconds)
    #[serde(with = "serde_duration")]
    pub interval: Duration,

    /// Delay before the first cycle (in seconds)
    #[serde(with = "serde_duration")]
    pub initial_delay: Duration,

    /// Per-request timeout (in seconds)
    #[serde(with = "serde_duration")]
    pub request_timeout: Duration,

    /// Categories exchanged with the remote
    pub categories: Vec<PatternCategory>,
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for PatternCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_patterns_per_category: 1000,
            similarity_threshold: 0.8,
            estimated_units_per_hit: 500,
            persistence: PersistenceConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            debounce: Duration::from_secs(5),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            interval: Duration::from_secs(1800), // 30 minutes
            initial_delay: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            categories: PatternCategory::ALL.to_vec(),
        }
    }
}

impl PatternCacheConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: PatternCacheConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// In-memory configuration (no persistence, no sync)
    pub fn in_memory() -> Self {
        Self {
            persistence: PersistenceConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_patterns_per_category == 0 || self.max_patterns_per_category > 100_000 {
            return Err(ConfigError::ValidationError(
                "max_patterns_per_category must be between 1 and 100000".to_string(),
            ));
        }

        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "similarity_threshold must be in (0, 1]".to_string(),
            ));
        }

        if self.persistence.debounce > Duration::from_secs(300) {
            return Err(ConfigError::ValidationError(
                "persistence.debounce must be at most 5 minutes".to_string(),
            ));
        }

        self.sync.validate()
    }

    /// Snapshot path, falling back to the platform data directory
    pub fn store_path(&self) -> PathBuf {
        self.persistence
            .path
            .clone()
            .unwrap_or_else(crate::storage::json_file::JsonFilePersistence::default_path)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

impl SyncConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < Duration::from_secs(60) {
            return Err(ConfigError::ValidationError(
                "sync.interval must be at least 1 minute".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "sync.request_timeout must be positive".to_string(),
            ));
        }

        if self.enabled {
            match self.endpoint.as_deref().map(str::trim) {
                Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {}
                Some(endpoint) => {
                    return Err(ConfigError::ValidationError(format!(
                        "sync.endpoint must be an http(s) URL, got '{}'",
                        endpoint
                    )))
                }
                None => {
                    return Err(ConfigError::ValidationError(
                        "sync.endpoint is required when sync is enabled".to_string(),
                    ))
                }
            }
        }

        Ok(())
    }
}

/// Token read from `PATTERN_CACHE_TOKEN` at each sync
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    var: Option<String>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from a different variable
    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: Some(var.into()) }
    }

    fn var_name(&self) -> &str {
        self.var.as_deref().unwrap_or(TOKEN_ENV_VAR)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn bearer_token(&self) -> Option<String> {
        match env::var(self.var_name()) {
            Ok(token) if !token.trim().is_empty() => {
                debug!("Using sync token from {} environment variable", self.var_name());
                Some(token.trim().to_string())
            }
            _ => None,
        }
    }
}

/// Fixed token (or none)
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<String>);

impl StaticCredentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone().filter(|token| !token.is_empty())
    }
}
