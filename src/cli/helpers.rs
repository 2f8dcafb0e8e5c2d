//! Shared helper functions for CLI commands

use pattern_cache::{
    CredentialProvider, ErrorSignature, PatternCache, PatternCacheConfig, PatternCacheError, PatternId,
    PatternInput, RemotePatternClient, Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Flags shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub store: Option<PathBuf>,
}

/// Configuration from `--config` (or defaults) with `--store` applied
pub fn load_config(options: &GlobalOptions) -> Result<PatternCacheConfig> {
    let mut config = match &options.config {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            PatternCacheConfig::from_file(path)?
        }
        None => PatternCacheConfig::default(),
    };

    if let Some(store) = &options.store {
        config.persistence.enabled = true;
        config.persistence.path = Some(store.clone());
    }

    Ok(config)
}

/// Open the cache on the persisted snapshot, without background tasks
pub async fn open_cache(
    config: PatternCacheConfig,
    remote: Option<(Arc<dyn RemotePatternClient>, Arc<dyn CredentialProvider>)>,
) -> Result<Arc<PatternCache>> {
    debug!("Using pattern store {}", config.store_path().display());

    let mut builder = PatternCache::builder(config).background_tasks(false);
    if let Some((client, credentials)) = remote {
        builder = builder.remote(client, credentials);
    }
    builder.start().await
}

pub fn parse_pattern_id(id: &str) -> Result<PatternId> {
    PatternId::from_string(id.trim())
        .map_err(|e| PatternCacheError::ValidationError(format!("Invalid pattern id '{}': {}", id, e)))
}

/// Free text, or an error signature when `error_type` is given
pub fn pattern_input(input: String, error_type: Option<String>) -> PatternInput {
    match error_type {
        Some(error_type) => ErrorSignature::new(error_type, input).into(),
        None => input.into(),
    }
}

/// Shorten `s` to `max_chars` characters, appending an ellipsis
pub fn truncate(s: &str, max_chars: usize) -> String {
    let single_line = s.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
