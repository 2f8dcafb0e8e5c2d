//! One-shot sync command

use pattern_cache::{
    CredentialProvider, EnvCredentials, HttpPatternClient, PatternCacheError, RemotePatternClient, Result,
};
use std::sync::Arc;

use super::helpers::{load_config, open_cache, GlobalOptions};
use crate::OutputFormat;

/// Handle the sync command
pub async fn handle(options: &GlobalOptions, endpoint: Option<String>, format: OutputFormat) -> Result<()> {
    let config = load_config(options)?;

    let endpoint = endpoint.or_else(|| config.sync.endpoint.clone()).ok_or_else(|| {
        PatternCacheError::ValidationError("No sync endpoint: pass --endpoint or set sync.endpoint".to_string())
    })?;
    let client: Arc<dyn RemotePatternClient> =
        Arc::new(HttpPatternClient::new(endpoint, Some(config.sync.request_timeout))?);
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentials::new());

    let cache = open_cache(config, Some((client, credentials))).await?;
    let run = cache.sync_now().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run)?),
        OutputFormat::Text => match &run.report {
            Some(report) if report.skipped_unauthenticated => {
                println!("Not signed in: set PATTERN_CACHE_TOKEN to sync")
            }
            Some(report) if report.auth_rejected => println!("Sync token was rejected by the remote"),
            Some(report) => {
                println!("Sync {:?}", run.status);
                println!("  Uploaded:   {}", report.uploaded);
                println!(
                    "  Downloaded: {} ({} new, {} replaced, {} kept local)",
                    report.downloaded, report.merge.inserted, report.merge.replaced, report.merge.kept_local
                );
                if let Some(e) = &report.upload_error {
                    println!("  Upload failed: {}", e);
                }
                if let Some(e) = &report.download_error {
                    println!("  Download failed: {}", e);
                }
            }
            None => println!("Sync failed: {}", run.error.as_deref().unwrap_or("unknown error")),
        },
    }

    cache.shutdown().await
}
