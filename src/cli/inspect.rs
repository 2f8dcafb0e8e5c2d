//! Read-only commands: stats and list

use pattern_cache::{PatternCategory, Result};

use super::helpers::{load_config, open_cache, truncate, GlobalOptions};
use crate::OutputFormat;

/// Handle the stats command
pub async fn stats(options: &GlobalOptions, format: OutputFormat) -> Result<()> {
    let config = load_config(options)?;
    let store_path = config.store_path();
    let cache = open_cache(config, None).await?;
    let metrics = cache.metrics();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        OutputFormat::Text => {
            println!("Pattern store: {}", store_path.display());
            println!(
                "Patterns: {} ({} reliable, {} unsynced)",
                metrics.total_patterns, metrics.reliable_patterns, metrics.dirty_patterns
            );
            for (category, count) in &metrics.per_category_counts {
                println!("  {:<22} {}", category, count);
            }
        }
    }

    cache.shutdown().await
}

/// Handle the list command
pub async fn list(
    options: &GlobalOptions,
    category: Option<PatternCategory>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let cache = open_cache(load_config(options)?, None).await?;

    let mut patterns = cache.patterns(category);
    patterns.sort_by(|a, b| b.use_count.cmp(&a.use_count).then(a.id.cmp(&b.id)));
    patterns.truncate(limit);

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = patterns
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id.to_string(),
                        "category": p.category,
                        "input": p.input,
                        "bucket": p.bucket,
                        "output": p.output,
                        "use_count": p.use_count,
                        "effectiveness": p.effectiveness,
                        "last_used_at": p.last_used_at,
                        "dirty": p.dirty,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "patterns": json,
                    "count": json.len()
                })
            );
        }
        OutputFormat::Text if patterns.is_empty() => println!("No patterns stored"),
        OutputFormat::Text => {
            for (i, p) in patterns.iter().enumerate() {
                println!(
                    "{}. [{}] {} (uses: {}, effectiveness: {:.1})",
                    i + 1,
                    p.category,
                    truncate(&p.input, 60),
                    p.use_count,
                    p.effectiveness
                );
                println!("   ID: {}", p.id);
                println!("   Output: {}\n", truncate(&p.output, 100));
            }
        }
    }

    cache.shutdown().await
}
