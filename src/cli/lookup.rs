//! Lookup command

use pattern_cache::{PatternCategory, Result};

use super::helpers::{load_config, open_cache, pattern_input, GlobalOptions};
use crate::OutputFormat;

/// Handle the lookup command
pub async fn handle(
    options: &GlobalOptions,
    input: String,
    category: PatternCategory,
    threshold: Option<f64>,
    error_type: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let cache = open_cache(load_config(options)?, None).await?;
    let input = pattern_input(input, error_type);
    let hit = cache.try_match(input, category, threshold);

    match (format, &hit) {
        (OutputFormat::Json, _) => println!("{}", serde_json::to_string_pretty(&hit)?),
        (OutputFormat::Text, Some(hit)) => {
            println!(
                "{:?} match (score: {:.2}, effectiveness: {:.1}, uses: {})",
                hit.kind, hit.score, hit.effectiveness, hit.use_count
            );
            println!("ID: {}\n", hit.id);
            println!("{}", hit.output);
        }
        (OutputFormat::Text, None) => println!("No pattern found in {}", category),
    }

    cache.shutdown().await
}
