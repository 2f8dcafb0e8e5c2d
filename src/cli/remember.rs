//! Commands that change the store: remember, feedback, forget, clear

use pattern_cache::{PatternCacheError, PatternCategory, Result};
use std::io::{self, BufRead, Write};

use super::helpers::{load_config, open_cache, parse_pattern_id, pattern_input, GlobalOptions};

/// Handle the remember command
pub async fn remember(
    options: &GlobalOptions,
    input: String,
    output: String,
    category: PatternCategory,
    error_type: Option<String>,
    estimate: Option<u32>,
) -> Result<()> {
    let cache = open_cache(load_config(options)?, None).await?;
    let input = pattern_input(input, error_type);

    let id = match estimate {
        Some(units) => cache.remember_with_estimate(input, output, category, units),
        None => cache.remember(input, output, category),
    };

    match id {
        Some(id) => println!("Remembered pattern {}", id),
        None => {
            return Err(PatternCacheError::ValidationError(
                "Pattern was not stored (blank input or cache disabled)".to_string(),
            ))
        }
    }

    cache.shutdown().await
}

/// Handle the feedback command
pub async fn feedback(options: &GlobalOptions, id: &str, success: bool) -> Result<()> {
    let id = parse_pattern_id(id)?;
    let cache = open_cache(load_config(options)?, None).await?;

    if !cache.report_outcome(id, success) {
        return Err(PatternCacheError::PatternNotFound(id.to_string()));
    }
    if let Some(entry) = cache.get(id) {
        println!("Pattern {} effectiveness: {:.1}", id, entry.effectiveness);
    }

    cache.shutdown().await
}

/// Handle the forget command
pub async fn forget(options: &GlobalOptions, id: &str) -> Result<()> {
    let id = parse_pattern_id(id)?;
    let cache = open_cache(load_config(options)?, None).await?;

    if !cache.forget(id) {
        return Err(PatternCacheError::PatternNotFound(id.to_string()));
    }
    println!("Forgot pattern {}", id);

    cache.shutdown().await
}

/// Handle the clear command
pub async fn clear(options: &GlobalOptions, category: Option<PatternCategory>, yes: bool) -> Result<()> {
    let scope = category
        .map(|c| format!("all {} patterns", c))
        .unwrap_or_else(|| "ALL patterns".to_string());

    if !yes && !confirm(&format!("Remove {}? Type 'yes' to continue: ", scope))? {
        println!("Aborted");
        return Ok(());
    }

    let cache = open_cache(load_config(options)?, None).await?;
    let removed = cache.clear(category);
    println!("Removed {} patterns", removed);

    cache.shutdown().await
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
