//! pattern-cache - operator CLI for the pattern cache
//!
//! Inspects and edits the persisted pattern snapshot and triggers one-shot
//! remote syncs.

mod cli;

use clap::{Parser, Subcommand, ValueEnum};
use pattern_cache::PatternCategory;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "pattern-cache")]
#[command(about = "Inspect and maintain the AI pattern cache", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Pattern snapshot file (overrides the config file and default location)
    #[arg(long, env = "PATTERN_CACHE_STORE")]
    store: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pattern counts and hit statistics
    Stats {
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List stored patterns
    List {
        /// Only this category
        #[arg(short, long)]
        category: Option<PatternCategory>,

        /// Maximum number of patterns to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Look up the remembered output for an input
    Lookup {
        /// Prompt text, or the error message when --error-type is given
        input: String,

        #[arg(short, long, default_value = "code_generation")]
        category: PatternCategory,

        /// Minimum similarity for a fuzzy match
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Treat the input as an error message of this type
        #[arg(long)]
        error_type: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remember an output for an input
    Remember {
        input: String,

        output: String,

        #[arg(short, long, default_value = "code_generation")]
        category: PatternCategory,

        /// Treat the input as an error message of this type
        #[arg(long)]
        error_type: Option<String>,

        /// Units (tokens) a future hit saves
        #[arg(long)]
        estimate: Option<u32>,
    },

    /// Report whether reusing a pattern worked
    Feedback {
        id: String,

        #[arg(value_enum)]
        outcome: Outcome,
    },

    /// Remove one pattern
    Forget { id: String },

    /// Remove all patterns, or those of one category
    Clear {
        #[arg(short, long)]
        category: Option<PatternCategory>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Run one sync cycle against the remote pattern service
    Sync {
        /// Remote base URL (overrides the config file)
        #[arg(long)]
        endpoint: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::new(format!(
        "pattern_cache={},reqwest=warn,hyper=warn",
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("pattern-cache v{} starting...", env!("CARGO_PKG_VERSION"));

    let options = cli::helpers::GlobalOptions {
        config: cli.config,
        store: cli.store,
    };

    match cli.command {
        Commands::Stats { format } => cli::inspect::stats(&options, format).await?,
        Commands::List {
            category,
            limit,
            format,
        } => cli::inspect::list(&options, category, limit, format).await?,
        Commands::Lookup {
            input,
            category,
            threshold,
            error_type,
            format,
        } => cli::lookup::handle(&options, input, category, threshold, error_type, format).await?,
        Commands::Remember {
            input,
            output,
            category,
            error_type,
            estimate,
        } => cli::remember::remember(&options, input, output, category, error_type, estimate).await?,
        Commands::Feedback { id, outcome } => {
            cli::remember::feedback(&options, &id, matches!(outcome, Outcome::Success)).await?
        }
        Commands::Forget { id } => cli::remember::forget(&options, &id).await?,
        Commands::Clear { category, yes } => cli::remember::clear(&options, category, yes).await?,
        Commands::Sync { endpoint, format } => cli::sync::handle(&options, endpoint, format).await?,
    }

    Ok(())
}
