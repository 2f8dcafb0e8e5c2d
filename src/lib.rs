//! Pattern Cache - similarity-based memory for expensive AI calls
//!
//! Remembers (input -> output) pairs produced by code generation, error
//! fixing, documentation and feature flows, and serves near-identical future
//! requests from memory instead of calling the external service again.
//!
//! # Architecture
//!
//! - **Types**: Core data structures (PatternEntry, PatternCategory, ErrorSignature)
//! - **Similarity**: Pluggable scorer (lexical Jaccard by default) and error bucketing
//! - **Storage**: Category-partitioned store, JSON snapshots, debounced writer
//! - **Sync**: Upload/download of dirty patterns against a remote service
//! - **Cache**: The facade callers use
//!
//! # Example
//!
//! ```ignore
//! use pattern_cache::{PatternCache, PatternCacheConfig, PatternCategory};
//!
//! #[tokio::main]
//! async fn main() -> pattern_cache::Result<()> {
//!     let cache = PatternCache::builder(PatternCacheConfig::default()).start().await?;
//!
//!     let output = match cache.try_match("create a ruby sword", PatternCategory::CodeGeneration, None) {
//!         Some(hit) => hit.output,
//!         None => {
//!             let generated = call_model("create a ruby sword").await;
//!             cache.remember("create a ruby sword", generated.clone(), PatternCategory::CodeGeneration);
//!             generated
//!         }
//!     };
//!
//!     cache.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod similarity;
pub mod storage;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use cache::{PatternCache, PatternCacheBuilder};
pub use config::{EnvCredentials, PatternCacheConfig, StaticCredentials};
pub use error::{PatternCacheError, Result};
pub use metrics::MetricsSnapshot;
pub use similarity::{ErrorBucket, JaccardScorer, SimilarityScorer};
pub use storage::{JsonFilePersistence, PatternPersistence, PatternRecord, PatternStore};
pub use sync::{CredentialProvider, HttpPatternClient, RemotePatternClient, SyncReport, SyncWorker};
pub use types::{
    ErrorSignature, MatchKind, PatternCategory, PatternEntry, PatternId, PatternInput, PatternMatch,
};
