//! Storage layer for the pattern cache
//!
//! Provides the authoritative in-memory [`PatternStore`], the persistence
//! abstraction used to snapshot it to disk, and the debounced writer that
//! keeps the on-disk copy current without blocking callers.

pub mod json_file;
pub mod store;
pub mod writer;

use crate::error::{PatternCacheError, Result};
use crate::types::{
    ErrorSignature, PatternCategory, PatternEntry, PatternId, PatternInput, INITIAL_EFFECTIVENESS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

pub use json_file::JsonFilePersistence;
pub use store::{InsertOutcome, MergeReport, PatternStore, StoreOptions, StoreSummary};
pub use writer::{PersistenceHandle, PersistenceWriter};

/// Persistence backend trait defining all required operations
///
/// Implementations do blocking I/O; callers run them off the async
/// executor (see [`PersistenceWriter`]).
pub trait PatternPersistence: Send + Sync {
    /// Load every readable entry; malformed records are skipped
    fn load(&self) -> Result<LoadOutcome>;

    /// Replace the persisted snapshot atomically
    fn save(&self, entries: &[PatternEntry]) -> Result<()>;

    /// Human-readable location (for logging)
    fn location(&self) -> String;

    /// Move an unreadable snapshot aside so it is not overwritten
    fn quarantine(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Result of loading a snapshot
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub entries: Vec<PatternEntry>,

    /// Number of records that could not be decoded
    pub skipped: usize,
}

/// Serialized shape of a pattern, on disk and on the wire
///
/// Everything except `category` and `output` is optional so older files and
/// partial remote payloads still load. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PatternId>,

    pub category: PatternCategory,

    #[serde(default)]
    pub input: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<ErrorSignature>,

    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_units: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,

    /// Local bookkeeping for the download watermark; never uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_updated_at: Option<DateTime<Utc>>,
}

impl PatternRecord {
    /// Turn a decoded record into a store entry, filling defaults
    pub fn into_entry(self) -> Result<PatternEntry> {
        let input = match self.signature {
            Some(signature) => PatternInput::Error(signature),
            None => PatternInput::Text(self.input),
        };
        if input.is_empty() {
            return Err(PatternCacheError::ValidationError(
                "pattern record has no input".to_string(),
            ));
        }

        let mut entry = PatternEntry::new(self.category, input, self.output);
        if let Some(id) = self.id {
            if id != entry.id {
                debug!("Re-keying pattern {} to derived id {}", id, entry.id);
            }
        }

        let created_at = self.created_at.unwrap_or(entry.created_at);
        let last_used_at = self.last_used_at.unwrap_or(created_at).max(created_at);
        let updated_at = self.updated_at.unwrap_or(last_used_at);

        entry.use_count = self.use_count.unwrap_or(1);
        entry.effectiveness = match self.effectiveness {
            Some(value) if value.is_finite() => value.clamp(0.0, 1.0),
            _ => INITIAL_EFFECTIVENESS,
        };
        entry.estimated_units = self.estimated_units;
        entry.created_at = created_at;
        entry.last_used_at = last_used_at;
        entry.updated_at = updated_at;
        entry.dirty = self.dirty.unwrap_or(false);
        entry.remote_updated_at = self.remote_updated_at;

        Ok(entry)
    }
}

impl From<&PatternEntry> for PatternRecord {
    fn from(entry: &PatternEntry) -> Self {
        Self {
            id: Some(entry.id),
            category: entry.category,
            input: entry.input.clone(),
            signature: entry.signature.clone(),
            output: entry.output.clone(),
            use_count: Some(entry.use_count),
            effectiveness: Some(entry.effectiveness),
            created_at: Some(entry.created_at),
            last_used_at: Some(entry.last_used_at),
            updated_at: Some(entry.updated_at),
            estimated_units: entry.estimated_units,
            dirty: Some(entry.dirty),
            remote_updated_at: entry.remote_updated_at,
        }
    }
}

/// Decode records one by one, skipping (and counting) malformed ones
pub fn decode_records(values: Vec<serde_json::Value>, source: &str) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();

    for (index, value) in values.into_iter().enumerate() {
        let decoded = serde_json::from_value::<PatternRecord>(value)
            .map_err(PatternCacheError::from)
            .and_then(PatternRecord::into_entry);

        match decoded {
            Ok(entry) => outcome.entries.push(entry),
            Err(e) => {
                tracing::warn!("Skipping malformed pattern record #{} from {}: {}", index, source, e);
                outcome.skipped += 1;
            }
        }
    }

    outcome
}
