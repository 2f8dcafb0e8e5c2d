//! JSON file persistence
//!
//! The snapshot is a single JSON array of [`PatternRecord`]s. Writes go to a
//! sibling temp file that is fsynced and renamed over the target, so a crash
//! leaves either the old or the new snapshot, never a truncated one.

use super::{decode_records, LoadOutcome, PatternPersistence, PatternRecord};
use crate::error::{PatternCacheError, Result};
use crate::types::PatternEntry;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name used under the data directory
pub const DEFAULT_FILE_NAME: &str = "patterns.json";

/// Stores the snapshot in one JSON file
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_local_dir>/pattern-cache/patterns.json`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pattern-cache")
            .join(DEFAULT_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PatternPersistence for JsonFilePersistence {
    fn load(&self) -> Result<LoadOutcome> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No pattern snapshot at {}", self.path.display());
                return Ok(LoadOutcome::default());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(LoadOutcome::default());
        }

        let values: Vec<serde_json::Value> = serde_json::from_str(&content)?;
        let outcome = decode_records(values, &self.location());
        if outcome.skipped > 0 {
            warn!(
                "Skipped {} malformed pattern records in {}",
                outcome.skipped,
                self.path.display()
            );
        }
        debug!("Loaded {} patterns from {}", outcome.entries.len(), self.path.display());
        Ok(outcome)
    }

    fn save(&self, entries: &[PatternEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let records: Vec<PatternRecord> = entries.iter().map(PatternRecord::from).collect();
        let content = serde_json::to_vec_pretty(&records)?;

        let tmp = self.temp_path();
        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&content)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(PatternCacheError::Io(e));
        }

        debug!("Saved {} patterns to {}", records.len(), self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn quarantine(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.into());
        name.push(format!(".corrupt-{}", Utc::now().timestamp()));
        let target = self.path.with_file_name(name);

        fs::rename(&self.path, &target)?;
        info!("Moved unreadable pattern snapshot to {}", target.display());
        Ok(Some(target))
    }
}
