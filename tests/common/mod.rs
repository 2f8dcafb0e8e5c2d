//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pattern_cache::{
    JsonFilePersistence, PatternCache, PatternCacheConfig, PatternCacheError, PatternRecord,
    RemotePatternClient, Result,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Temp dir plus a snapshot path inside it
pub fn temp_store() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("patterns.json");
    (dir, path)
}

/// Config persisting to `path` with a short debounce and no sync
pub fn file_config(path: &PathBuf) -> PatternCacheConfig {
    let mut config = PatternCacheConfig::default();
    config.persistence.path = Some(path.clone());
    config.persistence.debounce = Duration::from_millis(20);
    config
}

/// Start a cache on `path` without background tasks
pub async fn open_cache(path: &PathBuf) -> Arc<PatternCache> {
    PatternCache::builder(file_config(path))
        .persistence(Arc::new(JsonFilePersistence::new(path)))
        .background_tasks(false)
        .start()
        .await
        .expect("Failed to start cache")
}

/// In-process stand-in for the remote pattern service
///
/// Keeps the latest uploaded record per id and answers downloads with the
/// records updated after `since`.
#[derive(Default)]
pub struct FakeRemote {
    pub records: Mutex<BTreeMap<String, PatternRecord>>,
    pub uploads: AtomicUsize,
    pub downloads: AtomicUsize,
    pub last_since: Mutex<Option<DateTime<Utc>>>,
    pub fail_uploads: AtomicBool,
    pub reject_token: AtomicBool,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a record as if another client had uploaded it
    pub fn seed(&self, record: PatternRecord) {
        let key = record
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("{}:{}", record.category, record.input));
        self.records.lock().unwrap().insert(key, record);
    }

    pub fn stored(&self) -> Vec<PatternRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl RemotePatternClient for FakeRemote {
    async fn download(&self, _token: &str, since: Option<DateTime<Utc>>) -> Result<Vec<PatternRecord>> {
        if self.reject_token.load(Ordering::SeqCst) {
            return Err(PatternCacheError::AuthenticationError("rejected".to_string()));
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        *self.last_since.lock().unwrap() = since;

        Ok(self
            .stored()
            .into_iter()
            .filter(|record| match (since, record.updated_at) {
                (Some(since), Some(updated)) => updated > since,
                _ => true,
            })
            .collect())
    }

    async fn upload(&self, _token: &str, records: &[PatternRecord]) -> Result<()> {
        if self.reject_token.load(Ordering::SeqCst) {
            return Err(PatternCacheError::AuthenticationError("rejected".to_string()));
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(PatternCacheError::NetworkError("connection reset".to_string()));
        }

        self.uploads.fetch_add(1, Ordering::SeqCst);
        for record in records {
            self.seed(record.clone());
        }
        Ok(())
    }
}
