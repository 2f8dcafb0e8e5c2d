//! The pattern cache facade
//!
//! [`PatternCache`] is the one handle callers hold. Lookups and mutations are
//! synchronous and only touch in-memory locks; persistence and remote sync
//! run as background tasks started by [`PatternCacheBuilder::start`].
//!
//! The facade never returns store, persistence or sync errors from the
//! caller-facing operations. They are logged and the cache degrades to a
//! miss.

use crate::config::{EnvCredentials, PatternCacheConfig};
use crate::error::{PatternCacheError, Result};
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::similarity::SimilarityScorer;
use crate::storage::{
    JsonFilePersistence, PatternPersistence, PatternStore, PersistenceHandle, PersistenceWriter, StoreOptions,
};
use crate::sync::{CredentialProvider, HttpPatternClient, RemotePatternClient, SyncRun, SyncScheduler, SyncWorker};
use crate::types::{ErrorSignature, PatternCategory, PatternEntry, PatternId, PatternInput, PatternMatch};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Similarity-based cache of (input -> output) patterns
pub struct PatternCache {
    config: PatternCacheConfig,
    store: Arc<PatternStore>,
    metrics: CacheMetrics,
    enabled: AtomicBool,
    writer: Option<Arc<PersistenceWriter>>,
    persistence: Option<PersistenceHandle>,
    scheduler: Option<Arc<SyncScheduler>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Wires a [`PatternCache`] to its collaborators
pub struct PatternCacheBuilder {
    config: PatternCacheConfig,
    persistence: Option<Arc<dyn PatternPersistence>>,
    remote: Option<(Arc<dyn RemotePatternClient>, Arc<dyn CredentialProvider>)>,
    scorer: Option<Arc<dyn SimilarityScorer>>,
    category_scorers: Vec<(PatternCategory, Arc<dyn SimilarityScorer>)>,
    background_tasks: bool,
}

impl PatternCacheBuilder {
    pub fn new(config: PatternCacheConfig) -> Self {
        Self {
            config,
            persistence: None,
            remote: None,
            scorer: None,
            category_scorers: Vec::new(),
            background_tasks: true,
        }
    }

    /// Persist to this backend instead of the configured JSON file
    pub fn persistence(mut self, backend: Arc<dyn PatternPersistence>) -> Self {
        self.persistence = Some(backend);
        self
    }

    /// Sync with this remote instead of the configured endpoint
    pub fn remote(mut self, client: Arc<dyn RemotePatternClient>, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.remote = Some((client, credentials));
        self
    }

    /// Replace the lexical scorer for every category
    pub fn scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Replace the scorer for one category
    pub fn category_scorer(mut self, category: PatternCategory, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.category_scorers.push((category, scorer));
        self
    }

    /// Spawn the persistence writer and sync scheduler (default `true`)
    ///
    /// Without background tasks, changes are written by [`PatternCache::flush`]
    /// and synced by [`PatternCache::sync_now`] only.
    pub fn background_tasks(mut self, enabled: bool) -> Self {
        self.background_tasks = enabled;
        self
    }

    fn build_store(&mut self) -> Arc<PatternStore> {
        let mut options = StoreOptions {
            max_patterns: self.config.max_patterns_per_category,
            ..Default::default()
        };
        if let Some(scorer) = self.scorer.take() {
            options.scorer = scorer;
        }

        let mut store = PatternStore::new(options);
        for (category, scorer) in self.category_scorers.drain(..) {
            store = store.with_category_scorer(category, scorer);
        }
        Arc::new(store)
    }

    fn resolve_persistence(&mut self) -> Option<Arc<dyn PatternPersistence>> {
        if let Some(backend) = self.persistence.take() {
            return Some(backend);
        }
        if !self.config.persistence.enabled {
            return None;
        }
        let backend: Arc<dyn PatternPersistence> = Arc::new(JsonFilePersistence::new(self.config.store_path()));
        Some(backend)
    }

    fn resolve_remote(&mut self) -> Result<Option<(Arc<dyn RemotePatternClient>, Arc<dyn CredentialProvider>)>> {
        if let Some(remote) = self.remote.take() {
            return Ok(Some(remote));
        }
        if !self.config.sync.enabled {
            return Ok(None);
        }

        let endpoint = self.config.sync.endpoint.clone().ok_or_else(|| {
            PatternCacheError::ValidationError("sync.endpoint is required when sync is enabled".to_string())
        })?;
        let client: Arc<dyn RemotePatternClient> =
            Arc::new(HttpPatternClient::new(endpoint, Some(self.config.sync.request_timeout))?);
        let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentials::new());
        Ok(Some((client, credentials)))
    }

    /// Load the persisted snapshot and start the background tasks
    ///
    /// Must run inside a tokio runtime. An unreadable snapshot is moved aside
    /// and the cache starts empty.
    pub async fn start(mut self) -> Result<Arc<PatternCache>> {
        self.config.validate()?;

        let store = self.build_store();
        let backend = self.resolve_persistence();
        let remote = self.resolve_remote()?;

        if let Some(backend) = &backend {
            load_snapshot(&store, Arc::clone(backend)).await?;
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let writer = backend.map(|backend| {
            Arc::new(PersistenceWriter::new(
                Arc::clone(&store),
                backend,
                self.config.persistence.debounce,
            ))
        });
        let persistence = writer.as_ref().map(|writer| writer.handle());

        if self.background_tasks {
            if let Some(writer) = &writer {
                tasks.push(Arc::clone(writer).spawn(cancel.child_token()));
            }
        }

        let scheduler = remote.map(|(client, credentials)| {
            let mut worker = SyncWorker::new(Arc::clone(&store), client, credentials)
                .with_categories(self.config.sync.categories.clone());
            if let Some(handle) = &persistence {
                worker = worker.with_persistence(handle.clone());
            }
            Arc::new(SyncScheduler::new(
                Arc::new(worker),
                self.config.sync.interval,
                self.config.sync.initial_delay,
            ))
        });

        if self.background_tasks {
            if let Some(scheduler) = &scheduler {
                tasks.push(Arc::clone(scheduler).spawn(cancel.child_token()));
            }
        }

        Ok(Arc::new(PatternCache {
            enabled: AtomicBool::new(self.config.enabled),
            config: self.config,
            store,
            metrics: CacheMetrics::new(),
            writer,
            persistence,
            scheduler,
            cancel,
            tasks: Mutex::new(tasks),
        }))
    }
}

async fn load_snapshot(store: &PatternStore, backend: Arc<dyn PatternPersistence>) -> Result<()> {
    let loader = Arc::clone(&backend);
    let loaded = tokio::task::spawn_blocking(move || loader.load())
        .await
        .map_err(|e| PatternCacheError::Other(format!("Snapshot load task failed: {}", e)))?;

    match loaded {
        Ok(outcome) => {
            let count = store.restore(outcome.entries)?;
            info!(
                "Loaded {} patterns from {} ({} skipped)",
                count,
                backend.location(),
                outcome.skipped
            );
        }
        Err(PatternCacheError::Serialization(e)) => {
            warn!("Pattern snapshot {} is unreadable: {}", backend.location(), e);
            let mover = Arc::clone(&backend);
            match tokio::task::spawn_blocking(move || mover.quarantine()).await {
                Ok(Ok(Some(path))) => warn!("Starting empty; old snapshot kept at {}", path.display()),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("Failed to move unreadable snapshot aside: {}", e),
                Err(e) => warn!("Snapshot quarantine task failed: {}", e),
            }
        }
        Err(e) => {
            warn!("Failed to load patterns from {}: {}", backend.location(), e);
        }
    }

    Ok(())
}

impl PatternCache {
    pub fn builder(config: PatternCacheConfig) -> PatternCacheBuilder {
        PatternCacheBuilder::new(config)
    }

    /// Cache without persistence or sync; usable outside a runtime
    pub fn in_memory(config: PatternCacheConfig) -> Self {
        let store = Arc::new(PatternStore::new(StoreOptions {
            max_patterns: config.max_patterns_per_category,
            ..Default::default()
        }));

        Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            store,
            metrics: CacheMetrics::new(),
            writer: None,
            persistence: None,
            scheduler: None,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PatternCacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    fn persist(&self) {
        if let Some(handle) = &self.persistence {
            handle.schedule();
        }
    }

    // === Lookups ===

    /// Find a remembered output for `input`
    ///
    /// Tries the exact id first, then the best similar entry at or above
    /// `threshold` (the configured threshold when `None`).
    pub fn try_match(
        &self,
        input: impl Into<PatternInput>,
        category: PatternCategory,
        threshold: Option<f64>,
    ) -> Option<PatternMatch> {
        if !self.is_enabled() {
            return None;
        }

        let input = input.into();
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);

        let found = self
            .store
            .find_exact(category, &input)
            .and_then(|exact| match exact {
                Some(hit) => Ok(Some(hit)),
                None => self.store.find_similar(category, &input, threshold),
            });

        match found {
            Ok(Some(hit)) => {
                let units = hit
                    .estimated_units
                    .map(u64::from)
                    .unwrap_or(self.config.estimated_units_per_hit);
                self.metrics.record_hit(hit.kind, units);
                self.persist();
                debug!(
                    "Pattern hit in {} ({:?}, score {:.2}, id {})",
                    category, hit.kind, hit.score, hit.id
                );
                Some(hit)
            }
            Ok(None) => {
                self.metrics.record_miss();
                debug!("Pattern miss in {}", category);
                None
            }
            Err(e) => {
                self.metrics.record_miss();
                warn!("Pattern lookup in {} failed: {}", category, e);
                None
            }
        }
    }

    /// [`try_match`](Self::try_match) for a structured error
    pub fn try_match_error(&self, signature: &ErrorSignature, threshold: Option<f64>) -> Option<PatternMatch> {
        self.try_match(signature.clone(), PatternCategory::ErrorResolution, threshold)
    }

    // === Mutations ===

    /// Remember `output` for `input`; returns the entry id
    ///
    /// Returns `None` when the cache is disabled, the input is blank, or the
    /// store failed.
    pub fn remember(
        &self,
        input: impl Into<PatternInput>,
        output: impl Into<String>,
        category: PatternCategory,
    ) -> Option<PatternId> {
        self.remember_entry(category, input.into(), output.into(), None)
    }

    /// Like [`remember`](Self::remember), crediting `units` per future hit
    pub fn remember_with_estimate(
        &self,
        input: impl Into<PatternInput>,
        output: impl Into<String>,
        category: PatternCategory,
        units: u32,
    ) -> Option<PatternId> {
        self.remember_entry(category, input.into(), output.into(), Some(units))
    }

    /// Remember the fix for a structured error
    pub fn remember_error(&self, signature: ErrorSignature, output: impl Into<String>) -> Option<PatternId> {
        self.remember(signature, output, PatternCategory::ErrorResolution)
    }

    fn remember_entry(
        &self,
        category: PatternCategory,
        input: PatternInput,
        output: String,
        units: Option<u32>,
    ) -> Option<PatternId> {
        if !self.is_enabled() || input.is_empty() {
            return None;
        }

        let mut entry = PatternEntry::new(category, input, output);
        if let Some(units) = units {
            entry = entry.with_estimated_units(units);
        }

        match self.store.insert(entry) {
            Ok(outcome) => {
                if let Some(evicted) = &outcome.evicted {
                    debug!("Remembering in {} evicted {}", category, evicted.id);
                }
                self.persist();
                Some(outcome.id)
            }
            Err(e) => {
                warn!("Failed to remember pattern in {}: {}", category, e);
                None
            }
        }
    }

    /// Feed back whether reusing a matched pattern worked out
    ///
    /// Returns `false` for unknown ids.
    pub fn report_outcome(&self, id: PatternId, success: bool) -> bool {
        match self.store.update_effectiveness(id, success) {
            Ok(effectiveness) => {
                debug!("Pattern {} effectiveness now {:.2}", id, effectiveness);
                self.persist();
                true
            }
            Err(PatternCacheError::PatternNotFound(_)) => {
                debug!("Outcome reported for unknown pattern {}", id);
                false
            }
            Err(e) => {
                warn!("Failed to record outcome for pattern {}: {}", id, e);
                false
            }
        }
    }

    /// Drop one pattern
    pub fn forget(&self, id: PatternId) -> bool {
        match self.store.remove(id) {
            Ok(Some(_)) => {
                self.persist();
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to forget pattern {}: {}", id, e);
                false
            }
        }
    }

    /// Drop every pattern of `category`, or all patterns
    pub fn clear(&self, category: Option<PatternCategory>) -> usize {
        match self.store.clear(category) {
            Ok(removed) => {
                if removed > 0 {
                    self.persist();
                }
                info!("Cleared {} patterns", removed);
                removed
            }
            Err(e) => {
                warn!("Failed to clear patterns: {}", e);
                0
            }
        }
    }

    // === State ===

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!("Pattern cache {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let summary = self.store.summary().unwrap_or_else(|e| {
            warn!("Failed to summarize pattern store: {}", e);
            Default::default()
        });
        self.metrics.snapshot(summary)
    }

    pub fn reset_statistics(&self) {
        self.metrics.reset();
    }

    /// Copies of the stored patterns, optionally for one category
    pub fn patterns(&self, category: Option<PatternCategory>) -> Vec<PatternEntry> {
        let result = match category {
            Some(category) => self.store.entries(category),
            None => self.store.snapshot(),
        };
        result.unwrap_or_else(|e| {
            warn!("Failed to list patterns: {}", e);
            Vec::new()
        })
    }

    pub fn get(&self, id: PatternId) -> Option<PatternEntry> {
        self.store.get(id).ok().flatten()
    }

    // === Background work ===

    /// Run one sync cycle now
    pub async fn sync_now(&self) -> Result<SyncRun> {
        let scheduler = self.scheduler.as_ref().ok_or_else(|| {
            PatternCacheError::ValidationError("remote sync is not configured".to_string())
        })?;
        Ok(scheduler.run_once().await)
    }

    /// Most recent sync run, if sync is configured and has run
    pub fn last_sync(&self) -> Option<SyncRun> {
        self.scheduler.as_ref().and_then(|scheduler| scheduler.last_run())
    }

    /// Write pending changes now; returns whether anything was written
    pub async fn flush(&self) -> Result<bool> {
        match &self.writer {
            Some(writer) => writer.flush().await,
            None => Ok(false),
        }
    }

    /// Stop background tasks and write pending changes
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();

        let tasks = {
            let mut guard = self
                .tasks
                .lock()
                .map_err(|e| PatternCacheError::LockPoisoned(format!("Failed to lock task list: {}", e)))?;
            std::mem::take(&mut *guard)
        };

        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        self.flush().await?;
        info!("Pattern cache shut down");
        Ok(())
    }
}

impl Drop for PatternCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchKind;

    fn cache() -> PatternCache {
        PatternCache::in_memory(PatternCacheConfig::in_memory())
    }

    #[test]
    fn test_remember_then_exact_match() {
        let cache = cache();
        let id = cache
            .remember("create a ruby sword", "class RubySword {}", PatternCategory::CodeGeneration)
            .unwrap();

        let hit = cache
            .try_match("Create a ruby  sword", PatternCategory::CodeGeneration, None)
            .unwrap();
        assert_eq!(hit.id, id);
        assert_eq!(hit.kind, MatchKind::Exact);
        assert_eq!(hit.output, "class RubySword {}");
    }

    #[test]
    fn test_exact_match_wins_over_similar() {
        let cache = cache();
        cache.remember("a b c d", "similar", PatternCategory::CodeGeneration);
        let exact = cache
            .remember("a b c", "exact", PatternCategory::CodeGeneration)
            .unwrap();
        cache.report_outcome(exact, false);

        let hit = cache
            .try_match("a b c", PatternCategory::CodeGeneration, Some(0.1))
            .unwrap();
        assert_eq!(hit.output, "exact");
    }

    #[test]
    fn test_blank_input_is_not_remembered() {
        let cache = cache();
        assert!(cache.remember("   ", "x", PatternCategory::Documentation).is_none());
        assert_eq!(cache.metrics().total_patterns, 0);
    }

    #[test]
    fn test_metrics_use_entry_estimate_when_present() {
        let cache = cache();
        cache.remember_with_estimate("document the registry", "/** */", PatternCategory::Documentation, 42);
        cache.remember("add a config screen", "...", PatternCategory::FeatureAddition);

        cache.try_match("document the registry", PatternCategory::Documentation, None);
        cache.try_match("add a config screen", PatternCategory::FeatureAddition, None);
        cache.try_match("nothing like this", PatternCategory::FeatureAddition, None);

        let metrics = cache.metrics();
        assert_eq!(metrics.total_matches, 2);
        assert_eq!(metrics.total_misses, 1);
        assert_eq!(metrics.estimated_units_saved, 42 + 500);
        assert_eq!(metrics.per_category_counts[&PatternCategory::Documentation], 1);

        cache.reset_statistics();
        let metrics = cache.metrics();
        assert_eq!(metrics.total_matches, 0);
        assert_eq!(metrics.total_patterns, 2);
    }

    #[test]
    fn test_disabled_cache_neither_matches_nor_learns() {
        let cache = cache();
        cache.remember("known input", "known output", PatternCategory::CodeGeneration);
        cache.set_enabled(false);

        assert!(cache.try_match("known input", PatternCategory::CodeGeneration, None).is_none());
        assert!(cache.remember("other", "x", PatternCategory::CodeGeneration).is_none());
        assert_eq!(cache.metrics().total_misses, 0);

        cache.set_enabled(true);
        assert!(cache.try_match("known input", PatternCategory::CodeGeneration, None).is_some());
    }

    #[test]
    fn test_report_outcome_unknown_id() {
        let cache = cache();
        let id = PatternInput::from("never stored").pattern_id(PatternCategory::CodeGeneration);
        assert!(!cache.report_outcome(id, true));
    }

    #[test]
    fn test_forget_and_clear() {
        let cache = cache();
        let id = cache.remember("alpha", "A", PatternCategory::CodeGeneration).unwrap();
        cache.remember("beta", "B", PatternCategory::Documentation);

        assert!(cache.forget(id));
        assert!(!cache.forget(id));
        assert_eq!(cache.clear(None), 1);
        assert!(cache.patterns(None).is_empty());
    }

    #[tokio::test]
    async fn test_sync_now_without_remote() {
        let cache = cache();
        assert!(matches!(
            cache.sync_now().await,
            Err(PatternCacheError::ValidationError(_))
        ));
        assert!(!cache.flush().await.unwrap());
    }
}
