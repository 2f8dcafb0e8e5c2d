//! Category-partitioned, capacity-bounded pattern store
//!
//! Each category lives behind its own `RwLock`, so a slow similarity scan or
//! an eviction in one category never blocks callers of another. No operation
//! touches more than one partition lock at a time, which rules out lock
//! ordering deadlocks. Nothing here does I/O; persistence and sync work on
//! snapshots taken through [`PatternStore::snapshot`] and friends.

use crate::error::{PatternCacheError, Result};
use crate::similarity::{JaccardScorer, SimilarityScorer};
use crate::types::{MatchKind, PatternCategory, PatternEntry, PatternId, PatternInput, PatternMatch};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Default capacity of a single category
pub const DEFAULT_MAX_PATTERNS: usize = 1000;

/// Construction options for [`PatternStore`]
#[derive(Clone)]
pub struct StoreOptions {
    /// Maximum number of entries per category
    pub max_patterns: usize,

    /// Scorer used by every category without an override
    pub scorer: Arc<dyn SimilarityScorer>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_patterns: DEFAULT_MAX_PATTERNS,
            scorer: Arc::new(JaccardScorer),
        }
    }
}

impl std::fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOptions")
            .field("max_patterns", &self.max_patterns)
            .field("scorer", &self.scorer.name())
            .finish()
    }
}

/// What an insert did
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub id: PatternId,

    /// An entry with the same id existed and was updated in place
    pub replaced: bool,

    /// Entry removed to make room
    pub evicted: Option<PatternEntry>,
}

/// Result of reconciling remote entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// New ids stored
    pub inserted: usize,

    /// Existing entries replaced by a remote copy with more usage
    pub replaced: usize,

    /// Existing entries kept because local usage was at least as high
    pub kept_local: usize,

    /// Entries in categories the caller did not accept
    pub rejected: usize,

    /// Local entries evicted to make room for remote ones
    pub evicted: usize,

    /// Kept local entries whose remote watermark moved forward
    pub advanced: usize,
}

impl MergeReport {
    /// Whether the store needs persisting
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.replaced > 0 || self.advanced > 0
    }
}

/// Aggregate view over all partitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSummary {
    pub per_category: BTreeMap<PatternCategory, usize>,
    pub total: usize,
    pub reliable: usize,
    pub dirty: usize,
}

#[derive(Default)]
struct Partition {
    entries: HashMap<PatternId, PatternEntry>,
}

impl Partition {
    /// Lowest use count loses; oldest `last_used_at`, then lowest id, break ties
    fn eviction_candidate(&self) -> Option<PatternId> {
        self.entries
            .values()
            .min_by(|a, b| {
                a.use_count
                    .cmp(&b.use_count)
                    .then(a.last_used_at.cmp(&b.last_used_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|entry| entry.id)
    }

    fn evict_one(&mut self) -> Option<PatternEntry> {
        let victim = self.eviction_candidate()?;
        self.entries.remove(&victim)
    }
}

/// Authoritative, thread-safe holder of every [`PatternEntry`]
pub struct PatternStore {
    partitions: Vec<RwLock<Partition>>,
    scorers: Vec<Arc<dyn SimilarityScorer>>,
    max_patterns: usize,
}

impl PatternStore {
    /// Create an empty store
    pub fn new(options: StoreOptions) -> Self {
        let max_patterns = options.max_patterns.max(1);
        Self {
            partitions: PatternCategory::ALL
                .iter()
                .map(|_| RwLock::new(Partition::default()))
                .collect(),
            scorers: PatternCategory::ALL
                .iter()
                .map(|_| Arc::clone(&options.scorer))
                .collect(),
            max_patterns,
        }
    }

    /// Use a different scorer for one category
    pub fn with_category_scorer(mut self, category: PatternCategory, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorers[category as usize] = scorer;
        self
    }

    pub fn max_patterns(&self) -> usize {
        self.max_patterns
    }

    fn read(&self, category: PatternCategory) -> Result<RwLockReadGuard<'_, Partition>> {
        self.partitions[category as usize].read().map_err(|e| {
            PatternCacheError::LockPoisoned(format!("Failed to lock {} patterns: {}", category, e))
        })
    }

    fn write(&self, category: PatternCategory) -> Result<RwLockWriteGuard<'_, Partition>> {
        self.partitions[category as usize].write().map_err(|e| {
            PatternCacheError::LockPoisoned(format!("Failed to lock {} patterns: {}", category, e))
        })
    }

    /// Bump usage on `id` and return a copy, if it is still present
    fn record_use(&self, category: PatternCategory, id: PatternId) -> Result<Option<PatternEntry>> {
        let mut partition = self.write(category)?;
        Ok(partition.entries.get_mut(&id).map(|entry| {
            entry.record_use(Utc::now());
            entry.clone()
        }))
    }

    /// Look up the entry whose id `input` derives to
    ///
    /// On a hit the entry's use count and `last_used_at` are updated.
    pub fn find_exact(&self, category: PatternCategory, input: &PatternInput) -> Result<Option<PatternMatch>> {
        let id = input.pattern_id(category);
        if !self.read(category)?.entries.contains_key(&id) {
            return Ok(None);
        }

        Ok(self
            .record_use(category, id)?
            .map(|entry| PatternMatch::from_entry(&entry, 1.0, MatchKind::Exact)))
    }

    /// Best-scoring entry at or above `threshold`
    ///
    /// Ties prefer higher effectiveness, then the lower id. In bucketed
    /// categories only entries from the query's error bucket are considered.
    pub fn find_similar(
        &self,
        category: PatternCategory,
        input: &PatternInput,
        threshold: f64,
    ) -> Result<Option<PatternMatch>> {
        if input.is_empty() || threshold.is_nan() {
            return Ok(None);
        }

        let scorer = &self.scorers[category as usize];
        let bucket = input.bucket(category);
        let query = input.text();

        let best = {
            let partition = self.read(category)?;
            let mut best: Option<(f64, f32, PatternId)> = None;

            for entry in partition.entries.values() {
                if bucket.is_some() && entry.bucket != bucket {
                    continue;
                }

                let score = scorer.score(query, &entry.input);
                if score < threshold {
                    continue;
                }

                let better = match best {
                    None => true,
                    Some((best_score, best_effectiveness, best_id)) => {
                        score > best_score
                            || (score == best_score && entry.effectiveness > best_effectiveness)
                            || (score == best_score
                                && entry.effectiveness == best_effectiveness
                                && entry.id < best_id)
                    }
                };
                if better {
                    best = Some((score, entry.effectiveness, entry.id));
                }
            }

            best
        };

        let Some((score, _, id)) = best else {
            return Ok(None);
        };

        // The winner may have been evicted between the scan and this lock.
        Ok(self
            .record_use(category, id)?
            .map(|entry| PatternMatch::from_entry(&entry, score, MatchKind::Similar)))
    }

    /// Insert or update an entry, evicting first when the category is full
    ///
    /// An existing id keeps its usage statistics; only content changes.
    pub fn insert(&self, entry: PatternEntry) -> Result<InsertOutcome> {
        let id = entry.id;
        let mut partition = self.write(entry.category)?;

        if let Some(existing) = partition.entries.get_mut(&id) {
            existing.output = entry.output;
            existing.signature = entry.signature;
            existing.bucket = entry.bucket;
            if entry.estimated_units.is_some() {
                existing.estimated_units = entry.estimated_units;
            }
            existing.updated_at = Utc::now().max(existing.updated_at);
            existing.dirty = true;

            return Ok(InsertOutcome {
                id,
                replaced: true,
                evicted: None,
            });
        }

        let evicted = if partition.entries.len() >= self.max_patterns {
            partition.evict_one()
        } else {
            None
        };
        if let Some(victim) = &evicted {
            debug!(
                "Evicted {} pattern {} (use_count: {})",
                victim.category, victim.id, victim.use_count
            );
        }

        let mut entry = entry;
        entry.dirty = true;
        partition.entries.insert(id, entry);

        Ok(InsertOutcome {
            id,
            replaced: false,
            evicted,
        })
    }

    /// Apply a success/failure report; returns the new effectiveness
    pub fn update_effectiveness(&self, id: PatternId, success: bool) -> Result<f32> {
        for category in PatternCategory::ALL {
            let mut partition = self.write(category)?;
            if let Some(entry) = partition.entries.get_mut(&id) {
                entry.adjust_effectiveness(success, Utc::now());
                return Ok(entry.effectiveness);
            }
        }

        Err(PatternCacheError::PatternNotFound(id.to_string()))
    }

    /// Copy of one entry
    pub fn get(&self, id: PatternId) -> Result<Option<PatternEntry>> {
        for category in PatternCategory::ALL {
            if let Some(entry) = self.read(category)?.entries.get(&id) {
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    /// Remove one entry
    pub fn remove(&self, id: PatternId) -> Result<Option<PatternEntry>> {
        for category in PatternCategory::ALL {
            if let Some(entry) = self.write(category)?.entries.remove(&id) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Drop every entry of one category, or of all of them
    pub fn clear(&self, category: Option<PatternCategory>) -> Result<usize> {
        let categories: Vec<PatternCategory> = match category {
            Some(category) => vec![category],
            None => PatternCategory::ALL.to_vec(),
        };

        let mut removed = 0;
        for category in categories {
            let mut partition = self.write(category)?;
            removed += partition.entries.len();
            partition.entries.clear();
        }
        Ok(removed)
    }

    pub fn len(&self, category: PatternCategory) -> Result<usize> {
        Ok(self.read(category)?.entries.len())
    }

    pub fn total_len(&self) -> Result<usize> {
        let mut total = 0;
        for category in PatternCategory::ALL {
            total += self.len(category)?;
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.total_len()? == 0)
    }

    /// Copies of one category's entries, ordered by id
    pub fn entries(&self, category: PatternCategory) -> Result<Vec<PatternEntry>> {
        let mut entries: Vec<PatternEntry> = self.read(category)?.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    /// Copies of every entry, ordered by category then id
    pub fn snapshot(&self) -> Result<Vec<PatternEntry>> {
        let mut all = Vec::new();
        for category in PatternCategory::ALL {
            all.extend(self.entries(category)?);
        }
        Ok(all)
    }

    /// Counts across all partitions
    pub fn summary(&self) -> Result<StoreSummary> {
        let mut summary = StoreSummary::default();
        for category in PatternCategory::ALL {
            let partition = self.read(category)?;
            summary.per_category.insert(category, partition.entries.len());
            summary.total += partition.entries.len();
            for entry in partition.entries.values() {
                if entry.is_reliable() {
                    summary.reliable += 1;
                }
                if entry.dirty {
                    summary.dirty += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Every entry modified since the last successful sync
    pub fn all_dirty(&self) -> Result<Vec<PatternEntry>> {
        self.dirty_in(&PatternCategory::ALL)
    }

    /// Dirty entries restricted to `categories`
    pub fn dirty_in(&self, categories: &[PatternCategory]) -> Result<Vec<PatternEntry>> {
        let mut dirty = Vec::new();
        for &category in categories {
            let partition = self.read(category)?;
            dirty.extend(partition.entries.values().filter(|entry| entry.dirty).cloned());
        }
        dirty.sort_by_key(|entry| (entry.category, entry.id));
        Ok(dirty)
    }

    /// Clear the dirty flag of uploaded entries
    ///
    /// An entry modified after the uploaded copy was taken stays dirty.
    pub fn mark_clean(&self, uploaded: &[PatternEntry]) -> Result<usize> {
        let mut cleaned = 0;
        for copy in uploaded {
            let mut partition = self.write(copy.category)?;
            if let Some(entry) = partition.entries.get_mut(&copy.id) {
                if entry.dirty && entry.updated_at <= copy.updated_at {
                    entry.dirty = false;
                    cleaned += 1;
                }
            }
        }
        Ok(cleaned)
    }

    /// Newest remote `updated_at` we have downloaded for `categories`
    ///
    /// Only downloads advance it; local edits, uploads and matches do not.
    pub fn watermark(&self, categories: &[PatternCategory]) -> Result<Option<DateTime<Utc>>> {
        let mut watermark = None;
        for &category in categories {
            let partition = self.read(category)?;
            let newest = partition
                .entries
                .values()
                .filter_map(|entry| entry.remote_updated_at)
                .max();
            watermark = watermark.max(newest);
        }
        Ok(watermark)
    }

    /// Reconcile entries downloaded from the remote
    ///
    /// New ids are inserted clean. For ids we already hold, the copy with the
    /// higher use count wins; ties keep the local copy.
    pub fn merge_remote(&self, remote: Vec<PatternEntry>, accepted: &[PatternCategory]) -> Result<MergeReport> {
        let mut report = MergeReport::default();

        for mut incoming in remote {
            if !accepted.contains(&incoming.category) {
                report.rejected += 1;
                continue;
            }
            incoming.dirty = false;
            incoming.remote_updated_at = Some(incoming.updated_at);

            let mut partition = self.write(incoming.category)?;
            match partition.entries.get_mut(&incoming.id) {
                Some(local) if local.use_count >= incoming.use_count => {
                    if local.remote_updated_at < incoming.remote_updated_at {
                        local.remote_updated_at = incoming.remote_updated_at;
                        report.advanced += 1;
                    }
                    report.kept_local += 1;
                }
                Some(_) => {
                    partition.entries.insert(incoming.id, incoming);
                    report.replaced += 1;
                }
                None => {
                    if partition.entries.len() >= self.max_patterns && partition.evict_one().is_some() {
                        report.evicted += 1;
                    }
                    partition.entries.insert(incoming.id, incoming);
                    report.inserted += 1;
                }
            }
        }

        Ok(report)
    }

    /// Load entries from a persisted snapshot, keeping their flags
    ///
    /// Duplicate ids keep the copy with the higher use count; categories over
    /// capacity are trimmed with the regular eviction order.
    pub fn restore(&self, entries: Vec<PatternEntry>) -> Result<usize> {
        let mut restored = 0;
        for entry in entries {
            let mut partition = self.write(entry.category)?;
            match partition.entries.get(&entry.id) {
                Some(existing) if existing.use_count >= entry.use_count => continue,
                Some(_) => {}
                None => {
                    if partition.entries.len() >= self.max_patterns {
                        partition.evict_one();
                    }
                }
            }
            partition.entries.insert(entry.id, entry);
            restored += 1;
        }
        Ok(restored)
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}
