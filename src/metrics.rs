//! Hit/miss accounting for the cache facade

use crate::storage::StoreSummary;
use crate::types::{MatchKind, PatternCategory};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated on every lookup
#[derive(Debug)]
pub struct CacheMetrics {
    exact_hits: AtomicU64,
    similar_hits: AtomicU64,
    misses: AtomicU64,
    units_saved: AtomicU64,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            exact_hits: AtomicU64::new(0),
            similar_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            units_saved: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self, kind: MatchKind, units: u64) {
        match kind {
            MatchKind::Exact => self.exact_hits.fetch_add(1, Ordering::Relaxed),
            MatchKind::Similar => self.similar_hits.fetch_add(1, Ordering::Relaxed),
        };
        self.units_saved.fetch_add(units, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_matches(&self) -> u64 {
        self.exact_hits.load(Ordering::Relaxed) + self.similar_hits.load(Ordering::Relaxed)
    }

    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let hits = self.total_matches() as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    pub fn reset(&self) {
        self.exact_hits.store(0, Ordering::Relaxed);
        self.similar_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.units_saved.store(0, Ordering::Relaxed);
    }

    /// Combine the counters with a store summary
    pub fn snapshot(&self, summary: StoreSummary) -> MetricsSnapshot {
        let exact_matches = self.exact_hits.load(Ordering::Relaxed);
        let similar_matches = self.similar_hits.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_matches: exact_matches + similar_matches,
            exact_matches,
            similar_matches,
            total_misses: self.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
            estimated_units_saved: self.units_saved.load(Ordering::Relaxed),
            per_category_counts: summary.per_category,
            total_patterns: summary.total,
            reliable_patterns: summary.reliable,
            dirty_patterns: summary.dirty,
        }
    }
}

/// Read-only view for dashboards and the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_matches: u64,
    pub exact_matches: u64,
    pub similar_matches: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub estimated_units_saved: u64,
    pub per_category_counts: BTreeMap<PatternCategory, usize>,
    pub total_patterns: usize,
    pub reliable_patterns: usize,
    pub dirty_patterns: usize,
}
