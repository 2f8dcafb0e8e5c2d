//! Debounced background persistence
//!
//! Mutations call [`PersistenceHandle::schedule`], which only flips a flag
//! and wakes the writer task. The task waits out the debounce window so a
//! burst of changes produces one write, then snapshots the store and saves
//! it on the blocking pool.

use super::{PatternPersistence, PatternStore};
use crate::error::{PatternCacheError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest wait before retrying a failed save
const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Cheap, cloneable trigger for the writer task
#[derive(Debug, Clone, Default)]
pub struct PersistenceHandle {
    notify: Arc<Notify>,
    pending: Arc<AtomicBool>,
}

impl PersistenceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the store as changed and wake the writer
    pub fn schedule(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether changes are waiting to be written
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    fn restore_pending(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }
}

/// Writes store snapshots to a [`PatternPersistence`] backend
pub struct PersistenceWriter {
    store: Arc<PatternStore>,
    backend: Arc<dyn PatternPersistence>,
    debounce: Duration,
    handle: PersistenceHandle,
    saves: AtomicU64,
    /// Held for a whole flush so snapshots reach the backend in order
    save_lock: Mutex<()>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<PatternStore>, backend: Arc<dyn PatternPersistence>, debounce: Duration) -> Self {
        Self {
            store,
            backend,
            debounce,
            handle: PersistenceHandle::new(),
            saves: AtomicU64::new(0),
            save_lock: Mutex::new(()),
        }
    }

    pub fn handle(&self) -> PersistenceHandle {
        self.handle.clone()
    }

    pub fn backend(&self) -> &Arc<dyn PatternPersistence> {
        &self.backend
    }

    /// Number of snapshots written so far
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Write a snapshot if changes are pending
    ///
    /// Returns whether anything was written. On failure the changes stay
    /// pending and the next flush retries. Concurrent flushes run one at a
    /// time.
    pub async fn flush(&self) -> Result<bool> {
        let _guard = self.save_lock.lock().await;
        if !self.handle.take_pending() {
            return Ok(false);
        }

        match self.save_snapshot().await {
            Ok(()) => Ok(true),
            Err(e) => {
                self.handle.restore_pending();
                Err(e)
            }
        }
    }

    async fn save_snapshot(&self) -> Result<()> {
        let entries = self.store.snapshot()?;
        let backend = Arc::clone(&self.backend);
        let count = entries.len();

        tokio::task::spawn_blocking(move || backend.save(&entries))
            .await
            .map_err(|e| PatternCacheError::Other(format!("Persistence task failed: {}", e)))??;

        self.saves.fetch_add(1, Ordering::Relaxed);
        debug!("Persisted {} patterns to {}", count, self.backend.location());
        Ok(())
    }

    /// Run the writer until `cancel` fires, then flush once more
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting pattern persistence writer ({}, debounce {:?})",
                self.backend.location(),
                self.debounce
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.handle.notify.notified() => {}
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.debounce) => {}
                }

                if let Err(e) = self.flush().await {
                    warn!("Failed to persist patterns: {}", e);

                    // Retry even if nothing else changes
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.debounce.max(MIN_RETRY_DELAY)) => {}
                    }
                    self.handle.notify.notify_one();
                }
            }

            if let Err(e) = self.flush().await {
                warn!("Final pattern flush failed: {}", e);
            }
            info!("Stopped pattern persistence writer");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LoadOutcome;
    use crate::types::{PatternCategory, PatternEntry};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingBackend {
        saved: StdMutex<Vec<usize>>,
        fail: AtomicBool,
        /// Remaining saves that fail before the backend recovers
        failures_left: AtomicUsize,
        save_delay: StdMutex<Option<std::time::Duration>>,
        in_save: AtomicUsize,
        max_in_save: AtomicUsize,
    }

    impl PatternPersistence for RecordingBackend {
        fn load(&self) -> Result<LoadOutcome> {
            Ok(LoadOutcome::default())
        }

        fn save(&self, entries: &[PatternEntry]) -> Result<()> {
            let failing = self.fail.load(Ordering::SeqCst)
                || self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if failing {
                return Err(PatternCacheError::Other("disk full".to_string()));
            }

            let active = self.in_save.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_save.fetch_max(active, Ordering::SeqCst);
            if let Some(delay) = *self.save_delay.lock().unwrap() {
                std::thread::sleep(delay);
            }
            self.saved.lock().unwrap().push(entries.len());
            self.in_save.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    fn writer(backend: Arc<RecordingBackend>, debounce: Duration) -> (Arc<PatternStore>, Arc<PersistenceWriter>) {
        let store = Arc::new(PatternStore::default());
        let writer = Arc::new(PersistenceWriter::new(Arc::clone(&store), backend, debounce));
        (store, writer)
    }

    #[tokio::test]
    async fn test_flush_without_changes_is_noop() {
        let backend = Arc::new(RecordingBackend::default());
        let (_, writer) = writer(Arc::clone(&backend), Duration::ZERO);

        assert!(!writer.flush().await.unwrap());
        assert!(backend.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_stays_pending() {
        let backend = Arc::new(RecordingBackend::default());
        let (store, writer) = writer(Arc::clone(&backend), Duration::ZERO);
        store
            .insert(PatternEntry::new(PatternCategory::CodeGeneration, "alpha".into(), "A"))
            .unwrap();
        writer.handle().schedule();

        backend.fail.store(true, Ordering::SeqCst);
        assert!(writer.flush().await.is_err());
        assert!(writer.handle().is_pending());

        backend.fail.store(false, Ordering::SeqCst);
        assert!(writer.flush().await.unwrap());
        assert_eq!(*backend.saved.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_burst_is_coalesced() {
        let backend = Arc::new(RecordingBackend::default());
        let (_, writer) = writer(Arc::clone(&backend), Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let task = Arc::clone(&writer).spawn(cancel.clone());

        let handle = writer.handle();
        for _ in 0..20 {
            handle.schedule();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.saved.lock().unwrap().len(), 1);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(writer.saves(), 1);
    }

    #[tokio::test]
    async fn test_cancel_flushes_pending_changes() {
        let backend = Arc::new(RecordingBackend::default());
        let (_, writer) = writer(Arc::clone(&backend), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let task = Arc::clone(&writer).spawn(cancel.clone());

        writer.handle().schedule();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(backend.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_is_retried_without_new_changes() {
        let backend = Arc::new(RecordingBackend::default());
        backend.failures_left.store(2, Ordering::SeqCst);
        let (store, writer) = writer(Arc::clone(&backend), Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let task = Arc::clone(&writer).spawn(cancel.clone());

        store
            .insert(PatternEntry::new(PatternCategory::CodeGeneration, "alpha".into(), "A"))
            .unwrap();
        writer.handle().schedule();

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(*backend.saved.lock().unwrap(), vec![1]);
        assert!(!writer.handle().is_pending());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_flushes_do_not_overlap() {
        let backend = Arc::new(RecordingBackend::default());
        *backend.save_delay.lock().unwrap() = Some(Duration::from_millis(50));
        let (store, writer) = writer(Arc::clone(&backend), Duration::ZERO);

        store
            .insert(PatternEntry::new(PatternCategory::CodeGeneration, "alpha".into(), "A"))
            .unwrap();
        writer.handle().schedule();
        let first = tokio::spawn({
            let writer = Arc::clone(&writer);
            async move { writer.flush().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        store
            .insert(PatternEntry::new(PatternCategory::CodeGeneration, "beta".into(), "B"))
            .unwrap();
        writer.handle().schedule();
        let second = writer.flush().await.unwrap();

        assert!(first.await.unwrap().unwrap());
        assert!(second);
        assert_eq!(backend.max_in_save.load(Ordering::SeqCst), 1);
        assert_eq!(*backend.saved.lock().unwrap(), vec![1, 2]);
    }
}
