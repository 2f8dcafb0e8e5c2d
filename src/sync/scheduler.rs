// Background sync scheduler
//
// Runs sync cycles on a fixed interval after an initial delay and keeps a
// short history of runs for inspection.

use super::{SyncReport, SyncWorker};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Runs kept in memory
const HISTORY_LIMIT: usize = 32;

/// Sync run record for tracking history
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: SyncStatus,
    pub report: Option<SyncReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    /// Some step failed; dirty entries wait for the next cycle
    Partial,
    /// No credentials, or credentials rejected
    Skipped,
    Failed,
}

impl SyncStatus {
    fn from_report(report: &SyncReport) -> Self {
        if report.skipped_unauthenticated || report.auth_rejected {
            SyncStatus::Skipped
        } else if report.succeeded() {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        }
    }
}

/// Periodic driver for a [`SyncWorker`]
pub struct SyncScheduler {
    worker: Arc<SyncWorker>,
    interval: Duration,
    initial_delay: Duration,
    running: Arc<AtomicBool>,
    history: Mutex<VecDeque<SyncRun>>,
}

impl SyncScheduler {
    pub fn new(worker: Arc<SyncWorker>, interval: Duration, initial_delay: Duration) -> Self {
        Self {
            worker,
            interval,
            initial_delay,
            running: Arc::new(AtomicBool::new(false)),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn worker(&self) -> &Arc<SyncWorker> {
        &self.worker
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one cycle now and record it
    pub async fn run_once(&self) -> SyncRun {
        let started_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("Starting pattern sync (id: {})", id);

        let run = match self.worker.run_cycle().await {
            Ok(report) => SyncRun {
                id,
                started_at,
                completed_at: Utc::now(),
                status: SyncStatus::from_report(&report),
                report: Some(report),
                error: None,
            },
            Err(e) => {
                tracing::error!("Pattern sync failed: {}", e);
                SyncRun {
                    id,
                    started_at,
                    completed_at: Utc::now(),
                    status: SyncStatus::Failed,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        };

        self.record(run.clone());
        run
    }

    fn record(&self, run: SyncRun) {
        match self.history.lock() {
            Ok(mut history) => {
                if history.len() >= HISTORY_LIMIT {
                    history.pop_front();
                }
                history.push_back(run);
            }
            Err(e) => tracing::warn!("Failed to lock sync history: {}", e),
        }
    }

    /// Most recent run
    pub fn last_run(&self) -> Option<SyncRun> {
        self.history.lock().ok().and_then(|history| history.back().cloned())
    }

    /// Up to `limit` runs, newest first
    pub fn history(&self, limit: usize) -> Vec<SyncRun> {
        self.history
            .lock()
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Run cycles until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.running.swap(true, Ordering::SeqCst) {
                tracing::warn!("Pattern sync scheduler is already running");
                return;
            }

            tracing::info!(
                "Starting pattern sync scheduler (every {:?}, first run in {:?})",
                self.interval,
                self.initial_delay
            );

            let mut delay = self.initial_delay;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(delay) => {}
                }

                // A cycle in flight is abandoned on shutdown; entries stay dirty.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.run_once() => {}
                }

                delay = self.interval;
            }

            self.running.store(false, Ordering::SeqCst);
            tracing::info!("Stopped pattern sync scheduler");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;
    use crate::error::Result;
    use crate::storage::{PatternRecord, PatternStore};
    use crate::sync::RemotePatternClient;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingClient {
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl RemotePatternClient for CountingClient {
        async fn download(&self, _token: &str, _since: Option<DateTime<Utc>>) -> Result<Vec<PatternRecord>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn upload(&self, _token: &str, _records: &[PatternRecord]) -> Result<()> {
            Ok(())
        }
    }

    fn scheduler(token: Option<&str>, client: Arc<CountingClient>, interval: Duration) -> Arc<SyncScheduler> {
        let worker = SyncWorker::new(
            Arc::new(PatternStore::default()),
            client,
            Arc::new(StaticCredentials(token.map(str::to_string))),
        );
        Arc::new(SyncScheduler::new(Arc::new(worker), interval, Duration::from_millis(10)))
    }

    #[tokio::test]
    async fn test_run_once_records_history() {
        let client = Arc::new(CountingClient::default());
        let scheduler = scheduler(Some("token"), Arc::clone(&client), Duration::from_secs(60));

        let run = scheduler.run_once().await;
        assert_eq!(run.status, SyncStatus::Success);
        assert_eq!(scheduler.last_run().unwrap().id, run.id);
        assert_eq!(scheduler.history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_unauthenticated_run_is_skipped() {
        let client = Arc::new(CountingClient::default());
        let scheduler = scheduler(None, Arc::clone(&client), Duration::from_secs(60));

        let run = scheduler.run_once().await;
        assert_eq!(run.status, SyncStatus::Skipped);
        assert_eq!(client.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spawned_scheduler_runs_repeatedly_until_cancelled() {
        let client = Arc::new(CountingClient::default());
        let scheduler = scheduler(Some("token"), Arc::clone(&client), Duration::from_millis(20));
        let cancel = CancellationToken::new();

        let task = Arc::clone(&scheduler).spawn(cancel.clone());
        sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(client.downloads.load(Ordering::SeqCst) >= 2);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let client = Arc::new(CountingClient::default());
        let scheduler = scheduler(Some("token"), client, Duration::from_secs(60));
        for _ in 0..(HISTORY_LIMIT + 5) {
            scheduler.run_once().await;
        }
        assert_eq!(scheduler.history(usize::MAX).len(), HISTORY_LIMIT);
    }
}
