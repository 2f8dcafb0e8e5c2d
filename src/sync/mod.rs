//! Remote pattern synchronization
//!
//! A sync cycle pushes locally modified (dirty) entries to the remote pattern
//! service and pulls entries the remote changed since our watermark. Missing
//! credentials are not an error: the cycle is skipped and tried again next
//! interval. Network and auth failures are logged and leave entries dirty.

pub mod remote;
pub mod scheduler;

use crate::error::{PatternCacheError, Result};
use crate::storage::{MergeReport, PatternRecord, PatternStore, PersistenceHandle};
use crate::types::{PatternCategory, PatternEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use remote::HttpPatternClient;
pub use scheduler::{SyncRun, SyncScheduler, SyncStatus};

/// Source of the bearer token for the remote service
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` when the user is not signed in
    async fn bearer_token(&self) -> Option<String>;
}

/// Transport to the remote pattern service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemotePatternClient: Send + Sync {
    /// Records modified after `since` (everything when `None`)
    async fn download(&self, token: &str, since: Option<DateTime<Utc>>) -> Result<Vec<PatternRecord>>;

    /// Upload records; the remote keys them by id
    async fn upload(&self, token: &str, records: &[PatternRecord]) -> Result<()>;
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// No credentials were available; nothing was attempted
    pub skipped_unauthenticated: bool,

    /// The remote rejected the credentials; the cycle was abandoned
    pub auth_rejected: bool,

    /// Dirty entries sent
    pub uploaded: usize,

    /// Entries marked clean after the upload
    pub cleaned: usize,

    pub upload_error: Option<String>,

    /// Records received (before merging)
    pub downloaded: usize,

    /// Records that could not be turned into entries
    pub invalid: usize,

    pub merge: MergeReport,

    pub download_error: Option<String>,
}

impl SyncReport {
    pub fn succeeded(&self) -> bool {
        !self.skipped_unauthenticated
            && !self.auth_rejected
            && self.upload_error.is_none()
            && self.download_error.is_none()
    }
}

/// Runs sync cycles against one remote
pub struct SyncWorker {
    store: Arc<PatternStore>,
    client: Arc<dyn RemotePatternClient>,
    credentials: Arc<dyn CredentialProvider>,
    categories: Vec<PatternCategory>,
    persistence: Option<PersistenceHandle>,
}

impl SyncWorker {
    pub fn new(
        store: Arc<PatternStore>,
        client: Arc<dyn RemotePatternClient>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            store,
            client,
            credentials,
            categories: PatternCategory::ALL.to_vec(),
            persistence: None,
        }
    }

    /// Restrict the exchange to these categories
    pub fn with_categories(mut self, categories: Vec<PatternCategory>) -> Self {
        self.categories = categories;
        self
    }

    /// Schedule a local write whenever a cycle changes the store
    pub fn with_persistence(mut self, handle: PersistenceHandle) -> Self {
        self.persistence = Some(handle);
        self
    }

    pub fn categories(&self) -> &[PatternCategory] {
        &self.categories
    }

    fn persist(&self) {
        if let Some(handle) = &self.persistence {
            handle.schedule();
        }
    }

    /// Run one upload-then-download cycle
    ///
    /// Only a poisoned store lock is returned as an error; remote failures
    /// are recorded in the report.
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let Some(token) = self.credentials.bearer_token().await else {
            debug!("Not signed in, skipping pattern sync");
            report.skipped_unauthenticated = true;
            return Ok(report);
        };

        // Taken before the upload so our own uploads cannot move it
        let since = self.store.watermark(&self.categories)?;

        // Upload
        let dirty = self.store.dirty_in(&self.categories)?;
        if !dirty.is_empty() {
            let records: Vec<PatternRecord> = dirty.iter().map(upload_record).collect();

            match self.client.upload(&token, &records).await {
                Ok(()) => {
                    report.uploaded = records.len();
                    report.cleaned = self.store.mark_clean(&dirty)?;
                    if report.cleaned > 0 {
                        self.persist();
                    }
                    debug!("Uploaded {} patterns ({} now clean)", report.uploaded, report.cleaned);
                }
                Err(PatternCacheError::AuthenticationError(msg)) => {
                    warn!("Pattern sync rejected credentials: {}", msg);
                    report.auth_rejected = true;
                    return Ok(report);
                }
                Err(e) => {
                    warn!("Failed to upload {} patterns: {}", records.len(), e);
                    report.upload_error = Some(e.to_string());
                }
            }
        }

        // Download
        match self.client.download(&token, since).await {
            Ok(records) => {
                report.downloaded = records.len();
                let entries = self.accept(records, &mut report);

                report.merge = self.store.merge_remote(entries, &self.categories)?;
                if report.merge.changed() {
                    self.persist();
                }
            }
            Err(PatternCacheError::AuthenticationError(msg)) => {
                warn!("Pattern sync rejected credentials: {}", msg);
                report.auth_rejected = true;
                return Ok(report);
            }
            Err(e) => {
                warn!("Failed to download patterns: {}", e);
                report.download_error = Some(e.to_string());
            }
        }

        info!(
            "Pattern sync finished: {} uploaded, {} downloaded ({} new, {} replaced, {} kept local)",
            report.uploaded,
            report.downloaded,
            report.merge.inserted,
            report.merge.replaced,
            report.merge.kept_local
        );
        Ok(report)
    }

    fn accept(&self, records: Vec<PatternRecord>, report: &mut SyncReport) -> Vec<PatternEntry> {
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            match record.into_entry() {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("Ignoring remote pattern: {}", e);
                    report.invalid += 1;
                }
            }
        }
        entries
    }
}

/// Wire copy of a dirty entry; the sync flags are local state
fn upload_record(entry: &PatternEntry) -> PatternRecord {
    let mut record = PatternRecord::from(entry);
    record.dirty = None;
    record.remote_updated_at = None;
    record
}
