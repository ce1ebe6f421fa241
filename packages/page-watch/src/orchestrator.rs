//! Batch orchestration: run every job, then merge job results and new
//! announcements into the stored state in one write.
//!
//! ```text
//! run_all()
//!     │
//!     ├─► checking = true
//!     ├─► load jobs + feed
//!     ├─► run_jobs() ─► one task per job (bounded pool) ─► runner::run_job
//!     ├─► apply_batch: re-read state, update jobs still present,
//!     │                prepend announcements, truncate feed
//!     ├─► checking = false        (always, even when a step above failed)
//!     └─► notifier.announce()     (only when something is new)
//! ```

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::config::MonitorSettings;
use crate::error::Result;
use crate::notify::Notifier;
use crate::runner::{self, JobOutcome};
use crate::sandbox::PageSource;
use crate::store::StateStore;
use crate::types::{Announcement, MonitoringJob};

/// What one batch produced.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Every job, in list order, with its new status
    pub updated_jobs: Vec<MonitoringJob>,
    pub new_announcements: Vec<Announcement>,
    pub any_new: bool,
}

pub struct Monitor {
    source: Arc<dyn PageSource>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    settings: MonitorSettings,
    running: Mutex<()>,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn PageSource>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            settings,
            running: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run a batch unless one is already running. Returns `None` when the
    /// trigger was coalesced into the running batch.
    pub async fn trigger(&self) -> Result<Option<BatchResult>> {
        let Ok(_running) = self.running.try_lock() else {
            info!("Batch already running, skipping trigger");
            return Ok(None);
        };
        self.run_all().await.map(Some)
    }

    /// Run every stored job once and persist the outcome.
    ///
    /// Only a store failure makes this return an error. The checking flag is
    /// cleared on every path.
    pub async fn run_all(&self) -> Result<BatchResult> {
        self.store.set_checking(true).await?;

        let outcome = self.run_stored_batch().await;

        if let Err(e) = self.store.set_checking(false).await {
            error!(error = %e, "Failed to clear checking flag");
            if outcome.is_ok() {
                return Err(e.into());
            }
        }

        let result = outcome?;
        if result.any_new {
            self.notifier.announce(&result.new_announcements).await;
        }
        Ok(result)
    }

    async fn run_stored_batch(&self) -> Result<BatchResult> {
        let snapshot = self.store.load().await?;

        if snapshot.jobs.is_empty() {
            info!("No jobs configured. Add one with `page-watch jobs add <name> <url> <selector>`");
            return Ok(BatchResult::default());
        }

        let result = self.run_jobs(snapshot.jobs).await;

        // Merged against the state at write time; catalog edits made while
        // the jobs ran are kept
        self.store
            .apply_batch(
                result.updated_jobs.clone(),
                result.new_announcements.clone(),
                self.settings.feed_limit,
            )
            .await?;

        Ok(result)
    }

    /// Run `jobs` concurrently, independent of one another. Touches no
    /// persisted state.
    pub async fn run_jobs(&self, jobs: Vec<MonitoringJob>) -> BatchResult {
        let started = Instant::now();
        let total = jobs.len();
        info!(jobs = total, concurrency = self.settings.concurrency, "Starting batch");

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mode = self.settings.content_mode;

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let source = Arc::clone(&self.source);
                let semaphore = Arc::clone(&semaphore);
                let fallback = job.clone();
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    runner::run_job(source.as_ref(), job, mode).await
                });
                (fallback, handle)
            })
            .collect();

        let mut outcomes: Vec<JobOutcome> = Vec::with_capacity(total);
        for (job, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Job task aborted");
                    let mut job = job;
                    job.record_failure(format!("check aborted: {e}"), chrono::Utc::now());
                    outcomes.push(JobOutcome {
                        job,
                        announcement: None,
                        change: runner::Change::Failed,
                    });
                }
            }
        }

        let failed = outcomes
            .iter()
            .filter(|o| o.change == runner::Change::Failed)
            .count();

        let mut result = BatchResult::default();
        for outcome in outcomes {
            if let Some(announcement) = outcome.announcement {
                result.new_announcements.push(announcement);
            }
            result.updated_jobs.push(outcome.job);
        }
        result.any_new = !result.new_announcements.is_empty();

        info!(
            jobs = total,
            failed,
            new = result.new_announcements.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );

        result
    }
}
