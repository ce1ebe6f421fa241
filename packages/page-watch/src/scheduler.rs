//! Scheduled batches using tokio-cron-scheduler.
//!
//! The scheduler and manual checks share one entry point,
//! [`Monitor::trigger`], so a tick that lands while a batch is running is
//! skipped instead of starting a second batch.
//!
//! ```text
//! Scheduler (every N minutes) ─┐
//!                              ├─► Monitor::trigger() ─► run_all()
//! Manual check ────────────────┘
//! ```

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::orchestrator::Monitor;

/// Start the periodic batch. The returned scheduler must be kept alive and
/// shut down by the caller.
pub async fn start_scheduler(monitor: Arc<Monitor>, every: Duration) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let batch_job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let monitor = monitor.clone();
        Box::pin(async move {
            run_scheduled_batch(&monitor).await;
        })
    })?;

    scheduler.add(batch_job).await?;
    scheduler.start().await?;

    tracing::info!(
        every_minutes = every.as_secs() / 60,
        "Scheduled checks started"
    );
    Ok(scheduler)
}

/// Run one scheduled batch, logging instead of propagating failures.
pub async fn run_scheduled_batch(monitor: &Monitor) {
    tracing::info!("Running scheduled check");

    match monitor.trigger().await {
        Ok(Some(result)) => tracing::info!(
            jobs = result.updated_jobs.len(),
            new = result.new_announcements.len(),
            "Scheduled check complete"
        ),
        Ok(None) => {}
        Err(e) => tracing::error!("Scheduled check failed: {}", e),
    }
}
