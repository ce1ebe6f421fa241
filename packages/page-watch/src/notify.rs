//! Badge/notification collaborator.
//!
//! Told about the announcements of a batch only when there are any. Failures
//! to notify are logged by the implementation and never fail the batch.

use async_trait::async_trait;
use tracing::info;

use crate::types::Announcement;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn announce(&self, fresh: &[Announcement]);
}

/// Writes each new announcement to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn announce(&self, fresh: &[Announcement]) {
        info!(count = fresh.len(), "New announcements");
        for announcement in fresh {
            info!(
                job_id = %announcement.job_id,
                job = %announcement.job_name,
                link = %announcement.link,
                "{}",
                announcement.title
            );
        }
    }
}
