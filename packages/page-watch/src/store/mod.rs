//! Persistent state: the job list, the announcement feed and the transient
//! "checking" flag.
//!
//! Writes are whole-value replacements. `commit` stores jobs and feed in one
//! write so a reader never sees one without the other. `apply_batch` merges a
//! batch into whatever the state holds at write time, so job and feed edits
//! made while the batch ran survive it.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Announcement, Feed, MonitoringJob};

/// Everything the store holds, as read at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub jobs: Vec<MonitoringJob>,
    pub feed: Feed,
    pub checking: bool,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<StateSnapshot, StoreError>;

    /// Replace the job list and the feed together.
    async fn commit(&self, jobs: Vec<MonitoringJob>, feed: Feed) -> Result<(), StoreError>;

    /// Merge a batch's checked jobs and new announcements into the current
    /// state in one write. See [`merge_batch`].
    async fn apply_batch(
        &self,
        checked: Vec<MonitoringJob>,
        fresh: Vec<Announcement>,
        feed_limit: usize,
    ) -> Result<(), StoreError>;

    async fn set_checking(&self, checking: bool) -> Result<(), StoreError>;
}

/// Fold batch results into `state`.
///
/// Jobs are matched by id. A job removed during the batch stays removed and
/// one retargeted during the batch keeps its reset baseline. New
/// announcements go in front of the current feed.
pub fn merge_batch(
    state: &mut StateSnapshot,
    checked: Vec<MonitoringJob>,
    fresh: Vec<Announcement>,
    feed_limit: usize,
) {
    for run in &checked {
        if let Some(job) = state.jobs.iter_mut().find(|job| job.id == run.id) {
            job.absorb_run(run);
        }
    }
    state.feed.prepend(fresh, feed_limit);
}
