use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{merge_batch, StateSnapshot, StateStore};
use crate::error::StoreError;
use crate::types::{Announcement, Feed, MonitoringJob};

/// Process-local store. Used by tests and by embedders that persist
/// state themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StateSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<MonitoringJob>) -> Self {
        Self {
            state: RwLock::new(StateSnapshot {
                jobs,
                ..Default::default()
            }),
        }
    }

    pub fn with_state(state: StateSnapshot) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<StateSnapshot, StoreError> {
        Ok(self.state.read().await.clone())
    }

    async fn commit(&self, jobs: Vec<MonitoringJob>, feed: Feed) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.jobs = jobs;
        state.feed = feed;
        Ok(())
    }

    async fn apply_batch(
        &self,
        checked: Vec<MonitoringJob>,
        fresh: Vec<Announcement>,
        feed_limit: usize,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        merge_batch(&mut state, checked, fresh, feed_limit);
        Ok(())
    }

    async fn set_checking(&self, checking: bool) -> Result<(), StoreError> {
        self.state.write().await.checking = checking;
        Ok(())
    }
}
