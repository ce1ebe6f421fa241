//! State kept in a single JSON file.
//!
//! Every write goes to a sibling temp file that is then renamed over the
//! state file, so a crash mid-write leaves the previous state intact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{merge_batch, StateSnapshot, StateStore};
use crate::error::StoreError;
use crate::types::{Announcement, Feed, MonitoringJob};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default)]
    jobs: Vec<MonitoringJob>,
    #[serde(default)]
    announcements: Feed,
    #[serde(default)]
    is_checking: bool,
}

impl From<StoredState> for StateSnapshot {
    fn from(stored: StoredState) -> Self {
        Self {
            jobs: stored.jobs,
            feed: stored.announcements,
            checking: stored.is_checking,
        }
    }
}

impl From<StateSnapshot> for StoredState {
    fn from(snapshot: StateSnapshot) -> Self {
        Self {
            jobs: snapshot.jobs,
            announcements: snapshot.feed,
            is_checking: snapshot.checking,
        }
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoredState, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(StoredState::default()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredState::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, state: &StoredState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_string_pretty(state)?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, data).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), jobs = state.jobs.len(), "State written");
        Ok(())
    }

    async fn update(&self, apply: impl FnOnce(&mut StoredState) + Send) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.read().await?;
        apply(&mut state);
        self.write(&state).await
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<StateSnapshot, StoreError> {
        Ok(self.read().await?.into())
    }

    async fn commit(&self, jobs: Vec<MonitoringJob>, feed: Feed) -> Result<(), StoreError> {
        self.update(move |state| {
            state.jobs = jobs;
            state.announcements = feed;
        })
        .await
    }

    async fn apply_batch(
        &self,
        checked: Vec<MonitoringJob>,
        fresh: Vec<Announcement>,
        feed_limit: usize,
    ) -> Result<(), StoreError> {
        self.update(move |state| {
            let mut snapshot = StateSnapshot::from(std::mem::take(state));
            merge_batch(&mut snapshot, checked, fresh, feed_limit);
            *state = snapshot.into();
        })
        .await
    }

    async fn set_checking(&self, checking: bool) -> Result<(), StoreError> {
        self.update(move |state| state.is_checking = checking).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Announcement;
    use chrono::Utc;

    #[tokio::test]
    async fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        let state = store.load().await.unwrap();
        assert!(state.jobs.is_empty());
        assert!(state.feed.is_empty());
        assert!(!state.checking);
    }

    #[tokio::test]
    async fn test_commit_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = JsonFileStore::new(&path);

        let job = MonitoringJob::new("News", "https://example.com/news", ".headline")
            .with_fingerprint("abc");
        let feed = Feed::new(vec![Announcement::new(
            &job,
            "Launch Day",
            "Launch Day".to_string(),
            job.target_url.clone(),
            Utc::now(),
        )]);
        store.commit(vec![job.clone()], feed.clone()).await.unwrap();
        store.set_checking(true).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        let state = reopened.load().await.unwrap();
        assert_eq!(state.jobs, vec![job]);
        assert_eq!(state.feed, feed);
        assert!(state.checking);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["announcements"].is_array());
        assert_eq!(raw["isChecking"], true);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_apply_batch_merges_into_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStore::new(&path);

        let a = MonitoringJob::new("A", "https://a.example", ".headline");
        let b = MonitoringJob::new("B", "https://b.example", ".headline");
        store.commit(vec![a.clone(), b.clone()], Feed::default()).await.unwrap();

        // Batch started with both jobs; B is removed before it writes
        let mut checked = vec![a.clone(), b.clone()];
        for job in &mut checked {
            job.record_success("abc".to_string(), Utc::now());
        }
        store.commit(vec![a.clone()], Feed::default()).await.unwrap();
        store.apply_batch(checked, Vec::new(), 10).await.unwrap();

        let state = JsonFileStore::new(&path).load().await.unwrap();
        assert_eq!(state.jobs.len(), 1);
        assert_eq!(state.jobs[0].id, a.id);
        assert_eq!(state.jobs[0].last_fingerprint, "abc");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Json(_))));
    }
}
