//! Job and feed management on top of a [`StateStore`].
//!
//! Every mutation loads the current state, changes it and commits jobs and
//! feed back together.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MonitorError, Result};
use crate::extractor::Locator;
use crate::sandbox::parse_target;
use crate::store::{StateSnapshot, StateStore};
use crate::types::{Announcement, Feed, MonitoringJob};

/// Portable job definition used by export and import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExport {
    pub name: String,
    pub url: String,
    pub selector: String,
}

/// Changes to apply to a job. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct JobEdit {
    pub name: Option<String>,
    pub url: Option<String>,
    pub locator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

pub struct Catalog {
    store: Arc<dyn StateStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    async fn load(&self) -> Result<StateSnapshot> {
        Ok(self.store.load().await?)
    }

    async fn save(&self, state: StateSnapshot) -> Result<()> {
        Ok(self.store.commit(state.jobs, state.feed).await?)
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    pub async fn jobs(&self) -> Result<Vec<MonitoringJob>> {
        Ok(self.load().await?.jobs)
    }

    /// Validate and append a new job. It starts without a baseline.
    pub async fn add_job(&self, name: &str, url: &str, locator: &str) -> Result<MonitoringJob> {
        parse_target(url)?;
        Locator::parse(locator)?;

        let job = MonitoringJob::new(name.trim(), url.trim(), locator.trim());
        let mut state = self.load().await?;
        state.jobs.push(job.clone());
        self.save(state).await?;

        info!(job_id = %job.id, url = %job.target_url, "Job added");
        Ok(job)
    }

    /// Apply `edit`. Retargeting (url or locator) drops the baseline so the
    /// next run records a fresh one instead of announcing.
    pub async fn edit_job(&self, id: Uuid, edit: JobEdit) -> Result<MonitoringJob> {
        if let Some(url) = &edit.url {
            parse_target(url)?;
        }
        if let Some(locator) = &edit.locator {
            Locator::parse(locator)?;
        }

        let mut state = self.load().await?;
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(MonitorError::UnknownJob { id })?;

        let mut retargeted = false;
        if let Some(name) = edit.name {
            job.name = name.trim().to_string();
        }
        if let Some(url) = edit.url {
            let url = url.trim().to_string();
            retargeted |= url != job.target_url;
            job.target_url = url;
        }
        if let Some(locator) = edit.locator {
            let locator = locator.trim().to_string();
            retargeted |= locator != job.locator;
            job.locator = locator;
        }

        if retargeted {
            job.reset_baseline();
        } else {
            job.status = Default::default();
            job.last_error_message = None;
        }

        let edited = job.clone();
        self.save(state).await?;

        debug!(job_id = %id, retargeted, "Job edited");
        Ok(edited)
    }

    pub async fn remove_job(&self, id: Uuid) -> Result<MonitoringJob> {
        let mut state = self.load().await?;
        let index = position(&state.jobs, id)?;
        let removed = state.jobs.remove(index);
        self.save(state).await?;

        info!(job_id = %id, "Job removed");
        Ok(removed)
    }

    /// Swap a job with its neighbour. Returns false when it is already at
    /// that end of the list.
    pub async fn move_job(&self, id: Uuid, direction: Direction) -> Result<bool> {
        let mut state = self.load().await?;
        let index = position(&state.jobs, id)?;

        let target = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < state.jobs.len() => index + 1,
            _ => return Ok(false),
        };

        state.jobs.swap(index, target);
        self.save(state).await?;
        Ok(true)
    }

    pub async fn export_jobs(&self) -> Result<String> {
        let exported: Vec<JobExport> = self
            .jobs()
            .await?
            .into_iter()
            .map(|job| JobExport {
                name: job.name,
                url: job.target_url,
                selector: job.locator,
            })
            .collect();

        serde_json::to_string_pretty(&exported).map_err(|e| MonitorError::Store(e.into()))
    }

    /// Append jobs from an exported list. Entries missing a name, url or
    /// selector are skipped. Returns how many jobs were added.
    pub async fn import_jobs(&self, json: &str) -> Result<usize> {
        let root: serde_json::Value =
            serde_json::from_str(json).map_err(|e| MonitorError::InvalidImport(e.to_string()))?;
        let entries = root
            .as_array()
            .ok_or_else(|| MonitorError::InvalidImport("expected a list of jobs".to_string()))?;

        let imported: Vec<MonitoringJob> = entries
            .iter()
            .filter_map(|entry| {
                let field = |key: &str| {
                    entry
                        .get(key)
                        .and_then(|value| value.as_str())
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                };
                Some(MonitoringJob::new(field("name")?, field("url")?, field("selector")?))
            })
            .collect();

        let skipped = entries.len() - imported.len();
        let count = imported.len();
        if count > 0 {
            let mut state = self.load().await?;
            state.jobs.extend(imported);
            self.save(state).await?;
        }

        info!(imported = count, skipped, "Jobs imported");
        Ok(count)
    }

    // =========================================================================
    // Feed
    // =========================================================================

    pub async fn feed(&self) -> Result<Feed> {
        Ok(self.load().await?.feed)
    }

    /// Announcements grouped in job order, newest first within a job.
    pub async fn ordered_feed(&self) -> Result<Vec<Announcement>> {
        let state = self.load().await?;
        Ok(state
            .feed
            .ordered_by_jobs(&state.jobs)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn unread_count(&self) -> Result<usize> {
        Ok(self.load().await?.feed.unread_count())
    }

    /// Returns false when no announcement has this id.
    pub async fn mark_read(&self, id: Uuid) -> Result<bool> {
        let mut state = self.load().await?;
        if !state.feed.mark_read(id) {
            return Ok(false);
        }
        self.save(state).await?;
        Ok(true)
    }

    pub async fn mark_all_read(&self) -> Result<usize> {
        let mut state = self.load().await?;
        let changed = state.feed.mark_all_read();
        if changed > 0 {
            self.save(state).await?;
        }
        Ok(changed)
    }

    /// Empty the feed. Returns how many announcements were removed.
    pub async fn clear_feed(&self) -> Result<usize> {
        let mut state = self.load().await?;
        let removed = state.feed.len();
        state.feed.clear();
        self.save(state).await?;
        Ok(removed)
    }
}

fn position(jobs: &[MonitoringJob], id: Uuid) -> Result<usize> {
    jobs.iter()
        .position(|job| job.id == id)
        .ok_or(MonitorError::UnknownJob { id })
}
