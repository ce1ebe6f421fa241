use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use super::job::MonitoringJob;

/// Characters of extracted text kept as an announcement's title.
const TITLE_CHARS: usize = 100;

/// Default cap on the announcement feed.
pub const DEFAULT_FEED_LIMIT: usize = 100;

/// What an announcement stores as its content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Normalized plain text
    #[default]
    Text,
    /// Cleaned markup, falling back to text when there is none
    Markup,
}

impl FromStr for ContentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "markup" | "html" => Ok(Self::Markup),
            other => Err(format!("unknown content mode: {other} (expected text or markup)")),
        }
    }
}

/// A detected change, shown to the user.
///
/// Carries the job's name as well as its id so it stays meaningful after the
/// job is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_name: String,
    pub title: String,
    pub content: String,
    pub link: String,
    pub found_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Announcement {
    pub fn new(
        job: &MonitoringJob,
        text: &str,
        content: String,
        link: String,
        found_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id,
            job_name: job.name.clone(),
            title: text.chars().take(TITLE_CHARS).collect(),
            content,
            link,
            found_at,
            is_read: false,
        }
    }
}

/// Announcements, newest first, capped in length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feed {
    entries: Vec<Announcement>,
}

impl Feed {
    pub fn new(entries: Vec<Announcement>) -> Self {
        Self { entries }
    }

    /// Put a batch of fresh announcements in front and evict the oldest
    /// entries beyond `limit`.
    pub fn prepend(&mut self, mut fresh: Vec<Announcement>, limit: usize) {
        fresh.sort_by(|a, b| b.found_at.cmp(&a.found_at));
        fresh.append(&mut self.entries);
        fresh.truncate(limit);
        self.entries = fresh;
    }

    pub fn entries(&self) -> &[Announcement] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Announcement> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|a| !a.is_read).count()
    }

    /// Returns false when no announcement has this id.
    pub fn mark_read(&mut self, id: Uuid) -> bool {
        match self.entries.iter_mut().find(|a| a.id == id) {
            Some(announcement) => {
                announcement.is_read = true;
                true
            }
            None => false,
        }
    }

    /// Returns how many announcements changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for announcement in self.entries.iter_mut().filter(|a| !a.is_read) {
            announcement.is_read = true;
            changed += 1;
        }
        changed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Announcements grouped in the order the jobs are listed, newest first
    /// within a group. Announcements of deleted jobs come last.
    pub fn ordered_by_jobs(&self, jobs: &[MonitoringJob]) -> Vec<&Announcement> {
        let positions: HashMap<Uuid, usize> = jobs
            .iter()
            .enumerate()
            .map(|(index, job)| (job.id, index))
            .collect();

        let mut ordered: Vec<&Announcement> = self.entries.iter().collect();
        ordered.sort_by(|a, b| {
            let pos_a = positions.get(&a.job_id).copied().unwrap_or(usize::MAX);
            let pos_b = positions.get(&b.job_id).copied().unwrap_or(usize::MAX);
            pos_a.cmp(&pos_b).then(b.found_at.cmp(&a.found_at))
        });
        ordered
    }
}
