use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health of a job after its latest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Active,
    Error,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A configured monitoring target: one page, one selector.
///
/// `last_fingerprint` only moves on a successful, non-empty extraction. A
/// failed run keeps the last known-good fingerprint so the next success is
/// compared against it instead of silently re-baselining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringJob {
    pub id: Uuid,
    pub name: String,
    pub target_url: String,
    pub locator: String,
    /// `None` until the job has run once
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Empty means no baseline yet
    #[serde(default)]
    pub last_fingerprint: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
}

impl MonitoringJob {
    pub fn new(
        name: impl Into<String>,
        target_url: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            target_url: target_url.into(),
            locator: locator.into(),
            last_checked_at: None,
            last_fingerprint: String::new(),
            status: JobStatus::Active,
            last_error_message: None,
        }
    }

    /// Builder-style baseline, mostly for tests and imports of known state.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.last_fingerprint = fingerprint.into();
        self
    }

    pub fn has_baseline(&self) -> bool {
        !self.last_fingerprint.is_empty()
    }

    pub fn is_failing(&self) -> bool {
        self.status == JobStatus::Error
    }

    /// Record a failed run. The fingerprint is left untouched.
    pub fn record_failure(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.last_checked_at = Some(at);
        self.status = JobStatus::Error;
        self.last_error_message = Some(message.into());
    }

    /// Record a successful run with the fingerprint of what was seen.
    pub fn record_success(&mut self, fingerprint: String, at: DateTime<Utc>) {
        self.last_checked_at = Some(at);
        self.last_fingerprint = fingerprint;
        self.status = JobStatus::Active;
        self.last_error_message = None;
    }

    /// Take the run bookkeeping of `checked`, a copy of this job that went
    /// through a batch. Ignored when the job was retargeted meanwhile, since
    /// that run looked at a different page or selector.
    pub fn absorb_run(&mut self, checked: &MonitoringJob) -> bool {
        if self.target_url != checked.target_url || self.locator != checked.locator {
            return false;
        }
        self.last_checked_at = checked.last_checked_at;
        self.last_fingerprint = checked.last_fingerprint.clone();
        self.status = checked.status;
        self.last_error_message = checked.last_error_message.clone();
        true
    }

    /// Forget the baseline and any error, as after retargeting the job.
    pub fn reset_baseline(&mut self) {
        self.last_fingerprint.clear();
        self.status = JobStatus::Active;
        self.last_error_message = None;
    }
}
