//! Run one job: extract, fingerprint, compare against the baseline.
//!
//! Never fails. Every error from the page source becomes the job's
//! `status = error` and `last_error_message`, leaving the fingerprint alone.

use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::fingerprint::fingerprint;
use crate::sandbox::PageSource;
use crate::types::{Announcement, ContentMode, Extraction, MonitoringJob};

/// How a run moved the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Extraction failed or matched nothing
    Failed,
    /// First successful run, fingerprint recorded silently
    Baseline,
    Unchanged,
    /// Content differs from the baseline; an announcement was made
    Changed,
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: MonitoringJob,
    pub announcement: Option<Announcement>,
    pub change: Change,
}

/// Fetch the job's page and fold the result into the job.
pub async fn run_job(source: &dyn PageSource, job: MonitoringJob, mode: ContentMode) -> JobOutcome {
    let started = Instant::now();
    let result = source.fetch_and_extract(&job.target_url, &job.locator).await;
    let outcome = evaluate(job, result, mode, Utc::now());

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome.change {
        Change::Failed => warn!(
            job_id = %outcome.job.id,
            url = %outcome.job.target_url,
            elapsed_ms,
            error = outcome.job.last_error_message.as_deref().unwrap_or_default(),
            "Job failed"
        ),
        Change::Changed => info!(
            job_id = %outcome.job.id,
            url = %outcome.job.target_url,
            elapsed_ms,
            "Change detected"
        ),
        change => debug!(
            job_id = %outcome.job.id,
            url = %outcome.job.target_url,
            elapsed_ms,
            ?change,
            "Job checked"
        ),
    }

    outcome
}

/// Apply an extraction result to a job as of `checked_at`.
pub fn evaluate(
    mut job: MonitoringJob,
    result: Result<Extraction>,
    mode: ContentMode,
    checked_at: DateTime<Utc>,
) -> JobOutcome {
    let extraction = match result {
        Ok(extraction) if extraction.is_empty() => {
            let err = MonitorError::NoMatch {
                locator: job.locator.clone(),
                page_title: extraction.page_title,
            };
            return failed(job, &err, checked_at);
        }
        Ok(extraction) => extraction,
        Err(err) => return failed(job, &err, checked_at),
    };

    let current = fingerprint(&extraction.text);
    let (change, announcement) = if current == job.last_fingerprint {
        (Change::Unchanged, None)
    } else if !job.has_baseline() {
        (Change::Baseline, None)
    } else {
        let content = match mode {
            ContentMode::Text => extraction.text.clone(),
            ContentMode::Markup => extraction
                .markup
                .clone()
                .filter(|markup| !markup.trim().is_empty())
                .unwrap_or_else(|| extraction.text.clone()),
        };
        let link = extraction
            .primary_link
            .clone()
            .unwrap_or_else(|| job.target_url.clone());
        let announcement = Announcement::new(&job, &extraction.text, content, link, checked_at);
        (Change::Changed, Some(announcement))
    };

    job.record_success(current, checked_at);

    JobOutcome {
        job,
        announcement,
        change,
    }
}

/// Outcome for a job whose run could not produce content.
pub fn failed(mut job: MonitoringJob, err: &MonitorError, checked_at: DateTime<Utc>) -> JobOutcome {
    job.record_failure(err.to_string(), checked_at);
    JobOutcome {
        job,
        announcement: None,
        change: Change::Failed,
    }
}
