//! Typed errors for the monitor.
//!
//! Every per-job failure is a [`MonitorError`] and ends up as the job's
//! `last_error_message`. Only [`MonitorError::Store`] is allowed to abort a
//! whole batch.

use thiserror::Error;

/// Errors that can occur while checking a page or running a batch.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Connection, DNS or TLS failure
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-success response code
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Fetch or render exceeded its bound
    #[error("timed out after {seconds}s: {url}")]
    Timeout { url: String, seconds: u64 },

    /// Selector matched nothing, or only whitespace
    #[error("no matching content for selector \"{locator}\"{}", page_title_suffix(.page_title))]
    NoMatch {
        locator: String,
        page_title: Option<String>,
    },

    /// Browser launch, navigation or in-page extraction failed
    #[error("render failed: {0}")]
    Render(String),

    /// Shared parsing context could not be used
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Target is not an absolute http(s) URL
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Selector does not parse
    #[error("invalid selector \"{locator}\": {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// No job with this id
    #[error("no job with id {id}")]
    UnknownJob { id: uuid::Uuid },

    /// Import document is not a list of jobs
    #[error("invalid import: {0}")]
    InvalidImport(String),

    /// Persistent state could not be read or written
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl MonitorError {
    pub fn network(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Network(Box::new(err))
    }

    /// Whether a static-fetch failure is worth retrying in a rendered page.
    ///
    /// A 403 usually means bot detection that a real browser gets past.
    /// Connection failures and timeouts will not improve by rendering.
    pub fn warrants_escalation(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 403, .. })
    }
}

fn page_title_suffix(title: &Option<String>) -> String {
    match title {
        Some(title) if !title.is_empty() => format!(" (page title: \"{title}\")"),
        _ => String::new(),
    }
}

/// Lifecycle errors of the shared parsing context.
///
/// Cloneable so a single creation attempt can hand the same result to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    /// Another caller created the context first
    #[error("parsing context already exists")]
    AlreadyExists,

    /// The context could not be started
    #[error("parsing context unavailable: {0}")]
    Unavailable(String),

    /// The context went away while a request was in flight
    #[error("parsing context closed")]
    Closed,
}

/// Errors from the persistent state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_mentions_page_title() {
        let err = MonitorError::NoMatch {
            locator: ".headline".to_string(),
            page_title: Some("Just a moment...".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "no matching content for selector \".headline\" (page title: \"Just a moment...\")"
        );

        let err = MonitorError::NoMatch {
            locator: ".headline".to_string(),
            page_title: None,
        };
        assert_eq!(err.to_string(), "no matching content for selector \".headline\"");
    }

    #[test]
    fn test_warrants_escalation() {
        let forbidden = MonitorError::HttpStatus {
            status: 403,
            url: "https://example.com".to_string(),
        };
        assert!(forbidden.warrants_escalation());

        let missing = MonitorError::HttpStatus {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(!missing.warrants_escalation());

        let timeout = MonitorError::Timeout {
            url: "https://example.com".to_string(),
            seconds: 15,
        };
        assert!(!timeout.warrants_escalation());
    }
}
