//! Page Watch
//!
//! Periodically scrapes a fragment of each watched page, fingerprints it and
//! announces the fragment when it changes.
//!
//! # How a check works
//!
//! - The fragment is located with a CSS selector, first in the raw HTTP
//!   response and, when that yields nothing, in a headless-browser render
//! - Its normalized text is hashed; the first hash of a job is a silent
//!   baseline, every later difference becomes exactly one announcement
//! - A failed check marks the job as failing and keeps its last good
//!   baseline; one job failing never affects the others
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use page_watch::{JsonFileStore, LogNotifier, Monitor, MonitorSettings, SandboxGateway};
//!
//! let settings = MonitorSettings::default();
//! let gateway = SandboxGateway::from_settings(&settings)?;
//! let store = JsonFileStore::new("page-watch.json");
//! let monitor = Monitor::new(Arc::new(gateway), Arc::new(store), Arc::new(LogNotifier), settings);
//!
//! let result = monitor.run_all().await?;
//! println!("{} new announcements", result.new_announcements.len());
//! ```
//!
//! # Modules
//!
//! - [`sandbox`] - Static fetch, shared parsing context, headless rendering
//! - [`extractor`] - Selector matching, text normalization, markup cleaning
//! - [`runner`] - One job: extract, fingerprint, compare
//! - [`orchestrator`] - Batches of jobs, feed merging, persistence
//! - [`store`] - Persistent state (JSON file, in-memory)
//! - [`catalog`] - Job and feed management, import/export
//! - [`testing`] - Mock collaborators for tests

pub mod catalog;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod notify;
pub mod orchestrator;
pub mod runner;
pub mod sandbox;
pub mod scheduler;
pub mod store;
pub mod testing;
pub mod types;

// Re-export core types at crate root
pub use catalog::{Catalog, Direction, JobEdit, JobExport};
pub use config::{Config, MonitorSettings};
pub use error::{MonitorError, Result, SandboxError, StoreError};
pub use fingerprint::fingerprint;
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::{BatchResult, Monitor};
pub use runner::{run_job, Change, JobOutcome};
pub use sandbox::{PageSource, ProbeReport, SandboxGateway, Strategy};
pub use store::{JsonFileStore, MemoryStore, StateSnapshot, StateStore};
pub use types::{Announcement, ContentMode, Extraction, Feed, JobStatus, MonitoringJob};
