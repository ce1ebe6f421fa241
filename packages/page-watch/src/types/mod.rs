//! Data model shared by every component.

pub mod announcement;
pub mod extraction;
pub mod job;

pub use announcement::{Announcement, ContentMode, Feed, DEFAULT_FEED_LIMIT};
pub use extraction::Extraction;
pub use job::{JobStatus, MonitoringJob};
