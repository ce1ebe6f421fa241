use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sandbox::DEFAULT_USER_AGENT;
use crate::types::{ContentMode, DEFAULT_FEED_LIMIT};

/// Knobs the library itself reads. Built from [`Config`] by the binary, or
/// directly by tests and embedders.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Jobs checked at once within a batch
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub render_timeout: Duration,
    /// Wait after load before extracting from a rendered page
    pub settle_delay: Duration,
    pub feed_limit: usize,
    pub content_mode: ContentMode,
    /// Headless browser binary; `None` disables the dynamic strategy
    pub browser_binary: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: Duration::from_secs(15),
            render_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_millis(2000),
            feed_limit: DEFAULT_FEED_LIMIT,
            content_mode: ContentMode::Text,
            browser_binary: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl MonitorSettings {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_feed_limit(mut self, limit: usize) -> Self {
        self.feed_limit = limit;
        self
    }

    pub fn with_content_mode(mut self, mode: ContentMode) -> Self {
        self.content_mode = mode;
        self
    }

    pub fn with_browser(mut self, binary: impl Into<PathBuf>) -> Self {
        self.browser_binary = Some(binary.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub state_path: PathBuf,
    /// Scheduler cadence; `None` means manual checks only
    pub interval: Option<Duration>,
    pub settings: MonitorSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = MonitorSettings::default();

        let interval_minutes: u64 = parse_or(&lookup, "PAGE_WATCH_INTERVAL_MINUTES", 60)?;
        let interval_secs = interval_minutes
            .checked_mul(60)
            .context("PAGE_WATCH_INTERVAL_MINUTES is too large")?;
        let concurrency: usize = parse_or(&lookup, "PAGE_WATCH_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            bail!("PAGE_WATCH_CONCURRENCY must be at least 1");
        }

        let fetch_secs: u64 = parse_or(&lookup, "PAGE_WATCH_FETCH_TIMEOUT_SECS", 15)?;
        let render_secs: u64 = parse_or(&lookup, "PAGE_WATCH_RENDER_TIMEOUT_SECS", 15)?;
        let settle_millis: u64 = parse_or(&lookup, "PAGE_WATCH_SETTLE_MILLIS", 2000)?;
        let feed_limit: usize = parse_or(&lookup, "PAGE_WATCH_FEED_LIMIT", defaults.feed_limit)?;

        let content_mode = match lookup("PAGE_WATCH_CONTENT_MODE") {
            Some(raw) => ContentMode::from_str(&raw).map_err(anyhow::Error::msg)?,
            None => defaults.content_mode,
        };

        let settings = MonitorSettings {
            concurrency,
            fetch_timeout: Duration::from_secs(fetch_secs),
            render_timeout: Duration::from_secs(render_secs),
            settle_delay: Duration::from_millis(settle_millis),
            feed_limit,
            content_mode,
            browser_binary: lookup("PAGE_WATCH_BROWSER")
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from),
            user_agent: lookup("PAGE_WATCH_USER_AGENT").unwrap_or(defaults.user_agent),
        };

        Ok(Self {
            state_path: lookup("PAGE_WATCH_STATE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("page-watch.json")),
            interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            settings,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.state_path, PathBuf::from("page-watch.json"));
        assert_eq!(config.interval, Some(Duration::from_secs(3600)));
        assert_eq!(config.settings.concurrency, 4);
        assert_eq!(config.settings.feed_limit, 100);
        assert_eq!(config.settings.content_mode, ContentMode::Text);
        assert!(config.settings.browser_binary.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PAGE_WATCH_INTERVAL_MINUTES", "0"),
            ("PAGE_WATCH_CONTENT_MODE", "markup"),
            ("PAGE_WATCH_BROWSER", "/usr/bin/chromium"),
            ("PAGE_WATCH_SETTLE_MILLIS", "500"),
        ])
        .unwrap();

        assert!(config.interval.is_none());
        assert_eq!(config.settings.content_mode, ContentMode::Markup);
        assert_eq!(
            config.settings.browser_binary,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
        assert_eq!(config.settings.settle_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = config(&[("PAGE_WATCH_FEED_LIMIT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("PAGE_WATCH_FEED_LIMIT"));

        assert!(config(&[("PAGE_WATCH_CONCURRENCY", "0")]).is_err());
        assert!(config(&[("PAGE_WATCH_CONTENT_MODE", "json")]).is_err());
    }

    #[test]
    fn test_huge_interval_is_an_error() {
        let err = config(&[("PAGE_WATCH_INTERVAL_MINUTES", &u64::MAX.to_string())]).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
