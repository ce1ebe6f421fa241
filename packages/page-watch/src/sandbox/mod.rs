//! Rendering sandbox gateway - one call over two extraction strategies.
//!
//! ```text
//! fetch_and_extract(url, locator)
//!     │
//!     ├─► static:  HTTP GET ─► shared parsing context ─► Extraction
//!     │               │
//!     │               └─ empty result, or 403 ─┐
//!     │                                        ▼
//!     └─► dynamic: temporary window ─► load (bounded) ─► settle ─► extract ─► close
//! ```
//!
//! The parsing context is created lazily behind a single-flight guard and
//! reused for the life of the process. Render windows are per call and are
//! always closed before returning.

pub mod fetch;
pub mod parser;
pub mod render;
pub mod single_flight;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::MonitorSettings;
use crate::error::{MonitorError, Result, SandboxError};
use crate::extractor::Locator;
use crate::types::Extraction;

pub use fetch::{parse_target, FetchedPage, HttpFetcher, PageFetcher, DEFAULT_USER_AGENT};
pub use parser::{ParseRequest, ParsingContext, ThreadParsingContext};
pub use render::{BrowserLauncher, HeadlessBrowser, RenderWindow};
pub use single_flight::SingleFlight;

/// Anything that can fetch a page and extract a fragment from it.
///
/// The job runner depends on this rather than on the gateway so tests can
/// script page contents.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_and_extract(&self, url: &str, locator: &str) -> Result<Extraction>;
}

/// Which strategy produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Static,
    Dynamic,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Result of a selector preview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub strategy: Strategy,
    #[serde(flatten)]
    pub extraction: Extraction,
}

pub struct SandboxGateway {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn ParsingContext>,
    parser_guard: SingleFlight<SandboxError>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    render_timeout: Duration,
    settle_delay: Duration,
}

impl SandboxGateway {
    pub fn new(fetcher: Arc<dyn PageFetcher>, parser: Arc<dyn ParsingContext>) -> Self {
        Self {
            fetcher,
            parser,
            parser_guard: SingleFlight::new(),
            browser: None,
            render_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_secs(2),
        }
    }

    /// Gateway with an HTTP fetcher, a thread-backed parsing context and,
    /// when a browser binary is configured, the dynamic fallback.
    pub fn from_settings(settings: &MonitorSettings) -> Result<Self> {
        let fetcher = HttpFetcher::new(&settings.user_agent, settings.fetch_timeout)?;
        let mut gateway = Self::new(Arc::new(fetcher), Arc::new(ThreadParsingContext::new()))
            .with_render_timeout(settings.render_timeout)
            .with_settle_delay(settings.settle_delay);

        if let Some(binary) = &settings.browser_binary {
            let browser = HeadlessBrowser::new(binary).with_script_budget(settings.settle_delay);
            gateway = gateway.with_browser(Arc::new(browser));
        }

        Ok(gateway)
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = Some(browser);
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

    /// Run the full static-then-dynamic pipeline and report which strategy
    /// answered. Touches no persisted state.
    pub async fn probe(&self, url: &str, locator: &str) -> Result<ProbeReport> {
        let url = parse_target(url)?;
        Locator::parse(locator)?;

        let started = Instant::now();
        let static_outcome = self.extract_static(&url, locator).await;

        let escalate = match &static_outcome {
            Ok(extraction) => extraction.is_empty(),
            Err(e) => e.warrants_escalation(),
        };
        if !escalate {
            debug!(
                url = %url,
                strategy = %Strategy::Static,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Extraction finished"
            );
            return static_outcome.map(|extraction| ProbeReport {
                strategy: Strategy::Static,
                extraction,
            });
        }

        let Some(browser) = &self.browser else {
            debug!(url = %url, "Static extraction empty and no browser configured");
            return static_outcome.map(|extraction| ProbeReport {
                strategy: Strategy::Static,
                extraction,
            });
        };

        match &static_outcome {
            Ok(_) => info!(url = %url, "Static extraction empty, rendering page"),
            Err(e) => warn!(url = %url, error = %e, "Static fetch blocked, rendering page"),
        }

        let static_title = static_outcome.ok().and_then(|e| e.page_title);
        let mut extraction = self.render(browser.as_ref(), &url, locator).await?;
        if extraction.page_title.is_none() {
            extraction.page_title = static_title;
        }

        debug!(
            url = %url,
            strategy = %Strategy::Dynamic,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction finished"
        );
        Ok(ProbeReport {
            strategy: Strategy::Dynamic,
            extraction,
        })
    }

    async fn extract_static(&self, url: &Url, locator: &str) -> Result<Extraction> {
        let page = self.fetcher.fetch(url).await?;
        self.ensure_parser().await?;
        self.parser
            .parse(ParseRequest {
                markup: page.body,
                locator: locator.to_string(),
                base_url: page.final_url,
            })
            .await
    }

    /// Create the parsing context unless it exists. Concurrent callers share
    /// one creation attempt; losing a creation race is not an error.
    pub async fn ensure_parser(&self) -> std::result::Result<(), SandboxError> {
        if self.parser.is_open().await {
            return Ok(());
        }

        let parser = Arc::clone(&self.parser);
        self.parser_guard
            .run(move || {
                async move {
                    match parser.open().await {
                        Ok(()) => Ok(()),
                        Err(SandboxError::AlreadyExists) => {
                            debug!("Parsing context already exists");
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
                .boxed()
            })
            .await
    }

    async fn render(
        &self,
        browser: &dyn BrowserLauncher,
        url: &Url,
        locator: &str,
    ) -> Result<Extraction> {
        let mut window = browser.open_window(url).await?;
        let outcome = self.drive_window(window.as_mut(), url, locator).await;
        window.close().await;
        outcome
    }

    async fn drive_window(
        &self,
        window: &mut dyn RenderWindow,
        url: &Url,
        locator: &str,
    ) -> Result<Extraction> {
        match tokio::time::timeout(self.render_timeout, window.wait_for_load()).await {
            Ok(loaded) => loaded?,
            Err(_) => {
                return Err(MonitorError::Timeout {
                    url: url.to_string(),
                    seconds: self.render_timeout.as_secs(),
                })
            }
        }

        // Let client-side rendering finish
        tokio::time::sleep(self.settle_delay).await;

        window.extract(locator, url).await
    }
}

#[async_trait]
impl PageSource for SandboxGateway {
    async fn fetch_and_extract(&self, url: &str, locator: &str) -> Result<Extraction> {
        self.probe(url, locator).await.map(|report| report.extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{run_job, Change};
    use crate::testing::{MockBrowser, MockFetcher, MockParsingContext};
    use crate::types::{ContentMode, JobStatus, MonitoringJob};

    const PAGE: &str = "https://example.com/news";

    fn gateway(fetcher: MockFetcher) -> SandboxGateway {
        SandboxGateway::new(Arc::new(fetcher), Arc::new(ThreadParsingContext::new()))
            .with_settle_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_static_hit_does_not_render() {
        let browser = Arc::new(MockBrowser::rendering(
            r#"<div class="headline">Rendered</div>"#,
        ));
        let gateway = gateway(MockFetcher::new().with_page(
            PAGE,
            r#"<div class="headline">Launch Day</div>"#,
        ))
        .with_browser(browser.clone());

        let report = gateway.probe(PAGE, ".headline").await.unwrap();

        assert_eq!(report.strategy, Strategy::Static);
        assert_eq!(report.extraction.text, "Launch Day");
        assert_eq!(browser.opened(), 0);
    }

    #[tokio::test]
    async fn test_empty_static_escalates_to_render() {
        let browser = Arc::new(MockBrowser::rendering(
            r#"<div class="headline">Rendered by script</div>"#,
        ));
        let gateway = gateway(MockFetcher::new().with_page(
            PAGE,
            r#"<html><head><title>App</title></head><body><div id="root"></div></body></html>"#,
        ))
        .with_browser(browser.clone());

        let report = gateway.probe(PAGE, ".headline").await.unwrap();

        assert_eq!(report.strategy, Strategy::Dynamic);
        assert_eq!(report.extraction.text, "Rendered by script");
        assert_eq!(report.extraction.page_title.as_deref(), Some("App"));
        assert_eq!(browser.opened(), 1);
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_markup_escalates_to_render() {
        let browser = Arc::new(MockBrowser::rendering(
            r#"<div class="headline">Rendered by script</div>"#,
        ));
        let gateway = gateway(MockFetcher::new().with_page(
            PAGE,
            r#"<div class="headline"><span class="spinner"></span></div>"#,
        ))
        .with_browser(browser.clone());

        let report = gateway.probe(PAGE, ".headline").await.unwrap();

        assert_eq!(report.strategy, Strategy::Dynamic);
        assert_eq!(report.extraction.text, "Rendered by script");
        assert_eq!(browser.opened(), 1);
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_both_strategies_empty_fails_job_and_keeps_baseline() {
        let baseline = crate::fingerprint::fingerprint("Launch Day");
        let browser = Arc::new(MockBrowser::rendering(r#"<div class="other">Sidebar</div>"#));
        let gateway = gateway(MockFetcher::new().with_page(
            PAGE,
            r#"<div class="headline"><span class="spinner"></span></div>"#,
        ))
        .with_browser(browser.clone());
        let job = MonitoringJob::new("News", PAGE, ".headline").with_fingerprint(baseline.clone());

        let outcome = run_job(&gateway, job, ContentMode::Text).await;

        assert_eq!(outcome.change, Change::Failed);
        assert_eq!(outcome.job.status, JobStatus::Error);
        assert_eq!(outcome.job.last_fingerprint, baseline);
        assert!(outcome.announcement.is_none());
        assert_eq!(browser.opened(), 1);
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_server_error_does_not_escalate() {
        let browser = Arc::new(MockBrowser::rendering("<p>x</p>"));
        let gateway = gateway(MockFetcher::new().with_status(PAGE, 500))
            .with_browser(browser.clone());

        let err = gateway.probe(PAGE, "p").await.unwrap_err();

        assert!(matches!(err, MonitorError::HttpStatus { status: 500, .. }));
        assert_eq!(browser.opened(), 0);
    }

    #[tokio::test]
    async fn test_forbidden_escalates() {
        let browser = Arc::new(MockBrowser::rendering(r#"<p class="x">Behind the wall</p>"#));
        let gateway = gateway(MockFetcher::new().with_status(PAGE, 403))
            .with_browser(browser.clone());

        let report = gateway.probe(PAGE, ".x").await.unwrap();

        assert_eq!(report.strategy, Strategy::Dynamic);
        assert_eq!(report.extraction.text, "Behind the wall");
    }

    #[tokio::test]
    async fn test_render_failure_is_final_error_and_window_closed() {
        let browser = Arc::new(MockBrowser::failing_extract("script injection failed"));
        let gateway = gateway(MockFetcher::new().with_page(PAGE, "<body></body>"))
            .with_browser(browser.clone());

        let err = gateway.probe(PAGE, ".headline").await.unwrap_err();

        assert!(matches!(err, MonitorError::Render(_)));
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_render_timeout_closes_window() {
        let browser = Arc::new(MockBrowser::hanging());
        let gateway = gateway(MockFetcher::new().with_page(PAGE, "<body></body>"))
            .with_browser(browser.clone())
            .with_render_timeout(Duration::from_millis(20));

        let err = gateway.probe(PAGE, ".headline").await.unwrap_err();

        assert!(matches!(err, MonitorError::Timeout { .. }));
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn test_empty_without_browser_returns_empty() {
        let gateway = gateway(MockFetcher::new().with_page(PAGE, "<body></body>"));

        let extraction = gateway.fetch_and_extract(PAGE, ".headline").await.unwrap();

        assert!(extraction.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected_before_fetch() {
        let fetcher = MockFetcher::new();
        let gateway = gateway(fetcher.clone());

        assert!(matches!(
            gateway.probe("not a url", "p").await,
            Err(MonitorError::InvalidUrl { .. })
        ));
        assert!(matches!(
            gateway.probe(PAGE, "p[[").await,
            Err(MonitorError::InvalidLocator { .. })
        ));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_create_parser_once() {
        let parser = Arc::new(MockParsingContext::new().with_open_delay(Duration::from_millis(30)));
        let gateway = Arc::new(SandboxGateway::new(
            Arc::new(MockFetcher::new()),
            parser.clone(),
        ));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move { gateway.ensure_parser().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(parser.open_calls(), 1);

        // Reused afterwards, never recreated
        gateway.ensure_parser().await.unwrap();
        assert_eq!(parser.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_racing_duplicate_create_is_swallowed() {
        let parser = Arc::new(MockParsingContext::new().failing_open(SandboxError::AlreadyExists));
        let gateway = SandboxGateway::new(Arc::new(MockFetcher::new()), parser.clone());

        assert!(gateway.ensure_parser().await.is_ok());
    }

    #[tokio::test]
    async fn test_other_create_errors_propagate() {
        let parser = Arc::new(
            MockParsingContext::new().failing_open(SandboxError::Unavailable("no threads".into())),
        );
        let gateway = SandboxGateway::new(Arc::new(MockFetcher::new()), parser.clone());

        assert_eq!(
            gateway.ensure_parser().await,
            Err(SandboxError::Unavailable("no threads".into()))
        );
    }
}
