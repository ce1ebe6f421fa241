//! Mock collaborators for tests.
//!
//! Each mock is cheap to clone; clones share scripted responses and call
//! records, so a test can hand one clone to the code under test and inspect
//! another.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

use crate::error::{MonitorError, Result, SandboxError, StoreError};
use crate::extractor::{self, Locator};
use crate::notify::Notifier;
use crate::sandbox::{
    BrowserLauncher, FetchedPage, PageFetcher, PageSource, ParseRequest, ParsingContext,
    RenderWindow,
};
use crate::store::{MemoryStore, StateSnapshot, StateStore};
use crate::types::{Announcement, Extraction, Feed, MonitoringJob};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unscripted(url: &str) -> MonitorError {
    MonitorError::network(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no scripted response for {url}"),
    ))
}

// =============================================================================
// Page source
// =============================================================================

#[derive(Debug, Clone)]
enum Scripted {
    Page(Extraction),
    Status(u16),
    Panic,
}

/// Scripted [`PageSource`] keyed by URL.
#[derive(Clone, Default)]
pub struct MockPageSource {
    pages: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `url` with plain extracted text.
    pub fn with_text(self, url: &str, text: &str) -> Self {
        self.set_text(url, text);
        self
    }

    pub fn with_extraction(self, url: &str, extraction: Extraction) -> Self {
        lock(&self.pages).insert(url.to_string(), Scripted::Page(extraction));
        self
    }

    /// Fail `url` with an HTTP status error.
    pub fn with_status(self, url: &str, status: u16) -> Self {
        lock(&self.pages).insert(url.to_string(), Scripted::Status(status));
        self
    }

    /// Panic while handling `url`, as a crashing job would.
    pub fn with_panic(self, url: &str) -> Self {
        lock(&self.pages).insert(url.to_string(), Scripted::Panic);
        self
    }

    /// Delay every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change what `url` returns, e.g. between two runs.
    pub fn set_text(&self, url: &str, text: &str) {
        let extraction = Extraction {
            text: text.to_string(),
            ..Default::default()
        };
        lock(&self.pages).insert(url.to_string(), Scripted::Page(extraction));
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// URLs requested, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Highest number of requests that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for MockPageSource {
    async fn fetch_and_extract(&self, url: &str, _locator: &str) -> Result<Extraction> {
        lock(&self.calls).push(url.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = lock(&self.pages).get(url).cloned();
        match scripted {
            Some(Scripted::Page(extraction)) => Ok(extraction),
            Some(Scripted::Status(status)) => Err(MonitorError::HttpStatus {
                status,
                url: url.to_string(),
            }),
            Some(Scripted::Panic) => panic!("scripted panic for {url}"),
            None => Err(unscripted(url)),
        }
    }
}

// =============================================================================
// Fetcher
// =============================================================================

/// Scripted [`PageFetcher`]: canned bodies or status codes keyed by URL.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, std::result::Result<String, u16>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        lock(&self.responses).insert(url.to_string(), Ok(body.to_string()));
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        lock(&self.responses).insert(url.to_string(), Err(status));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        lock(&self.calls).push(url.to_string());

        let response = lock(&self.responses).get(url.as_str()).cloned();
        match response {
            Some(Ok(body)) => Ok(FetchedPage {
                final_url: url.clone(),
                body,
            }),
            Some(Err(status)) => Err(MonitorError::HttpStatus {
                status,
                url: url.to_string(),
            }),
            None => Err(unscripted(url.as_str())),
        }
    }
}

// =============================================================================
// Parsing context
// =============================================================================

/// In-process [`ParsingContext`] that counts creation attempts.
#[derive(Clone, Default)]
pub struct MockParsingContext {
    open: Arc<AtomicBool>,
    open_calls: Arc<AtomicUsize>,
    open_delay: Option<Duration>,
    open_failure: Option<SandboxError>,
}

impl MockParsingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make each creation take a while, widening the window for races.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Make every creation fail with `error`.
    pub fn failing_open(mut self, error: SandboxError) -> Self {
        self.open_failure = Some(error);
        self
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParsingContext for MockParsingContext {
    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open(&self) -> std::result::Result<(), SandboxError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.open_failure {
            return Err(error.clone());
        }
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(SandboxError::AlreadyExists);
        }
        Ok(())
    }

    async fn parse(&self, request: ParseRequest) -> Result<Extraction> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(SandboxError::Closed.into());
        }
        let locator = Locator::parse(&request.locator)?;
        Ok(extractor::extract(&request.markup, &locator, &request.base_url))
    }
}

// =============================================================================
// Browser
// =============================================================================

#[derive(Debug, Clone)]
enum WindowScript {
    Render(String),
    FailExtract(String),
    Hang,
}

/// Scripted [`BrowserLauncher`] that counts opened and closed windows.
#[derive(Clone)]
pub struct MockBrowser {
    script: WindowScript,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockBrowser {
    fn scripted(script: WindowScript) -> Self {
        Self {
            script,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every window renders to `dom`.
    pub fn rendering(dom: &str) -> Self {
        Self::scripted(WindowScript::Render(dom.to_string()))
    }

    /// Windows load but in-page extraction fails.
    pub fn failing_extract(message: &str) -> Self {
        Self::scripted(WindowScript::FailExtract(message.to_string()))
    }

    /// Windows never signal load completion.
    pub fn hanging() -> Self {
        Self::scripted(WindowScript::Hang)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn open_window(&self, _url: &Url) -> Result<Box<dyn RenderWindow>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockWindow {
            script: self.script.clone(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct MockWindow {
    script: WindowScript,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderWindow for MockWindow {
    async fn wait_for_load(&mut self) -> Result<()> {
        if let WindowScript::Hang = self.script {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn extract(&mut self, locator: &str, base_url: &Url) -> Result<Extraction> {
        match &self.script {
            WindowScript::Render(dom) => {
                let locator = Locator::parse(locator)?;
                Ok(extractor::extract(dom, &locator, base_url))
            }
            WindowScript::FailExtract(message) => Err(MonitorError::Render(message.clone())),
            WindowScript::Hang => Err(MonitorError::Render("page never loaded".to_string())),
        }
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Store
// =============================================================================

/// [`MemoryStore`] that records writes and can be told to fail commits.
#[derive(Default)]
pub struct MockStore {
    inner: MemoryStore,
    fail_commit: bool,
    commits: AtomicUsize,
    checking: Mutex<Vec<bool>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<MonitoringJob>) -> Self {
        Self {
            inner: MemoryStore::with_jobs(jobs),
            ..Default::default()
        }
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> std::result::Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only state",
            )));
        }
        Ok(())
    }

    /// Every value the checking flag was set to, in order.
    pub fn checking_history(&self) -> Vec<bool> {
        lock(&self.checking).clone()
    }
}

#[async_trait]
impl StateStore for MockStore {
    async fn load(&self) -> std::result::Result<StateSnapshot, StoreError> {
        self.inner.load().await
    }

    async fn commit(
        &self,
        jobs: Vec<MonitoringJob>,
        feed: Feed,
    ) -> std::result::Result<(), StoreError> {
        self.check_writable()?;
        self.inner.commit(jobs, feed).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_batch(
        &self,
        checked: Vec<MonitoringJob>,
        fresh: Vec<Announcement>,
        feed_limit: usize,
    ) -> std::result::Result<(), StoreError> {
        self.check_writable()?;
        self.inner.apply_batch(checked, fresh, feed_limit).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_checking(&self, checking: bool) -> std::result::Result<(), StoreError> {
        lock(&self.checking).push(checking);
        self.inner.set_checking(checking).await
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// [`Notifier`] that keeps every batch it was told about.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    batches: Arc<Mutex<Vec<Vec<Announcement>>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the notifier fired.
    pub fn batches(&self) -> usize {
        lock(&self.batches).len()
    }

    /// All announcements received, flattened.
    pub fn announced(&self) -> Vec<Announcement> {
        lock(&self.batches).iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn announce(&self, fresh: &[Announcement]) {
        lock(&self.batches).push(fresh.to_vec());
    }
}
