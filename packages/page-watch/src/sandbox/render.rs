//! Dynamic strategy: render the page in a throwaway headless browser.
//!
//! Each render gets its own window. The gateway bounds the load wait, applies
//! the settle delay and always closes the window, on success or failure.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::debug;
use url::Url;

use crate::error::{MonitorError, Result};
use crate::extractor::{self, Locator};
use crate::types::Extraction;

/// Opens temporary rendering windows.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open_window(&self, url: &Url) -> Result<Box<dyn RenderWindow>>;
}

/// A single temporary window navigated to one URL.
#[async_trait]
pub trait RenderWindow: Send {
    /// Resolve once the page signals load completion.
    async fn wait_for_load(&mut self) -> Result<()>;

    /// Apply `locator` inside the rendered document.
    async fn extract(&mut self, locator: &str, base_url: &Url) -> Result<Extraction>;

    /// Tear the window down. Must be safe to call in any state.
    async fn close(&mut self);
}

/// Launches a Chromium-family binary in headless mode and captures the
/// rendered DOM once the page has loaded.
pub struct HeadlessBrowser {
    binary: PathBuf,
    script_budget: Duration,
}

impl HeadlessBrowser {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            script_budget: Duration::from_secs(2),
        }
    }

    /// Virtual time the browser grants page scripts before dumping the DOM.
    pub fn with_script_budget(mut self, budget: Duration) -> Self {
        self.script_budget = budget;
        self
    }
}

#[async_trait]
impl BrowserLauncher for HeadlessBrowser {
    async fn open_window(&self, url: &Url) -> Result<Box<dyn RenderWindow>> {
        debug!(url = %url, binary = %self.binary.display(), "Launching headless browser");
        let child = Command::new(&self.binary)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio")
            .arg(format!(
                "--virtual-time-budget={}",
                self.script_budget.as_millis()
            ))
            .arg("--dump-dom")
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MonitorError::Render(format!(
                    "failed to launch {}: {e}",
                    self.binary.display()
                ))
            })?;

        Ok(Box::new(HeadlessWindow {
            child: Some(child),
            dom: None,
        }))
    }
}

struct HeadlessWindow {
    child: Option<Child>,
    dom: Option<String>,
}

#[async_trait]
impl RenderWindow for HeadlessWindow {
    async fn wait_for_load(&mut self) -> Result<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| MonitorError::Render("window already closed".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MonitorError::Render("browser output unavailable".to_string()))?;

        let mut dom = String::new();
        stdout
            .read_to_string(&mut dom)
            .await
            .map_err(|e| MonitorError::Render(format!("reading rendered page: {e}")))?;

        let status = child
            .wait()
            .await
            .map_err(|e| MonitorError::Render(format!("waiting for browser: {e}")))?;
        if !status.success() {
            return Err(MonitorError::Render(format!("browser exited with {status}")));
        }

        self.dom = Some(dom);
        Ok(())
    }

    async fn extract(&mut self, locator: &str, base_url: &Url) -> Result<Extraction> {
        let dom = self
            .dom
            .take()
            .ok_or_else(|| MonitorError::Render("page never finished loading".to_string()))?;
        let locator = locator.to_string();
        let base_url = base_url.clone();

        // Html is not Send; parse off the async workers
        tokio::task::spawn_blocking(move || {
            Locator::parse(&locator).map(|locator| extractor::extract(&dom, &locator, &base_url))
        })
        .await
        .map_err(|e| MonitorError::Render(format!("in-page extraction aborted: {e}")))?
    }

    async fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Browser already gone");
            }
        }
    }
}
