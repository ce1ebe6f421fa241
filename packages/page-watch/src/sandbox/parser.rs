//! The shared document-parsing context.
//!
//! `scraper::Html` is not `Send`, so documents are parsed on one dedicated
//! thread and results come back over a channel. The context is created once,
//! on first use, and lives for the rest of the process.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};
use url::Url;

use crate::error::{MonitorError, Result, SandboxError};
use crate::extractor::{self, Locator};
use crate::types::Extraction;

/// Markup to parse, the selector to apply and the URL it came from.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub markup: String,
    pub locator: String,
    pub base_url: Url,
}

/// A long-lived context that turns markup into extractions.
#[async_trait]
pub trait ParsingContext: Send + Sync {
    async fn is_open(&self) -> bool;

    /// Create the context. Fails with [`SandboxError::AlreadyExists`] when it
    /// is already open.
    async fn open(&self) -> std::result::Result<(), SandboxError>;

    async fn parse(&self, request: ParseRequest) -> Result<Extraction>;
}

struct Envelope {
    request: ParseRequest,
    reply: oneshot::Sender<Result<Extraction>>,
}

/// Parsing context backed by a dedicated OS thread.
#[derive(Default)]
pub struct ThreadParsingContext {
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
}

impl ThreadParsingContext {
    pub fn new() -> Self {
        Self::default()
    }
}

fn serve(mut inbox: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(envelope) = inbox.blocking_recv() {
        let request = envelope.request;
        let result = Locator::parse(&request.locator)
            .map(|locator| extractor::extract(&request.markup, &locator, &request.base_url));
        // Caller may have given up waiting
        let _ = envelope.reply.send(result);
    }
    debug!("Parsing context inbox closed");
}

#[async_trait]
impl ParsingContext for ThreadParsingContext {
    async fn is_open(&self) -> bool {
        self.sender
            .lock()
            .await
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    async fn open(&self) -> std::result::Result<(), SandboxError> {
        let mut slot = self.sender.lock().await;
        if slot.as_ref().is_some_and(|sender| !sender.is_closed()) {
            return Err(SandboxError::AlreadyExists);
        }

        let (sender, inbox) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("page-watch-parser".to_string())
            .spawn(move || serve(inbox))
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;

        *slot = Some(sender);
        info!("Parsing context started");
        Ok(())
    }

    async fn parse(&self, request: ParseRequest) -> Result<Extraction> {
        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or(MonitorError::Sandbox(SandboxError::Closed))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(Envelope { request, reply })
            .map_err(|_| MonitorError::Sandbox(SandboxError::Closed))?;

        response
            .await
            .map_err(|_| MonitorError::Sandbox(SandboxError::Closed))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(markup: &str, locator: &str) -> ParseRequest {
        ParseRequest {
            markup: markup.to_string(),
            locator: locator.to_string(),
            base_url: Url::parse("https://example.com/news").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_parse_requires_open_context() {
        let context = ThreadParsingContext::new();
        assert!(!context.is_open().await);

        let err = context
            .parse(request("<p>x</p>", "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Sandbox(SandboxError::Closed)));
    }

    #[tokio::test]
    async fn test_second_open_reports_already_exists() {
        let context = ThreadParsingContext::new();
        context.open().await.unwrap();
        assert!(context.is_open().await);
        assert_eq!(context.open().await, Err(SandboxError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_parses_on_dedicated_thread() {
        let context = ThreadParsingContext::new();
        context.open().await.unwrap();

        let result = context
            .parse(request(
                r#"<div class="headline"><a href="/launch">Launch Day</a></div>"#,
                ".headline",
            ))
            .await
            .unwrap();

        assert_eq!(result.text, "Launch Day");
        assert_eq!(
            result.primary_link.as_deref(),
            Some("https://example.com/launch")
        );
    }

    #[tokio::test]
    async fn test_bad_selector_is_reported() {
        let context = ThreadParsingContext::new();
        context.open().await.unwrap();

        let err = context.parse(request("<p>x</p>", "p[[")).await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidLocator { .. }));
    }
}
