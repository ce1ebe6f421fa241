//! Static strategy: plain HTTP GET with browser-like headers.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MonitorError, Result};

/// Desktop browser User-Agent to avoid trivial bot detection
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A fetched page body and the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: Url,
    pub body: String,
}

/// Network access for the static strategy.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage>;
}

/// Validate that `raw` is an absolute http(s) URL.
pub fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|_| MonitorError::InvalidUrl {
        url: raw.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(MonitorError::InvalidUrl {
            url: raw.to_string(),
        }),
    }
}

/// reqwest-backed fetcher with a bounded timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            reqwest::header::HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            reqwest::header::UPGRADE_INSECURE_REQUESTS,
            reqwest::header::HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(MonitorError::network)?;

        Ok(Self { client, timeout })
    }

    fn classify(&self, url: &Url, err: reqwest::Error) -> MonitorError {
        if err.is_timeout() {
            MonitorError::Timeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            MonitorError::network(err)
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        debug!(url = %url, "Fetching page");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "HTTP error");
            return Err(MonitorError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| self.classify(url, e))?;

        Ok(FetchedPage { final_url, body })
    }
}
