//! Local test site served by axum.
//!
//! Stands in for remote pages so the static strategy is tested over real
//! HTTP. The `/news` page content can be changed between runs.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct TestSite {
    addr: SocketAddr,
    news: Arc<RwLock<String>>,
}

impl TestSite {
    /// Start serving `news_markup` at `/news`.
    pub async fn start(news_markup: &str) -> Self {
        let news = Arc::new(RwLock::new(news_markup.to_string()));

        let app = Router::new()
            .route("/news", get(news_page))
            .route("/old-news", get(|| async { Redirect::temporary("/articles/latest") }))
            .route("/articles/latest", get(articles_page))
            .route("/blocked", get(|| async { StatusCode::FORBIDDEN }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/slow", get(slow_page))
            .with_state(news.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test site");
        let addr = listener.local_addr().expect("Test site has no address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test site stopped");
        });

        Self { addr, news }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Replace what `/news` serves.
    pub async fn set_news(&self, markup: &str) {
        *self.news.write().await = markup.to_string();
    }
}

async fn news_page(State(news): State<Arc<RwLock<String>>>) -> Html<String> {
    Html(news.read().await.clone())
}

async fn articles_page() -> Html<&'static str> {
    Html(
        r#"<html><head><title>Articles</title></head><body>
            <div class="headline"><a href="story-1">First story</a></div>
        </body></html>"#,
    )
}

async fn slow_page() -> Html<&'static str> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Html(r#"<div class="headline">Too late</div>"#)
}

pub fn headline_page(headline: &str) -> String {
    format!(
        r#"<html><head><title>Example News</title></head>
        <body><div class="headline">{headline}</div></body></html>"#
    )
}
