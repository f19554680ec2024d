//! Page fetching with byte, character and time caps.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::config::SearchConfig;
use crate::content;
use crate::error::{Result, SearchError};
use crate::http;
use crate::types::PageContent;

/// Retrieves a URL and returns its extracted content.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch and extract one page.
    async fn fetch(&self, url: &str) -> Result<PageContent>;
}

/// HTTP fetcher backed by the shared client.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
    max_chars: usize,
}

impl PageFetcher {
    /// Create a fetcher reusing an existing client.
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_millis(config.fetch_timeout_ms),
            max_bytes: config.fetch_max_bytes,
            max_chars: config.fetch_max_chars,
        }
    }

    /// Create a fetcher with its own client.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the client cannot be built.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self::new(http::build_client(config)?, config))
    }

    /// Override the per-fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch several pages concurrently, each under its own timeout.
    ///
    /// Results keep the input order; failures stay in place as `Err`.
    pub async fn fetch_many(&self, urls: &[String]) -> Vec<Result<PageContent>> {
        join_all(urls.iter().map(|u| self.fetch_page(u))).await
    }

    async fn fetch_page(&self, url: &str) -> Result<PageContent> {
        match tokio::time::timeout(self.timeout, self.download(url)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(format!(
                "fetch of {url} exceeded {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn download(&self, url: &str) -> Result<PageContent> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SearchError::Http(format!("invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SearchError::Http(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        tracing::trace!(url, "fetching page");
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Http(format!("{url} returned HTTP {status}")));
        }

        if let Some(kind) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_textual(kind) {
                return Err(SearchError::Parse(format!("unsupported content type: {kind}")));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SearchError::Http(format!("failed to read {url}: {e}")))?
        {
            let room = self.max_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_bytes {
                tracing::debug!(url, max_bytes = self.max_bytes, "page body capped");
                break;
            }
        }

        let html = String::from_utf8_lossy(&body);
        content::extract_content_with_limit(&html, url, self.max_chars)
    }
}

#[async_trait]
impl ContentFetcher for PageFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent> {
        self.fetch_page(url).await
    }
}

fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || mime.contains("html") || mime.contains("xml")
}
