//! Headless-browser provider: renders the DuckDuckGo HTML page through a
//! Browserless-compatible `/content` service when plain HTTP is blocked.

use async_trait::async_trait;
use serde_json::json;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::provider::SearchProvider;
use crate::types::{ProviderKind, SearchResult};

use super::duckduckgo::parse_duckduckgo_html;
use super::read_html;

/// Rendering-service provider. Disabled unless a service URL is configured.
pub struct BrowserlessProvider {
    client: reqwest::Client,
    service_url: Option<String>,
    token: Option<String>,
    target_base: String,
}

impl BrowserlessProvider {
    /// Build from the shared client and search configuration.
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            service_url: config.browserless_url.clone(),
            token: config.browserless_token.clone(),
            target_base: config.ddg_html_url.clone(),
        }
    }

    /// Returns `true` if a rendering service is configured.
    pub fn is_enabled(&self) -> bool {
        self.service_url.is_some()
    }

    /// The `/content` endpoint, with the access token when one is set.
    fn content_endpoint(&self, service: &str) -> String {
        let base = service.trim_end_matches('/');
        match &self.token {
            Some(token) => format!("{base}/content?token={}", urlencode(token)),
            None => format!("{base}/content"),
        }
    }

    /// The results page the service is asked to render.
    fn target_url(&self, query: &str) -> String {
        let mut target = match url::Url::parse(&self.target_base) {
            Ok(u) => u,
            Err(_) => return format!("https://html.duckduckgo.com/html/?q={}", urlencode(query)),
        };
        target.query_pairs_mut().append_pair("q", query);
        target.to_string()
    }
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl SearchProvider for BrowserlessProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Browserless
    }

    async fn search(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
        let Some(service) = self.service_url.as_deref() else {
            tracing::trace!("rendering service not configured, skipping");
            return Ok(Vec::new());
        };
        tracing::trace!(query, "rendering-service search");

        let body = json!({
            "url": self.target_url(query),
            "waitFor": "body",
        });
        let response = self
            .client
            .post(self.content_endpoint(service))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("rendering service request failed: {e}")))?;
        let html = read_html(response, self.kind()).await?;
        parse_duckduckgo_html(&html, n, self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(url: Option<&str>, token: Option<&str>) -> BrowserlessProvider {
        let config = SearchConfig {
            browserless_url: url.map(str::to_owned),
            browserless_token: token.map(str::to_owned),
            ..Default::default()
        };
        let client = crate::http::build_client(&config).expect("client");
        BrowserlessProvider::new(client, &config)
    }

    #[tokio::test]
    async fn disabled_provider_returns_empty() {
        let p = provider(None, None);
        assert!(!p.is_enabled());
        let results = p.search("anything", 5).await.expect("ok");
        assert!(results.is_empty());
    }

    #[test]
    fn content_endpoint_includes_token() {
        let p = provider(Some("http://bls:3000/"), Some("a b"));
        assert_eq!(
            p.content_endpoint("http://bls:3000/"),
            "http://bls:3000/content?token=a+b"
        );
    }

    #[test]
    fn content_endpoint_without_token() {
        let p = provider(Some("http://bls:3000"), None);
        assert_eq!(p.content_endpoint("http://bls:3000"), "http://bls:3000/content");
    }

    #[test]
    fn target_url_encodes_query() {
        let p = provider(Some("http://bls:3000"), None);
        assert_eq!(
            p.target_url("meteo roma"),
            "https://html.duckduckgo.com/html/?q=meteo+roma"
        );
    }
}
