//! Bing provider: an alternate index when every DuckDuckGo endpoint fails.
//!
//! Result links are usually wrapped in `bing.com/ck/a` click trackers;
//! [`clean_result_url`] unwraps them before the same-origin filter runs.

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::chain::url_normalize::clean_result_url;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::provider::SearchProvider;
use crate::types::{ProviderKind, SearchResult};

use super::read_html;

/// Bing HTML search scraper.
pub struct BingProvider {
    client: reqwest::Client,
    endpoint: String,
    safe_search: bool,
}

impl BingProvider {
    /// Build from the shared client and search configuration.
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            endpoint: config.bing_url.clone(),
            safe_search: config.safe_search,
        }
    }
}

#[async_trait]
impl SearchProvider for BingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bing
    }

    async fn search(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query, "Bing search");

        let safesearch_val = if self.safe_search { "Strict" } else { "Off" };
        let count = n.to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("safeSearch", safesearch_val),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("Bing request failed: {e}")))?;

        let html = read_html(response, self.kind()).await?;
        parse_bing_html(&html, n)
    }
}

/// Parse a Bing HTML response into search results.
///
/// Organic results live in `li.b_algo` containers with the link in `h2 > a`
/// and the snippet in `.b_caption p` (or `.b_lineclamp2` on newer layouts).
pub fn parse_bing_html(html: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(html);

    let result_sel = Selector::parse("li.b_algo")
        .map_err(|e| SearchError::Parse(format!("invalid result selector: {e:?}")))?;
    let link_sel = Selector::parse("h2 a")
        .map_err(|e| SearchError::Parse(format!("invalid link selector: {e:?}")))?;
    let snippet_sel = Selector::parse(".b_caption p, .b_lineclamp2")
        .map_err(|e| SearchError::Parse(format!("invalid snippet selector: {e:?}")))?;

    let mut results = Vec::new();

    for element in document.select(&result_sel) {
        let Some(link) = element.select(&link_sel).next() else {
            continue;
        };

        let title = link.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let Some(url) = link.value().attr("href").and_then(clean_result_url) else {
            continue;
        };

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();

        results.push(SearchResult::new(url, title, snippet, ProviderKind::Bing));

        if results.len() >= max_results {
            break;
        }
    }

    tracing::debug!(count = results.len(), "Bing results parsed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOCK_BING_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<ol id="b_results">
<li class="b_algo">
  <h2><a href="https://www.coindesk.com/price/bitcoin/" h="ID=SERP">Bitcoin Price | CoinDesk</a></h2>
  <div class="b_caption"><p>Live bitcoin price, charts and market cap.</p></div>
</li>
<li class="b_algo">
  <h2><a href="https://www.bing.com/ck/a?!&amp;&amp;p=abc&amp;u=a1aHR0cHM6Ly9leGFtcGxlLmNvbS94&amp;ntb=1">Wrapped Result</a></h2>
  <div class="b_lineclamp2">Wrapped snippet.</div>
</li>
<li class="b_algo">
  <h2><a href="https://www.bing.com/images/search?q=bitcoin">Images</a></h2>
</li>
</ol>
</body>
</html>"#;

    #[test]
    fn parse_mock_html_returns_results() {
        let results = parse_bing_html(MOCK_BING_HTML, 10).expect("should parse");
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].title, "Bitcoin Price | CoinDesk");
        assert_eq!(results[0].url, "https://www.coindesk.com/price/bitcoin/");
        assert!(results[0].snippet_text().contains("market cap"));
        assert_eq!(results[0].provider, ProviderKind::Bing);

        assert_eq!(results[1].url, "https://example.com/x");
        assert_eq!(results[1].snippet_text(), "Wrapped snippet.");
    }

    #[test]
    fn parse_respects_max_results() {
        let results = parse_bing_html(MOCK_BING_HTML, 1).expect("should parse");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn parse_empty_html_returns_empty() {
        let results = parse_bing_html("<html><body></body></html>", 10).expect("should parse");
        assert!(results.is_empty());
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BingProvider>();
    }

    #[tokio::test]
    #[ignore] // Live test: run with `cargo test -- --ignored`
    async fn live_bing_search() {
        let config = SearchConfig::default();
        let client = crate::http::build_client(&config).expect("client");
        let provider = BingProvider::new(client, &config);
        let results = provider.search("rust programming language", 5).await;
        assert!(results.is_ok(), "live search failed: {:?}", results.err());
    }
}
