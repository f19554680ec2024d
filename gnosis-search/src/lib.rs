//! # gnosis-search
//!
//! Keyless web search and page extraction for the gnosis research pipeline.
//!
//! Public HTML search pages are scraped directly; there are no API keys to
//! configure. Providers are tried in a fixed fallback order until enough
//! unique results have been gathered.
//!
//! ## Design
//!
//! - DuckDuckGo (POST, mirror GETs, lite), then Bing, then an optional
//!   headless-browser rendering service, then curated seed URLs per category
//! - Each provider runs under its own timeout; a failure never aborts the chain
//! - URLs are unwrapped from redirect links, stripped of tracking parameters
//!   and deduplicated case-insensitively on host, path and filtered query
//! - Short-TTL in-memory cache keyed by normalised query and result count
//! - Page fetches are capped by bytes, characters and time, and yield
//!   block-structured text plus the page's `og:image`
//!
//! ## Privacy
//!
//! Search queries are logged only at trace level.

pub mod cache;
pub mod chain;
pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod http;
pub mod provider;
pub mod providers;
pub mod types;

pub use cache::SearchCache;
pub use chain::{ChainReport, SearchChain};
pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use fetch::{ContentFetcher, PageFetcher};
pub use provider::SearchProvider;
pub use types::{PageContent, ProviderKind, SearchResult};

/// Search the web with the standard provider chain.
///
/// Builds a one-off [`SearchChain`]; long-lived callers should build the
/// chain once and reuse it so the result cache is shared.
///
/// # Errors
///
/// Returns [`SearchError::Config`] if `config` is invalid. Provider failures
/// only reduce the number of results.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> gnosis_search::Result<()> {
/// let config = gnosis_search::SearchConfig::default();
/// let results = gnosis_search::search("meteo roma", 5, &config).await?;
/// for result in &results {
///     println!("{}: {}", result.title, result.url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search(query: &str, n: usize, config: &SearchConfig) -> Result<Vec<SearchResult>> {
    let chain = SearchChain::from_config(config)?;
    Ok(chain.search(query, n).await)
}

/// Fetch a page and extract its readable text.
///
/// # Errors
///
/// Returns [`SearchError::Http`] or [`SearchError::Timeout`] if the page
/// cannot be fetched, or [`SearchError::Parse`] if it has no extractable text.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> gnosis_search::Result<()> {
/// let config = gnosis_search::SearchConfig::default();
/// let page = gnosis_search::fetch_page_content("https://example.com", &config).await?;
/// println!("{} ({} words)", page.title, page.word_count);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_page_content(url: &str, config: &SearchConfig) -> Result<PageContent> {
    PageFetcher::from_config(config)?.fetch(url).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_validates_config_zero_timeout() {
        let config = SearchConfig {
            provider_timeout_ms: 0,
            ..Default::default()
        };
        let result = search("test", 5, &config).await;
        assert!(result.unwrap_err().to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn search_validates_config_zero_hard_cap() {
        let config = SearchConfig {
            max_results_hard: 0,
            ..Default::default()
        };
        assert!(search("test", 5, &config).await.is_err());
    }

    #[tokio::test]
    async fn fetch_page_content_rejects_bad_scheme() {
        let err = fetch_page_content("file:///etc/passwd", &SearchConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }
}
