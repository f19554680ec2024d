//! Trait definition for pluggable search provider strategies.
//!
//! Each step of the fallback chain (DuckDuckGo endpoints, Bing, the
//! headless-browser service, heuristic seeds) implements
//! [`SearchProvider`] so the chain can iterate a tagged list of
//! strategies with isolated error capture per strategy.

use async_trait::async_trait;

use crate::error::SearchError;
use crate::types::{ProviderKind, SearchResult};

/// A single "attempt search" strategy in the provider chain.
///
/// Implementors handle their own:
///
/// - URL construction with query encoding
/// - HTTP request with the shared client
/// - Tolerant HTML parsing into title/URL/snippet triples
/// - URL sanitising via [`crate::chain::url_normalize::clean_result_url`]
///
/// All implementations must be `Send + Sync`; the chain holds them as
/// `Box<dyn SearchProvider>`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Which step of the chain this implementation represents.
    fn kind(&self) -> ProviderKind;

    /// Perform a search and return at most `n` parsed results.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the HTTP request fails, the response is
    /// blocked, or the HTML cannot be parsed. The chain logs the error and
    /// moves on to the next provider.
    async fn search(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError>;
}
