//! Sequential provider fallback chain with URL dedup and short-TTL caching.
//!
//! Providers are tried in order. Each call runs under its own timeout and
//! its failure is logged and isolated; the chain only moves on when the
//! accumulated unique results are still short of the requested count.

pub mod dedup;
pub mod url_normalize;

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::{CacheKey, SearchCache};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::provider::SearchProvider;
use crate::providers::{
    BingProvider, BrowserlessProvider, DuckDuckGoLite, DuckDuckGoMirrors, DuckDuckGoPost,
    HeuristicSeeds,
};
use crate::types::{ProviderKind, SearchResult};

use dedup::UniqueResults;

/// What happened when one provider was attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    /// The provider answered; `added` of its results were new.
    Ok {
        /// Results returned by the provider.
        returned: usize,
        /// Results that survived URL dedup.
        added: usize,
    },
    /// The provider returned an error.
    Failed {
        /// Error message.
        error: String,
    },
    /// The provider exceeded its time budget.
    TimedOut,
}

/// One entry in the chain's attempt trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAttempt {
    /// Which provider was attempted.
    pub provider: ProviderKind,
    /// Outcome of the attempt.
    pub status: AttemptStatus,
    /// Wall time spent on the attempt.
    pub elapsed_ms: u64,
}

/// Results of one chain run plus the per-provider trace.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainReport {
    /// Unique results, at most the requested count.
    pub results: Vec<SearchResult>,
    /// Providers attempted, in order.
    pub attempts: Vec<ProviderAttempt>,
    /// Whether the results came from the cache.
    pub cache_hit: bool,
}

/// An ordered list of provider strategies with a shared result cache.
pub struct SearchChain {
    providers: Vec<Box<dyn SearchProvider>>,
    cache: SearchCache,
    provider_timeout: Duration,
    max_results_hard: usize,
}

impl std::fmt::Debug for SearchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchChain")
            .field("providers", &self.provider_kinds())
            .field("cache", &self.cache)
            .field("provider_timeout", &self.provider_timeout)
            .field("max_results_hard", &self.max_results_hard)
            .finish()
    }
}

impl SearchChain {
    /// Build a chain from explicit parts.
    pub fn new(
        providers: Vec<Box<dyn SearchProvider>>,
        cache: SearchCache,
        provider_timeout: Duration,
        max_results_hard: usize,
    ) -> Self {
        Self {
            providers,
            cache,
            provider_timeout,
            max_results_hard,
        }
    }

    /// Build the standard chain: DDG POST, DDG mirrors, DDG lite, Bing,
    /// the rendering service (when configured), then heuristic seeds.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an invalid config and
    /// [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let client = http::build_client(config)?;

        let mut providers: Vec<Box<dyn SearchProvider>> = vec![
            Box::new(DuckDuckGoPost::new(client.clone(), config)),
            Box::new(DuckDuckGoMirrors::new(client.clone(), config)),
            Box::new(DuckDuckGoLite::new(client.clone(), config)),
            Box::new(BingProvider::new(client.clone(), config)),
        ];
        let browserless = BrowserlessProvider::new(client, config);
        if browserless.is_enabled() {
            providers.push(Box::new(browserless));
        }
        providers.push(Box::new(HeuristicSeeds));

        Ok(Self::new(
            providers,
            SearchCache::from_config(config),
            Duration::from_millis(config.provider_timeout_ms),
            config.max_results_hard,
        ))
    }

    /// Replace the result cache.
    pub fn with_cache(mut self, cache: SearchCache) -> Self {
        self.cache = cache;
        self
    }

    /// Providers in chain order.
    pub fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// The chain's result cache.
    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    /// Search for `query`, returning at most `n` unique results.
    ///
    /// Never fails: provider errors and timeouts reduce the result count.
    pub async fn search(&self, query: &str, n: usize) -> Vec<SearchResult> {
        self.search_with_report(query, n).await.results
    }

    /// Search for `query` and return the per-provider attempt trace too.
    pub async fn search_with_report(&self, query: &str, n: usize) -> ChainReport {
        let query = query.trim();
        let n = n.min(self.max_results_hard);
        if query.is_empty() || n == 0 {
            return ChainReport::default();
        }

        let key = CacheKey::new(query, n);
        if let Some(results) = self.cache.get(&key).await {
            tracing::debug!(count = results.len(), "search cache hit");
            return ChainReport {
                results,
                attempts: Vec::new(),
                cache_hit: true,
            };
        }

        let mut unique = UniqueResults::new();
        let mut attempts = Vec::new();

        for provider in &self.providers {
            if unique.len() >= n {
                break;
            }
            let kind = provider.kind();
            let started = Instant::now();
            let outcome =
                tokio::time::timeout(self.provider_timeout, provider.search(query, n)).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let status = match outcome {
                Ok(Ok(batch)) => {
                    let returned = batch.len();
                    let added = unique.extend(batch);
                    tracing::debug!(provider = %kind, returned, added, "provider returned results");
                    AttemptStatus::Ok { returned, added }
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider = %kind, error = %e, "provider failed");
                    AttemptStatus::Failed {
                        error: e.to_string(),
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        provider = %kind,
                        timeout_ms = self.provider_timeout.as_millis() as u64,
                        "provider timed out"
                    );
                    AttemptStatus::TimedOut
                }
            };
            attempts.push(ProviderAttempt {
                provider: kind,
                status,
                elapsed_ms,
            });
        }

        let mut results = unique.into_vec();
        results.truncate(n);

        if !results.is_empty() {
            self.cache.insert(key, results.clone()).await;
        }

        ChainReport {
            results,
            attempts,
            cache_hit: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        kind: ProviderKind,
        urls: Vec<&'static str>,
        fail: bool,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn ok(kind: ProviderKind, urls: Vec<&'static str>) -> Self {
            Self {
                kind,
                urls,
                fail: false,
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(kind: ProviderKind) -> Self {
            Self {
                fail: true,
                ..Self::ok(kind, vec![])
            }
        }

        fn slow(kind: ProviderKind, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::ok(kind, vec!["https://slow.example.com"])
            }
        }
    }

    #[async_trait]
    impl SearchProvider for Scripted {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn search(&self, _query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SearchError::Provider(format!("{} blocked", self.kind)));
            }
            Ok(self
                .urls
                .iter()
                .take(n)
                .map(|u| SearchResult::new(*u, "t", "", self.kind))
                .collect())
        }
    }

    fn chain(providers: Vec<Box<dyn SearchProvider>>) -> SearchChain {
        SearchChain::new(
            providers,
            SearchCache::disabled(),
            Duration::from_millis(200),
            20,
        )
    }

    #[tokio::test]
    async fn stops_once_enough_results() {
        let second = Scripted::ok(ProviderKind::Bing, vec!["https://b.com"]);
        let second_calls = Arc::clone(&second.calls);
        let c = chain(vec![
            Box::new(Scripted::ok(
                ProviderKind::DuckDuckGoPost,
                vec!["https://a.com", "https://a.com/2"],
            )),
            Box::new(second),
        ]);
        let results = c.search("q", 2).await;
        assert_eq!(results.len(), 2);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_is_isolated_and_chain_continues() {
        let c = chain(vec![
            Box::new(Scripted::failing(ProviderKind::DuckDuckGoPost)),
            Box::new(Scripted::ok(ProviderKind::Bing, vec!["https://b.com"])),
        ]);
        let report = c.search_with_report("q", 5).await;
        assert_eq!(report.results.len(), 1);
        assert!(matches!(report.attempts[0].status, AttemptStatus::Failed { .. }));
        assert!(matches!(
            report.attempts[1].status,
            AttemptStatus::Ok { returned: 1, added: 1 }
        ));
    }

    #[tokio::test]
    async fn timeout_is_treated_as_no_contribution() {
        let c = chain(vec![
            Box::new(Scripted::slow(ProviderKind::DuckDuckGoPost, Duration::from_secs(5))),
            Box::new(Scripted::ok(ProviderKind::Bing, vec!["https://b.com"])),
        ]);
        let report = c.search_with_report("q", 3).await;
        assert_eq!(report.attempts[0].status, AttemptStatus::TimedOut);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].url, "https://b.com");
    }

    #[tokio::test]
    async fn merges_by_url_across_providers() {
        let c = chain(vec![
            Box::new(Scripted::ok(ProviderKind::DuckDuckGoPost, vec!["https://a.com/x"])),
            Box::new(Scripted::ok(
                ProviderKind::Bing,
                vec!["https://A.com/x/?utm_source=bing", "https://c.com"],
            )),
        ]);
        let results = c.search("q", 5).await;
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["https://a.com/x", "https://c.com"]);
    }

    #[tokio::test]
    async fn respects_hard_cap() {
        let c = SearchChain::new(
            vec![Box::new(Scripted::ok(
                ProviderKind::DuckDuckGoPost,
                vec!["https://1.com", "https://2.com", "https://3.com"],
            ))],
            SearchCache::disabled(),
            Duration::from_millis(200),
            2,
        );
        assert_eq!(c.search("q", 50).await.len(), 2);
    }

    #[tokio::test]
    async fn empty_query_short_circuits() {
        let provider = Scripted::ok(ProviderKind::DuckDuckGoPost, vec!["https://a.com"]);
        let calls = Arc::clone(&provider.calls);
        let c = chain(vec![Box::new(provider)]);
        assert!(c.search("   ", 5).await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_short_circuits_repeat_calls() {
        let provider = Scripted::ok(ProviderKind::DuckDuckGoPost, vec!["https://a.com"]);
        let calls = Arc::clone(&provider.calls);
        let c = chain(vec![Box::new(provider)])
            .with_cache(SearchCache::new(Duration::from_secs(30), 16));
        let first = c.search_with_report("Rust Lang", 3).await;
        let second = c.search_with_report("rust   lang", 3).await;
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(second.results, first.results);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_failures_yield_empty_without_error() {
        let c = chain(vec![
            Box::new(Scripted::failing(ProviderKind::DuckDuckGoPost)),
            Box::new(Scripted::failing(ProviderKind::Bing)),
            Box::new(HeuristicSeeds),
        ]);
        let report = c.search_with_report("storia romana", 5).await;
        assert!(report.results.is_empty());
        assert_eq!(report.attempts.len(), 3);
    }

    #[test]
    fn standard_chain_order() {
        let c = SearchChain::from_config(&SearchConfig::default()).expect("chain");
        assert_eq!(
            c.provider_kinds(),
            vec![
                ProviderKind::DuckDuckGoPost,
                ProviderKind::DuckDuckGoMirrors,
                ProviderKind::DuckDuckGoLite,
                ProviderKind::Bing,
                ProviderKind::HeuristicSeeds,
            ]
        );
    }

    #[test]
    fn rendering_service_joins_chain_when_configured() {
        let config = SearchConfig {
            browserless_url: Some("http://bls:3000".into()),
            ..Default::default()
        };
        let c = SearchChain::from_config(&config).expect("chain");
        assert_eq!(c.provider_kinds()[4], ProviderKind::Browserless);
    }
}
