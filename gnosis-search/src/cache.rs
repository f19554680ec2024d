//! Short-TTL in-memory cache for search results.
//!
//! Caches the final deduplicated result list keyed by the
//! (normalised query, requested count) pair. Uses [`moka`] for
//! async-friendly caching with TTL and bounded size.
//!
//! The cache is an explicit object owned by whoever builds the
//! [`crate::SearchChain`]; there is no process-wide instance. Concurrent
//! identical queries may both miss and both fill: duplicate work, never
//! corruption.

use std::time::Duration;

use moka::future::Cache;

use crate::config::SearchConfig;
use crate::types::SearchResult;

/// Composite cache key: normalised query + requested result count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Lowercased, trimmed, whitespace-collapsed query string.
    query: String,
    /// Requested number of results.
    n: usize,
}

impl CacheKey {
    /// Build a deterministic cache key from a query and result count.
    pub fn new(query: &str, n: usize) -> Self {
        let query = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Self { query, n }
    }
}

/// Injected result cache. A TTL of zero disables caching entirely.
#[derive(Clone)]
pub struct SearchCache {
    inner: Option<Cache<CacheKey, Vec<SearchResult>>>,
}

impl std::fmt::Debug for SearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCache")
            .field("enabled", &self.inner.is_some())
            .field("entries", &self.entry_count())
            .finish()
    }
}

impl SearchCache {
    /// Create a cache with the given TTL and maximum entry count.
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        if ttl.is_zero() || capacity == 0 {
            return Self::disabled();
        }
        Self {
            inner: Some(
                Cache::builder()
                    .max_capacity(capacity)
                    .time_to_live(ttl)
                    .build(),
            ),
        }
    }

    /// Create a cache sized from `config.cache_ttl_seconds` / `cache_capacity`.
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            Duration::from_secs(config.cache_ttl_seconds),
            config.cache_capacity,
        )
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Look up cached results. Returns `None` on miss or when disabled.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<SearchResult>> {
        match &self.inner {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    /// Insert results into the cache.
    pub async fn insert(&self, key: CacheKey, results: Vec<SearchResult>) {
        if let Some(cache) = &self.inner {
            cache.insert(key, results).await;
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |c| c.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    fn sample(title: &str) -> Vec<SearchResult> {
        vec![SearchResult::new(
            format!("https://{title}.com"),
            title,
            "",
            ProviderKind::DuckDuckGoPost,
        )]
    }

    #[test]
    fn cache_key_normalises_case_and_whitespace() {
        assert_eq!(
            CacheKey::new("  Bitcoin   PRICE ", 5),
            CacheKey::new("bitcoin price", 5)
        );
    }

    #[test]
    fn cache_key_differs_by_n() {
        assert_ne!(CacheKey::new("rust", 5), CacheKey::new("rust", 10));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = SearchCache::new(Duration::from_secs(30), 16);
        assert!(cache.get(&CacheKey::new("nothing", 5)).await.is_none());
    }

    #[tokio::test]
    async fn insert_and_retrieve() {
        let cache = SearchCache::new(Duration::from_secs(30), 16);
        let key = CacheKey::new("rust", 5);
        cache.insert(key.clone(), sample("cached")).await;
        let hit = cache.get(&key).await.expect("should be cached");
        assert_eq!(hit[0].title, "cached");
    }

    #[tokio::test]
    async fn overwrite_same_key_updates_value() {
        let cache = SearchCache::new(Duration::from_secs(30), 16);
        let key = CacheKey::new("rust", 5);
        cache.insert(key.clone(), sample("old")).await;
        cache.insert(key.clone(), sample("new")).await;
        assert_eq!(cache.get(&key).await.expect("cached")[0].title, "new");
    }

    #[tokio::test]
    async fn separate_instances_do_not_share_entries() {
        let a = SearchCache::new(Duration::from_secs(30), 16);
        let b = SearchCache::new(Duration::from_secs(30), 16);
        let key = CacheKey::new("isolated", 3);
        a.insert(key.clone(), sample("a")).await;
        assert!(b.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = SearchCache::new(Duration::ZERO, 16);
        let key = CacheKey::new("rust", 5);
        cache.insert(key.clone(), sample("x")).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn clear_drops_entries() {
        let cache = SearchCache::new(Duration::from_secs(30), 16);
        let key = CacheKey::new("rust", 5);
        cache.insert(key.clone(), sample("x")).await;
        cache.clear();
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = SearchCache::new(Duration::from_millis(50), 16);
        let key = CacheKey::new("ephemeral", 5);
        cache.insert(key.clone(), sample("x")).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(&key).await.is_none());
    }
}
