//! Order-preserving result deduplication by normalised URL.
//!
//! The chain merges results from successive providers; earlier providers
//! rank higher, so the first occurrence of a URL wins and later
//! duplicates are discarded.

use std::collections::HashSet;

use crate::types::SearchResult;

use super::url_normalize::dedup_key;

/// Accumulates unique results across provider calls.
#[derive(Debug, Default)]
pub struct UniqueResults {
    seen: HashSet<String>,
    results: Vec<SearchResult>,
}

impl UniqueResults {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result unless its normalised URL was already seen.
    ///
    /// Returns `true` if the result was added.
    pub fn push(&mut self, result: SearchResult) -> bool {
        if self.seen.insert(dedup_key(&result.url)) {
            self.results.push(result);
            true
        } else {
            false
        }
    }

    /// Add every result from `batch`, returning how many were new.
    pub fn extend(&mut self, batch: Vec<SearchResult>) -> usize {
        batch
            .into_iter()
            .map(|r| self.push(r))
            .filter(|added| *added)
            .count()
    }

    /// Number of unique results collected so far.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Consume the accumulator, returning results in insertion order.
    pub fn into_vec(self) -> Vec<SearchResult> {
        self.results
    }
}

/// Deduplicate a batch by normalised URL, keeping the first occurrence.
pub fn deduplicate(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut unique = UniqueResults::new();
    unique.extend(results);
    unique.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    fn make_result(url: &str, provider: ProviderKind) -> SearchResult {
        SearchResult::new(url, format!("Title from {provider}"), "", provider)
    }

    #[test]
    fn unique_urls_pass_through() {
        let results = vec![
            make_result("https://a.com", ProviderKind::DuckDuckGoPost),
            make_result("https://b.com", ProviderKind::Bing),
        ];
        assert_eq!(deduplicate(results).len(), 2);
    }

    #[test]
    fn first_occurrence_wins() {
        let results = vec![
            make_result("https://example.com/page", ProviderKind::DuckDuckGoPost),
            make_result("https://example.com/page", ProviderKind::Bing),
        ];
        let deduped = deduplicate(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].provider, ProviderKind::DuckDuckGoPost);
    }

    #[test]
    fn normalisation_merges_equivalent_urls() {
        let results = vec![
            make_result("https://Example.COM/path/", ProviderKind::DuckDuckGoPost),
            make_result("http://example.com/path", ProviderKind::Bing),
            make_result(
                "https://example.com/path?utm_source=twitter",
                ProviderKind::DuckDuckGoLite,
            ),
        ];
        assert_eq!(deduplicate(results).len(), 1);
    }

    #[test]
    fn case_insensitive_path_is_merged() {
        let results = vec![
            make_result("https://example.com/News", ProviderKind::DuckDuckGoPost),
            make_result("https://example.com/news", ProviderKind::Bing),
        ];
        assert_eq!(deduplicate(results).len(), 1);
    }

    #[test]
    fn order_is_preserved() {
        let results = vec![
            make_result("https://c.com", ProviderKind::Bing),
            make_result("https://a.com", ProviderKind::Bing),
            make_result("https://b.com", ProviderKind::Bing),
        ];
        let urls: Vec<String> = deduplicate(results).into_iter().map(|r| r.url).collect();
        assert_eq!(urls, ["https://c.com", "https://a.com", "https://b.com"]);
    }

    #[test]
    fn extend_reports_new_count() {
        let mut unique = UniqueResults::new();
        assert_eq!(
            unique.extend(vec![
                make_result("https://a.com", ProviderKind::Bing),
                make_result("https://a.com/", ProviderKind::Bing),
            ]),
            1
        );
        assert_eq!(unique.len(), 1);
        assert!(!unique.is_empty());
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(deduplicate(vec![]).is_empty());
    }
}
