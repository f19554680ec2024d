//! Terminal provider: curated URLs for a few live-data categories.
//!
//! When every scraping provider comes back short, queries about weather,
//! prices or Serie A still get authoritative starting points. Queries that
//! match no category get nothing; there is no generic fallback.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::SearchError;
use crate::provider::SearchProvider;
use crate::types::{ProviderKind, SearchResult};

use super::compile_pattern;

/// One seed category: a trigger pattern and its curated `(url, title)` list.
struct SeedCategory {
    name: &'static str,
    trigger: Option<Regex>,
    seeds: &'static [(&'static str, &'static str)],
}

static CATEGORIES: LazyLock<Vec<SeedCategory>> = LazyLock::new(|| {
    vec![
        SeedCategory {
            name: "weather",
            trigger: compile_pattern(r"(?i)\b(meteo|che tempo|weather|previsioni|forecast)\b"),
            seeds: &[
                ("https://www.meteoam.it/", "Meteo Aeronautica Militare"),
                ("https://www.ilmeteo.it/", "ILMETEO"),
                ("https://www.3bmeteo.com/", "3B Meteo"),
            ],
        },
        SeedCategory {
            name: "prices",
            trigger: compile_pattern(
                r"(?i)(prezzo|quotazione|quanto vale|\bbtc\b|bitcoin|\beth\b|ethereum|eurusd|eur/usd|\bborsa\b|\bazioni\b|\bindice\b|\bcambio\b|forex|\bfx\b|\bprice\b)",
            ),
            seeds: &[
                (
                    "https://coinmarketcap.com/currencies/bitcoin/",
                    "Bitcoin (BTC) – CoinMarketCap",
                ),
                (
                    "https://www.coindesk.com/price/bitcoin/",
                    "Bitcoin Price – CoinDesk",
                ),
                (
                    "https://www.investing.com/crypto/bitcoin/btc-usd",
                    "BTC/USD – Investing.com",
                ),
            ],
        },
        SeedCategory {
            name: "sports",
            trigger: compile_pattern(
                r"(?i)(serie a|risultati|\bcalcio\b|\bpartite\b|live score|\bdiretta\b)",
            ),
            seeds: &[
                (
                    "https://www.flashscore.it/calcio/italia/serie-a/",
                    "Live Serie A – FlashScore",
                ),
                (
                    "https://www.diretta.it/serie-a/",
                    "Risultati Serie A – Diretta.it",
                ),
                (
                    "https://www.legaseriea.it/serie-a",
                    "Calendario e Risultati – Lega Serie A",
                ),
            ],
        },
    ]
});

/// Names of the seed categories matching `query`, in table order.
pub fn matching_categories(query: &str) -> Vec<&'static str> {
    CATEGORIES
        .iter()
        .filter(|c| c.trigger.as_ref().is_some_and(|re| re.is_match(query)))
        .map(|c| c.name)
        .collect()
}

/// Curated results for `query`, at most `n`.
pub fn seed_results(query: &str, n: usize) -> Vec<SearchResult> {
    let mut out: Vec<SearchResult> = Vec::new();
    if n == 0 {
        return out;
    }
    for category in CATEGORIES.iter() {
        let matched = category
            .trigger
            .as_ref()
            .is_some_and(|re| re.is_match(query));
        if !matched {
            continue;
        }
        for (url, title) in category.seeds {
            if out.iter().any(|r| r.url == *url) {
                continue;
            }
            out.push(SearchResult::new(*url, *title, "", ProviderKind::HeuristicSeeds));
            if out.len() >= n {
                return out;
            }
        }
    }
    out
}

/// The heuristic seed provider. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicSeeds;

#[async_trait]
impl SearchProvider for HeuristicSeeds {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HeuristicSeeds
    }

    async fn search(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
        let results = seed_results(query, n);
        tracing::debug!(count = results.len(), "heuristic seeds used");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_query_gets_weather_seeds() {
        let results = seed_results("meteo roma domani", 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].url, "https://www.meteoam.it/");
        assert!(results
            .iter()
            .all(|r| r.provider == ProviderKind::HeuristicSeeds));
    }

    #[test]
    fn price_query_gets_crypto_seeds() {
        let results = seed_results("bitcoin price", 5);
        assert_eq!(results.len(), 3);
        assert!(results[0].url.contains("coinmarketcap"));
    }

    #[test]
    fn sports_query_gets_serie_a_seeds() {
        let results = seed_results("risultati serie a", 2);
        assert_eq!(results.len(), 2);
        assert!(results[0].url.contains("flashscore"));
    }

    #[test]
    fn unmatched_query_returns_empty() {
        assert!(seed_results("storia dell'impero romano", 5).is_empty());
        assert!(matching_categories("poesia d'amore").is_empty());
    }

    #[test]
    fn multiple_categories_are_merged_in_table_order() {
        assert_eq!(
            matching_categories("meteo e prezzo bitcoin"),
            vec!["weather", "prices"]
        );
        let results = seed_results("meteo e prezzo bitcoin", 10);
        assert_eq!(results.len(), 6);
    }

    #[test]
    fn zero_n_returns_empty() {
        assert!(seed_results("meteo", 0).is_empty());
    }

    #[tokio::test]
    async fn provider_never_fails() {
        let results = HeuristicSeeds.search("xyz", 3).await.expect("never fails");
        assert!(results.is_empty());
    }
}
