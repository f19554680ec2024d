//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] controls provider timeouts, result caps, caching,
//! request headers and the optional headless-browser provider. The
//! defaults are tuned for polite scraping of public HTML endpoints.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Default User-Agent sent to every provider and fetched page.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default Accept-Language header.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7";

/// Configuration for the provider chain and the page fetcher.
///
/// Deserialises from the `[search]` table of the application config; any
/// missing field takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Per-provider time budget in milliseconds.
    pub provider_timeout_ms: u64,
    /// Absolute upper bound on results returned by one search call.
    pub max_results_hard: usize,
    /// How long to cache results in seconds. Set to 0 to disable caching.
    pub cache_ttl_seconds: u64,
    /// Maximum number of cached (query, n) entries.
    pub cache_capacity: u64,
    /// User-Agent header, fixed per deployment.
    pub user_agent: String,
    /// Accept-Language header, fixed per deployment.
    pub accept_language: String,
    /// DuckDuckGo region code (`kl`).
    pub region: String,
    /// Whether to request safe-search filtering.
    pub safe_search: bool,
    /// Primary DuckDuckGo HTML endpoint (POST).
    pub ddg_html_url: String,
    /// DuckDuckGo HTML mirrors tried in order via GET.
    pub ddg_mirrors: Vec<String>,
    /// DuckDuckGo lite endpoint.
    pub ddg_lite_url: String,
    /// Bing HTML search endpoint.
    pub bing_url: String,
    /// Base URL of a headless-browser rendering service (`/content` API).
    /// The provider is skipped when unset.
    pub browserless_url: Option<String>,
    /// Access token for the rendering service.
    pub browserless_token: Option<String>,
    /// Per-page fetch timeout in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Maximum response bytes read from a fetched page.
    pub fetch_max_bytes: usize,
    /// Maximum characters of extracted text kept per page.
    pub fetch_max_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 4_500,
            max_results_hard: 20,
            cache_ttl_seconds: 30,
            cache_capacity: 256,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_owned(),
            region: "it-it".to_owned(),
            safe_search: false,
            ddg_html_url: "https://html.duckduckgo.com/html/".to_owned(),
            ddg_mirrors: vec![
                "https://html.duckduckgo.com/html/".to_owned(),
                "https://duckduckgo.com/html/".to_owned(),
                "https://lite.duckduckgo.com/html/".to_owned(),
            ],
            ddg_lite_url: "https://lite.duckduckgo.com/lite/".to_owned(),
            bing_url: "https://www.bing.com/search".to_owned(),
            browserless_url: None,
            browserless_token: None,
            fetch_timeout_ms: 6_000,
            fetch_max_bytes: 1_500_000,
            fetch_max_chars: 20_000,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `provider_timeout_ms` and `fetch_timeout_ms` must be greater than 0
    /// - `max_results_hard` must be greater than 0
    /// - `ddg_mirrors` entries and endpoint URLs must parse as URLs
    /// - `fetch_max_bytes` and `fetch_max_chars` must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.provider_timeout_ms == 0 {
            return Err(SearchError::Config(
                "provider_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(SearchError::Config(
                "fetch_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.max_results_hard == 0 {
            return Err(SearchError::Config(
                "max_results_hard must be greater than 0".into(),
            ));
        }
        if self.fetch_max_bytes == 0 || self.fetch_max_chars == 0 {
            return Err(SearchError::Config(
                "fetch_max_bytes and fetch_max_chars must be greater than 0".into(),
            ));
        }
        let endpoints = [&self.ddg_html_url, &self.ddg_lite_url, &self.bing_url]
            .into_iter()
            .chain(self.ddg_mirrors.iter())
            .chain(self.browserless_url.iter());
        for endpoint in endpoints {
            url::Url::parse(endpoint).map_err(|e| {
                SearchError::Config(format!("invalid endpoint URL `{endpoint}`: {e}"))
            })?;
        }
        Ok(())
    }

    /// Overlay values from an environment-like lookup.
    ///
    /// Recognised keys: `BROWSERLESS_URL`, `BROWSERLESS_TOKEN`,
    /// `SEARCH_USER_AGENT`, `SEARCH_ACCEPT_LANGUAGE`. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_blank("BROWSERLESS_URL") {
            self.browserless_url = Some(v.trim_end_matches('/').to_owned());
        }
        if let Some(v) = non_blank("BROWSERLESS_TOKEN") {
            self.browserless_token = Some(v);
        }
        if let Some(v) = non_blank("SEARCH_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = non_blank("SEARCH_ACCEPT_LANGUAGE") {
            self.accept_language = v;
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_sensible_values() {
        let config = SearchConfig::default();
        assert_eq!(config.provider_timeout_ms, 4_500);
        assert_eq!(config.max_results_hard, 20);
        assert_eq!(config.cache_ttl_seconds, 30);
        assert_eq!(config.fetch_timeout_ms, 6_000);
        assert_eq!(config.ddg_mirrors.len(), 3);
        assert!(config.browserless_url.is_none());
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_provider_timeout_rejected() {
        let config = SearchConfig {
            provider_timeout_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("provider_timeout_ms"));
    }

    #[test]
    fn zero_hard_cap_rejected() {
        let config = SearchConfig {
            max_results_hard: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_results_hard"));
    }

    #[test]
    fn zero_fetch_caps_rejected() {
        let config = SearchConfig {
            fetch_max_chars: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_mirror_rejected() {
        let config = SearchConfig {
            ddg_mirrors: vec!["not a url".into()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn overrides_apply_non_blank_values() {
        let env: HashMap<&str, &str> = [
            ("BROWSERLESS_URL", "http://bls.local:3000/"),
            ("BROWSERLESS_TOKEN", "tok"),
            ("SEARCH_USER_AGENT", "   "),
        ]
        .into_iter()
        .collect();
        let mut config = SearchConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_owned()));
        assert_eq!(
            config.browserless_url.as_deref(),
            Some("http://bls.local:3000")
        );
        assert_eq!(config.browserless_token.as_deref(), Some("tok"));
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn deserializes_partial_toml_like_json() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"provider_timeout_ms": 1000}"#).expect("deserialize");
        assert_eq!(config.provider_timeout_ms, 1000);
        assert_eq!(config.max_results_hard, 20);
    }
}
