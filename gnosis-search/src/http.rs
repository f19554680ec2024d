//! Shared HTTP client for provider requests and page fetches.
//!
//! Provides a configured [`reqwest::Client`] with the deployment's fixed
//! User-Agent and Accept-Language headers and cookie support.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

use crate::config::SearchConfig;
use crate::error::SearchError;

/// Redirects followed before a request is abandoned.
const MAX_REDIRECTS: usize = 10;

/// Build a [`reqwest::Client`] configured for provider scraping and page fetches.
///
/// The client has:
/// - Cookie store enabled (consent pages set cookies before results)
/// - A backstop timeout equal to the larger of the provider and fetch budgets
/// - Fixed User-Agent and Accept-Language headers from config
/// - Brotli and gzip decompression
///
/// # Errors
///
/// Returns [`SearchError::Http`] if a header value is invalid or the client
/// cannot be constructed.
pub fn build_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    let language = HeaderValue::from_str(&config.accept_language)
        .map_err(|e| SearchError::Http(format!("invalid Accept-Language header: {e}")))?;
    headers.insert(ACCEPT_LANGUAGE, language);

    let backstop = config.provider_timeout_ms.max(config.fetch_timeout_ms);

    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_millis(backstop))
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_with_default_config() {
        let config = SearchConfig::default();
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn build_client_with_custom_ua() {
        let config = SearchConfig {
            user_agent: "CustomBot/1.0".into(),
            ..Default::default()
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn invalid_accept_language_rejected() {
        let config = SearchConfig {
            accept_language: "it\nen".into(),
            ..Default::default()
        };
        let err = build_client(&config).unwrap_err();
        assert!(err.to_string().contains("Accept-Language"));
    }
}
