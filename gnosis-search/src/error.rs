//! Error types for the gnosis-search crate.
//!
//! All errors carry stable string messages. Provider and fetch failures are
//! expected during normal operation; the chain logs and isolates them rather
//! than surfacing them to callers.

/// Errors that can occur during web search and page fetching.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A single search provider failed (blocked, unexpected status, etc.).
    #[error("provider error: {0}")]
    Provider(String),

    /// Every provider in the chain failed to return results.
    #[error("all search providers failed: {0}")]
    AllProvidersFailed(String),

    /// A network call exceeded its time budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// HTML structure could not be parsed or yielded no content.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for gnosis-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_provider() {
        let err = SearchError::Provider("ddg-post returned 403".into());
        assert_eq!(err.to_string(), "provider error: ddg-post returned 403");
    }

    #[test]
    fn display_all_providers_failed() {
        let err = SearchError::AllProvidersFailed("no providers configured".into());
        assert_eq!(
            err.to_string(),
            "all search providers failed: no providers configured"
        );
    }

    #[test]
    fn display_timeout() {
        let err = SearchError::Timeout("bing exceeded 4500ms".into());
        assert_eq!(err.to_string(), "timed out: bing exceeded 4500ms");
    }

    #[test]
    fn display_http() {
        let err = SearchError::Http("connection refused".into());
        assert_eq!(err.to_string(), "HTTP error: connection refused");
    }

    #[test]
    fn display_parse() {
        let err = SearchError::Parse("unexpected HTML structure".into());
        assert_eq!(err.to_string(), "parse error: unexpected HTML structure");
    }

    #[test]
    fn display_config() {
        let err = SearchError::Config("max_results_hard must be > 0".into());
        assert_eq!(err.to_string(), "config error: max_results_hard must be > 0");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
