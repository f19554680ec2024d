//! Error types for the gnosis pipeline.
//!
//! Each variant carries a stable SCREAMING_SNAKE_CASE code, included in the
//! Display output and available via [`GnosisError::code()`].

use gnosis_search::SearchError;

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The language-model endpoint failed or returned garbage.
    pub const LLM_FAILED: &str = "LLM_FAILED";

    /// A network call exceeded its budget.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// The key-value store failed.
    pub const STORE_FAILED: &str = "STORE_FAILED";

    /// Search or page fetch failed.
    pub const SEARCH_FAILED: &str = "SEARCH_FAILED";

    /// Filesystem error.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Top-level error type for the research pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GnosisError {
    /// Invalid or missing configuration. Fatal at startup.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Language-model call failed (non-200, malformed JSON, empty choice).
    #[error("[{}] {}", error_codes::LLM_FAILED, .0)]
    Llm(String),

    /// A call exceeded its time budget.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    Timeout(String),

    /// Key-value store error.
    #[error("[{}] {}", error_codes::STORE_FAILED, .0)]
    Store(String),

    /// Search or fetch error from `gnosis-search`.
    #[error("[{}] {}", error_codes::SEARCH_FAILED, .0)]
    Search(#[from] SearchError),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl GnosisError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Llm(_) => error_codes::LLM_FAILED,
            Self::Timeout(_) => error_codes::TIMEOUT_ERROR,
            Self::Store(_) => error_codes::STORE_FAILED,
            Self::Search(_) => error_codes::SEARCH_FAILED,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GnosisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = GnosisError::Config("bad policy".into());
        assert_eq!(err.to_string(), "[CONFIG_INVALID] bad policy");
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn search_errors_convert() {
        let err: GnosisError = SearchError::Timeout("fetch".into()).into();
        assert_eq!(err.code(), error_codes::SEARCH_FAILED);
        assert!(err.to_string().contains("timed out: fetch"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GnosisError = io.into();
        assert_eq!(err.code(), error_codes::IO_ERROR);
    }

    #[test]
    fn codes_are_unique() {
        let codes = [
            error_codes::CONFIG_INVALID,
            error_codes::LLM_FAILED,
            error_codes::TIMEOUT_ERROR,
            error_codes::STORE_FAILED,
            error_codes::SEARCH_FAILED,
            error_codes::IO_ERROR,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GnosisError>();
    }
}
