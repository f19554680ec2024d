//! Search provider implementations.
//!
//! Each module provides structs implementing [`crate::provider::SearchProvider`]
//! for one step of the fallback chain. Helpers shared by the HTML scrapers
//! live here.

pub mod bing;
pub mod browserless;
pub mod duckduckgo;
pub mod seeds;

pub use bing::BingProvider;
pub use browserless::BrowserlessProvider;
pub use duckduckgo::{DuckDuckGoLite, DuckDuckGoMirrors, DuckDuckGoPost};
pub use seeds::HeuristicSeeds;

use regex::Regex;

use crate::error::SearchError;
use crate::types::ProviderKind;

/// Compile a pattern, logging and returning `None` on failure.
pub(crate) fn compile_pattern(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "search pattern failed to compile");
            None
        }
    }
}

/// Check the status of a provider response and read its body.
///
/// Non-success statuses become [`SearchError::Provider`] errors carrying
/// the provider name so the chain's warning log identifies the culprit.
pub(crate) async fn read_html(
    response: reqwest::Response,
    provider: ProviderKind,
) -> Result<String, SearchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Provider(format!(
            "{provider} returned HTTP {status}"
        )));
    }
    let html = response
        .text()
        .await
        .map_err(|e| SearchError::Http(format!("{provider} response read failed: {e}")))?;
    tracing::trace!(%provider, bytes = html.len(), "provider response received");
    Ok(html)
}

/// Strip tags from an HTML fragment and decode common entities.
pub(crate) fn fragment_text(fragment: &str) -> String {
    static TAG_RE: std::sync::LazyLock<Option<Regex>> =
        std::sync::LazyLock::new(|| compile_pattern(r"(?s)<[^>]*>"));
    let without_tags = match TAG_RE.as_ref() {
        Some(re) => re.replace_all(fragment, " ").into_owned(),
        None => fragment.to_owned(),
    };
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the handful of HTML entities search pages actually emit.
pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_text_strips_tags_and_entities() {
        let text = fragment_text("<b>Rust</b> &amp; <i>Cargo</i>&nbsp;&quot;book&quot;");
        assert_eq!(text, "Rust & Cargo \"book\"");
    }

    #[test]
    fn amp_decoded_last() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn compile_pattern_rejects_invalid() {
        assert!(compile_pattern("(unclosed").is_none());
        assert!(compile_pattern(r"\d+").is_some());
    }
}
