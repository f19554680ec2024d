//! Core types for search results, provider identification and fetched pages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single search result returned by a provider.
///
/// The URL is the natural key. It has already been sanitised (tracking
/// parameters stripped, redirect wrappers unwrapped) when a provider
/// hands the result back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The URL of the result page.
    pub url: String,
    /// The title of the result page.
    pub title: String,
    /// A text snippet summarising the page, when the provider offers one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Which provider produced this result.
    pub provider: ProviderKind,
}

impl SearchResult {
    /// Build a result, treating an empty snippet as absent.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        provider: ProviderKind,
    ) -> Self {
        let snippet = snippet.into();
        let snippet = snippet.trim();
        Self {
            url: url.into(),
            title: title.into(),
            snippet: (!snippet.is_empty()).then(|| snippet.to_owned()),
            provider,
        }
    }

    /// Snippet text or the empty string.
    pub fn snippet_text(&self) -> &str {
        self.snippet.as_deref().unwrap_or_default()
    }
}

/// The provider strategies that make up the search chain, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// DuckDuckGo HTML endpoint via POST form.
    DuckDuckGoPost,
    /// DuckDuckGo HTML endpoint via GET across mirror hosts.
    DuckDuckGoMirrors,
    /// DuckDuckGo lite endpoint.
    DuckDuckGoLite,
    /// Bing HTML results page.
    Bing,
    /// Headless-browser rendering service fronting the DuckDuckGo HTML page.
    Browserless,
    /// Static curated URLs per query category.
    HeuristicSeeds,
}

impl ProviderKind {
    /// Stable short name used in logs and traces.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DuckDuckGoPost => "ddg-post",
            Self::DuckDuckGoMirrors => "ddg-mirrors",
            Self::DuckDuckGoLite => "ddg-lite",
            Self::Bing => "bing",
            Self::Browserless => "browserless",
            Self::HeuristicSeeds => "heuristic-seeds",
        }
    }

    /// Returns every provider in chain order.
    pub fn all() -> &'static [ProviderKind] {
        &[
            Self::DuckDuckGoPost,
            Self::DuckDuckGoMirrors,
            Self::DuckDuckGoLite,
            Self::Bing,
            Self::Browserless,
            Self::HeuristicSeeds,
        ]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extracted readable content from a fetched web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    /// The URL that was fetched.
    pub url: String,
    /// The page title extracted from HTML.
    pub title: String,
    /// Block-structured plain text, one block per line.
    pub text: String,
    /// Number of words in the extracted text.
    pub word_count: usize,
    /// Representative image (`og:image`), if the page declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}
