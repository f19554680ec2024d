//! DuckDuckGo providers: the HTML endpoint via POST, the same page via GET
//! across mirror hosts, and the lite variant.
//!
//! All three return the same family of markup, so they share
//! [`parse_duckduckgo_html`]: CSS selectors first, then a tolerant
//! pattern scan for pages whose structure drifted.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use crate::chain::url_normalize::clean_result_url;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::provider::SearchProvider;
use crate::types::{ProviderKind, SearchResult};

use super::{compile_pattern, fragment_text, read_html};

/// How far past a result link the pattern scan looks for its snippet.
const SNIPPET_WINDOW: usize = 1_200;

/// DuckDuckGo `kp` value for the configured safe-search setting.
fn safe_search_param(safe_search: bool) -> &'static str {
    if safe_search {
        "1"
    } else {
        "-2"
    }
}

/// Returns an error if DuckDuckGo served its bot-challenge page.
fn ensure_not_challenged(html: &str, provider: ProviderKind) -> Result<(), SearchError> {
    if html.contains("anomaly-modal") || html.contains("challenge-form") {
        return Err(SearchError::Provider(format!(
            "{provider} served a bot challenge"
        )));
    }
    Ok(())
}

/// Provider A: POST form to the primary HTML endpoint.
pub struct DuckDuckGoPost {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    safe_search: bool,
}

impl DuckDuckGoPost {
    /// Build from the shared client and search configuration.
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            endpoint: config.ddg_html_url.clone(),
            region: config.region.clone(),
            safe_search: config.safe_search,
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoPost {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DuckDuckGoPost
    }

    async fn search(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query, "DuckDuckGo POST search");
        let params = [
            ("q", query),
            ("kl", self.region.as_str()),
            ("kp", safe_search_param(self.safe_search)),
        ];
        let response = self
            .client
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("DuckDuckGo POST request failed: {e}")))?;
        let html = read_html(response, self.kind()).await?;
        ensure_not_challenged(&html, self.kind())?;
        parse_duckduckgo_html(&html, n, self.kind())
    }
}

/// Provider B: GET the HTML endpoint, trying each mirror host in order.
///
/// The first mirror that yields at least one result wins; mirror errors
/// are logged and the next mirror is tried.
pub struct DuckDuckGoMirrors {
    client: reqwest::Client,
    mirrors: Vec<String>,
    region: String,
    safe_search: bool,
}

impl DuckDuckGoMirrors {
    /// Build from the shared client and search configuration.
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            mirrors: config.ddg_mirrors.clone(),
            region: config.region.clone(),
            safe_search: config.safe_search,
        }
    }

    async fn try_mirror(
        &self,
        mirror: &str,
        query: &str,
        n: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(mirror)
            .query(&[
                ("q", query),
                ("kl", self.region.as_str()),
                ("kp", safe_search_param(self.safe_search)),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("DuckDuckGo mirror {mirror} failed: {e}")))?;
        let html = read_html(response, self.kind()).await?;
        ensure_not_challenged(&html, self.kind())?;
        parse_duckduckgo_html(&html, n, self.kind())
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoMirrors {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DuckDuckGoMirrors
    }

    async fn search(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query, mirrors = self.mirrors.len(), "DuckDuckGo mirror search");
        let mut last_error = None;
        for mirror in &self.mirrors {
            match self.try_mirror(mirror, query, n).await {
                Ok(results) if !results.is_empty() => return Ok(results),
                Ok(_) => tracing::debug!(mirror = %mirror, "mirror returned no results"),
                Err(e) => {
                    tracing::debug!(mirror = %mirror, error = %e, "mirror failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

/// Provider C: the lightweight lite endpoint.
pub struct DuckDuckGoLite {
    client: reqwest::Client,
    endpoint: String,
    region: String,
}

impl DuckDuckGoLite {
    /// Build from the shared client and search configuration.
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            endpoint: config.ddg_lite_url.clone(),
            region: config.region.clone(),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoLite {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DuckDuckGoLite
    }

    async fn search(&self, query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
        tracing::trace!(query, "DuckDuckGo lite search");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("kl", self.region.as_str())])
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("DuckDuckGo lite request failed: {e}")))?;
        let html = read_html(response, self.kind()).await?;
        ensure_not_challenged(&html, self.kind())?;
        parse_duckduckgo_html(&html, n, self.kind())
    }
}

/// Parse any DuckDuckGo results page into search results.
///
/// Tries, in order: the HTML-endpoint layout (`.result__a` +
/// `.result__snippet`), the lite layout (`a.result-link` +
/// `td.result-snippet`), then a pattern scan pairing each result link with
/// the first snippet found within [`SNIPPET_WINDOW`] bytes after it. Every
/// URL passes through [`clean_result_url`]; rejected links are skipped.
pub fn parse_duckduckgo_html(
    html: &str,
    max_results: usize,
    provider: ProviderKind,
) -> Result<Vec<SearchResult>, SearchError> {
    let mut results = parse_html_layout(html, max_results, provider)?;
    if results.is_empty() {
        results = parse_lite_layout(html, max_results, provider)?;
    }
    if results.is_empty() {
        results = parse_with_patterns(html, max_results, provider);
    }
    tracing::debug!(%provider, count = results.len(), "DuckDuckGo results parsed");
    Ok(results)
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("invalid selector `{css}`: {e:?}")))
}

fn parse_html_layout(
    html: &str,
    max_results: usize,
    provider: ProviderKind,
) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(html);
    let result_sel = selector(
        ".result.results_links:not(.result--ad), .web-result:not(.result--ad)",
    )?;
    let title_sel = selector(".result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut results = Vec::new();
    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }
        let Some(url) = title_el.value().attr("href").and_then(clean_result_url) else {
            continue;
        };
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();

        results.push(SearchResult::new(url, title, snippet, provider));
        if results.len() >= max_results {
            break;
        }
    }
    Ok(results)
}

fn parse_lite_layout(
    html: &str,
    max_results: usize,
    provider: ProviderKind,
) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(html);
    let link_sel = selector("a.result-link")?;
    let snippet_sel = selector("td.result-snippet")?;

    let snippets: Vec<String> = document
        .select(&snippet_sel)
        .map(|el| el.text().collect::<String>())
        .collect();

    let mut results = Vec::new();
    for (index, link) in document.select(&link_sel).enumerate() {
        let title = link.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }
        let Some(url) = link.value().attr("href").and_then(clean_result_url) else {
            continue;
        };
        let snippet = snippets.get(index).cloned().unwrap_or_default();
        results.push(SearchResult::new(url, title, snippet, provider));
        if results.len() >= max_results {
            break;
        }
    }
    Ok(results)
}

static ANCHOR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile_pattern(r"(?is)<a\b([^>]*)>(.*?)</a>"));
static HREF_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile_pattern(r#"(?i)href\s*=\s*["']([^"']+)["']"#));
static RESULT_CLASS_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile_pattern(r#"(?i)class\s*=\s*["'][^"']*\b(?:result__a|result-link)\b"#)
});
static SNIPPET_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile_pattern(
        r#"(?is)class\s*=\s*["'][^"']*\bresult(?:__|-)snippet\b[^"']*["'][^>]*>(.*?)</(?:a|td|div|span)>"#,
    )
});

/// Tolerant fallback: scan raw markup for result anchors and nearby snippets.
fn parse_with_patterns(html: &str, max_results: usize, provider: ProviderKind) -> Vec<SearchResult> {
    let (Some(anchor_re), Some(href_re), Some(class_re), Some(snippet_re)) = (
        ANCHOR_RE.as_ref(),
        HREF_RE.as_ref(),
        RESULT_CLASS_RE.as_ref(),
        SNIPPET_RE.as_ref(),
    ) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for caps in anchor_re.captures_iter(html) {
        let (Some(whole), Some(attrs), Some(inner)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if !class_re.is_match(attrs.as_str()) {
            continue;
        }
        let Some(href) = href_re
            .captures(attrs.as_str())
            .and_then(|c| c.get(1))
            .map(|m| super::decode_entities(m.as_str()))
        else {
            continue;
        };
        let Some(url) = clean_result_url(&href) else {
            continue;
        };
        let title = fragment_text(inner.as_str());
        if title.is_empty() {
            continue;
        }

        let mut window_end = (whole.end() + SNIPPET_WINDOW).min(html.len());
        while !html.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let snippet = snippet_re
            .captures(&html[whole.end()..window_end])
            .and_then(|c| c.get(1))
            .map(|m| fragment_text(m.as_str()))
            .unwrap_or_default();

        results.push(SearchResult::new(url, title, snippet, provider));
        if results.len() >= max_results {
            break;
        }
    }
    results
}
