//! HTML content extraction: strips boilerplate and returns block-structured text.
//!
//! Parses raw HTML, removes non-content elements (scripts, styles, navigation),
//! finds the main content area, and emits one line per block element
//! (paragraphs, headings, list items, table cells) so downstream sentence
//! trimming sees real boundaries. Also reports the page's `og:image`.

use scraper::{ElementRef, Html, Selector};

use crate::error::{Result, SearchError};
use crate::types::PageContent;

/// Default maximum characters to return from extracted content.
pub const DEFAULT_MAX_CHARS: usize = 20_000;

/// Marker appended when text is cut at the character limit.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated]";

/// Block-level elements that become separate lines.
const BLOCK_SELECTOR: &str =
    "p, h1, h2, h3, h4, h5, h6, li, pre, blockquote, td, th, dt, dd, figcaption";

/// Extract readable text content from raw HTML.
///
/// # Errors
///
/// Returns [`SearchError::Parse`] if no extractable content is found.
pub fn extract_content(html: &str, url: &str) -> Result<PageContent> {
    extract_content_with_limit(html, url, DEFAULT_MAX_CHARS)
}

/// Extract readable text content from raw HTML with a custom character limit.
///
/// # Errors
///
/// Returns [`SearchError::Parse`] if no extractable content is found.
pub fn extract_content_with_limit(html: &str, url: &str, max_chars: usize) -> Result<PageContent> {
    let image = extract_og_image(&Html::parse_document(html), url);

    let cleaned_html = strip_boilerplate_tags(html);
    let document = Html::parse_document(&cleaned_html);

    let title = extract_title(&document);
    let raw_text = extract_main_text(&document);

    let text = normalise_whitespace(&raw_text);
    if text.is_empty() {
        return Err(SearchError::Parse("no extractable content found".into()));
    }

    let text = truncate_to_limit(&text, max_chars);
    let word_count = text.split_whitespace().count();

    Ok(PageContent {
        url: url.to_owned(),
        title,
        text,
        word_count,
        image,
    })
}

/// Extract the page title: `<title>`, then `og:title`, then the first `<h1>`.
fn extract_title(document: &Html) -> String {
    let from_text = |css: &str| -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        let text = document
            .select(&selector)
            .next()?
            .text()
            .collect::<String>()
            .trim()
            .to_owned();
        (!text.is_empty()).then_some(text)
    };
    let from_meta = |css: &str| -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        let content = document
            .select(&selector)
            .next()?
            .value()
            .attr("content")?
            .trim()
            .to_owned();
        (!content.is_empty()).then_some(content)
    };

    from_text("title")
        .or_else(|| from_meta(r#"meta[property="og:title"]"#))
        .or_else(|| from_text("h1"))
        .unwrap_or_default()
}

/// Extract the representative image from `og:image` (or `twitter:image`),
/// resolved against the page URL.
fn extract_og_image(document: &Html, page_url: &str) -> Option<String> {
    let candidates = [
        r#"meta[property="og:image"]"#,
        r#"meta[name="og:image"]"#,
        r#"meta[name="twitter:image"]"#,
    ];
    let raw = candidates.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
            .map(str::to_owned)
    })?;

    match url::Url::parse(page_url).and_then(|base| base.join(&raw)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => Some(raw),
    }
}

/// Extract block-structured text from the main content area of the document.
///
/// Tries content-specific roots in priority order, falling back to `<body>`.
/// Inside the root, each block element becomes one line; a root without
/// block elements contributes its flattened text.
fn extract_main_text(document: &Html) -> String {
    let content_selectors = ["article", "main", "[role=\"main\"]", "body"];
    let Ok(block_sel) = Selector::parse(BLOCK_SELECTOR) else {
        return String::new();
    };

    for selector_str in &content_selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let Some(root) = document.select(&selector).next() else {
            continue;
        };

        let blocks = block_lines(root, &block_sel);
        if !blocks.is_empty() {
            return blocks.join("\n");
        }
        let text: String = root.text().collect::<Vec<_>>().join(" ");
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }

    String::new()
}

/// One line per outermost block element, skipping blocks nested in another.
fn block_lines(root: ElementRef<'_>, block_sel: &Selector) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for block in root.select(block_sel) {
        let nested = block
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|a| a.id() != root.id())
            .any(|a| block_sel.matches(&a));
        if nested {
            continue;
        }
        let line = block
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !line.is_empty() && lines.last() != Some(&line) {
            lines.push(line);
        }
    }
    lines
}

/// Remove boilerplate HTML tags and their content before parsing.
///
/// Strips `<script>`, `<style>`, `<nav>`, `<footer>`, `<header>`, `<aside>`,
/// `<noscript>`, `<svg>`, `<form>` and `<iframe>` elements including all
/// their content.
fn strip_boilerplate_tags(html: &str) -> String {
    let tags = [
        "script", "style", "nav", "footer", "header", "aside", "noscript", "svg", "iframe",
        "form",
    ];

    let mut result = html.to_owned();
    for tag in &tags {
        result = strip_tag(&result, tag);
    }
    result
}

/// Remove all instances of a specific HTML tag and its content.
fn strip_tag(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let lower = html.to_ascii_lowercase();
    let open_tag = format!("<{tag}");
    let close_tag = format!("</{tag}>");

    let mut pos = 0;
    loop {
        let start = match lower[pos..].find(&open_tag) {
            Some(offset) => pos + offset,
            None => {
                result.push_str(&html[pos..]);
                break;
            }
        };

        // Reject prefixes of longer tag names (<navigate> for <nav>).
        let after_tag = start + open_tag.len();
        if after_tag < lower.len() {
            let next_byte = lower.as_bytes()[after_tag];
            if !matches!(next_byte, b' ' | b'>' | b'/' | b'\n' | b'\r' | b'\t') {
                result.push_str(&html[pos..after_tag]);
                pos = after_tag;
                continue;
            }
        }

        result.push_str(&html[pos..start]);

        let end = match lower[start..].find(&close_tag) {
            Some(offset) => start + offset + close_tag.len(),
            None => match lower[start..].find('>') {
                Some(offset) => start + offset + 1,
                None => html.len(),
            },
        };

        pos = end;
    }

    result
}

/// Collapse excess whitespace: runs of spaces become one, 3+ newlines become 2.
fn normalise_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;
    let mut newline_count: u32 = 0;

    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            newline_count += 1;
            prev_was_space = false;
            if newline_count <= 2 {
                result.push('\n');
            }
        } else if ch.is_whitespace() {
            newline_count = 0;
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            newline_count = 0;
            prev_was_space = false;
            result.push(ch);
        }
    }

    result
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// Truncate text to `max_chars` characters, appending [`TRUNCATION_MARKER`].
fn truncate_to_limit(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_owned(),
        Some((cut, _)) => {
            let mut truncated = text[..cut].trim_end().to_owned();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
    }
}
