//! URL sanitising and normalisation for result hygiene and deduplication.
//!
//! Provider HTML hands back raw `href` values: protocol-relative links,
//! redirect wrappers, tracking parameters, and sometimes links back into
//! the search engine itself. [`clean_result_url`] turns those into a
//! usable target URL or rejects them; [`normalize_url`] and [`dedup_key`]
//! canonicalise URLs so equivalent pages compare as equal.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use url::Url;

/// Tracking query parameters that are stripped (in addition to any `utm_*`).
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "igshid", "si", "ref", "ref_src", "spm", "feature",
];

/// Schemes that never point at a readable page.
const BAD_SCHEMES: &[&str] = &["javascript:", "data:", "mailto:", "tel:"];

/// Hosts whose links are search-engine chrome rather than results.
const SEARCH_ENGINE_HOSTS: &[&str] = &["duckduckgo.com", "bing.com"];

/// Returns `true` if the query key is a tracking parameter.
fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Unwrap a provider redirect wrapper, returning the target URL.
///
/// DuckDuckGo wraps results like
/// `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`; the `uddg`
/// parameter is extracted and URL-decoded. Protocol-relative and
/// root-relative DDG links are resolved against `https://duckduckgo.com`.
/// Any other URL is returned unchanged.
pub fn unwrap_redirect(href: &str) -> Option<String> {
    let href = href.trim();
    let full_href = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with("/l/") {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&full_href).ok()?;
    let is_ddg = parsed
        .host_str()
        .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"));

    let is_bing = parsed
        .host_str()
        .is_some_and(|h| h == "bing.com" || h.ends_with(".bing.com"));

    if is_ddg && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else if is_bing && parsed.path().starts_with("/ck/a") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "u")
            .and_then(|(_, value)| decode_bing_target(&value))
            .or(Some(full_href))
    } else {
        Some(full_href)
    }
}

/// Decode Bing's `u=a1<base64url>` click-tracking target.
fn decode_bing_target(value: &str) -> Option<String> {
    let payload = value.strip_prefix("a1")?.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let target = String::from_utf8(bytes).ok()?;
    target.starts_with("http").then_some(target)
}

/// Returns `true` if the URL points back into a search engine's own pages.
pub fn is_search_engine_origin(url: &Url) -> bool {
    url.host_str().is_some_and(|host| {
        let host = host.to_ascii_lowercase();
        SEARCH_ENGINE_HOSTS
            .iter()
            .any(|se| host == *se || host.ends_with(&format!(".{se}")))
    })
}

/// Turn a raw result `href` into a clean, absolute target URL.
///
/// Returns `None` for non-web schemes, unparseable links, and links that
/// stay on the search engine after redirect unwrapping. Tracking
/// parameters and the fragment are removed; remaining parameter order is
/// preserved.
pub fn clean_result_url(href: &str) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if BAD_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return None;
    }

    let target = unwrap_redirect(trimmed)?;
    let mut parsed = Url::parse(&target).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    if is_search_engine_origin(&parsed) {
        return None;
    }

    parsed.set_fragment(None);
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(parsed.to_string())
}

/// Normalise a URL for deduplication comparison.
///
/// Applies the following transformations:
///
/// 1. Lowercase scheme and host (path is preserved as-is).
/// 2. Remove default ports (`:80` for HTTP, `:443` for HTTPS).
/// 3. Remove trailing slash from the path (unless path is exactly `"/"`).
/// 4. Sort remaining query parameters alphabetically by key.
/// 5. Strip tracking parameters (`utm_*`, fbclid, gclid, igshid, etc.).
/// 6. Remove the fragment.
///
/// If the input cannot be parsed as a valid URL, it is returned unchanged.
///
/// # Examples
///
/// ```
/// use gnosis_search::chain::url_normalize::normalize_url;
///
/// let a = normalize_url("https://Example.COM/path/?b=2&a=1#section");
/// let b = normalize_url("https://example.com/path?a=1&b=2");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);

    if is_default_port(&parsed) {
        let _ = parsed.set_port(None);
    }

    let filtered_params: Vec<(String, String)> = {
        let mut params: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        params
    };

    if filtered_params.is_empty() {
        parsed.set_query(None);
    } else {
        let qs: String = filtered_params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&qs));
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(&path[..path.len() - 1]);
    }

    parsed.to_string()
}

/// Case-insensitive identity of a URL: host + path + filtered query.
///
/// Scheme, default port, fragment, tracking parameters and parameter
/// order do not affect the key. Unparseable input falls back to its
/// trimmed lowercase form.
pub fn dedup_key(raw: &str) -> String {
    let normalized = normalize_url(raw.trim());
    let Ok(parsed) = Url::parse(&normalized) else {
        return raw.trim().to_lowercase();
    };
    let host = parsed.host_str().unwrap_or_default();
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = match parsed.path() {
        "/" => "",
        p => p,
    };
    let query = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();
    format!("{host}{port}{path}{query}").to_lowercase()
}

/// Registrable domain approximated as the last two host labels.
///
/// `https://www.flashscore.it/match` → `flashscore.it`. Returns an empty
/// string for unparseable URLs.
pub fn registrable_domain(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw.trim()) else {
        return String::new();
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        host
    }
}

/// Returns `true` if the URL uses the default port for its scheme.
fn is_default_port(url: &Url) -> bool {
    matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    )
}
