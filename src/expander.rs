//! Query expansion into ordered search variants.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;

use crate::patterns::compile;
use crate::policy::DomainPolicy;

/// Maximum variants returned.
pub const MAX_VARIANTS: usize = 16;

/// Informative variants that get `site:` forms.
const SITE_VARIANTS: usize = 3;

/// Domains used for `site:` forms.
const SITE_DOMAINS: usize = 3;

/// Synonym alternatives tried per matched term.
const SYNONYMS_PER_TERM: usize = 2;

/// Earliest year that counts as "already dated".
const FIRST_RECENT_YEAR: i32 = 2018;

/// Term → replacements (Italian and English).
const SYNONYMS: &[(&str, &[&str])] = &[
    ("prezzo", &["quotazione", "valore", "price"]),
    ("quote", &["odds", "quotazioni"]),
    ("quota", &["odds", "quotazione"]),
    ("pronostico", &["previsione", "prediction"]),
    ("risultati", &["punteggio", "score"]),
    ("partita", &["match", "incontro"]),
    ("meteo", &["previsioni", "weather"]),
    ("notizie", &["news", "ultime"]),
    ("bitcoin", &["btc"]),
    ("ethereum", &["eth"]),
    ("azioni", &["borsa", "stock"]),
];

/// Match-style separators between two names: `A - B`, `A v B`, `A vs. B`.
static MATCH_SEPARATOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)(\S)\s+(?:-|–|—|v|vs\.?|contro)\s+(\S)"));

static DOMAIN_CUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)\b(quot[ae]\w*|odds|pronostic\w*|match|partita|vs|risultat[oi]|score|prezzo|price|classifica)\b",
    )
});

static RECENCY_CUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)\b(oggi|adesso|ora|attualmente|corrente|stasera|ieri|scorso|ultim[oaie]|live|today|now|current|latest|recent|yesterday|tonight|last)\b",
    )
});

static YEAR: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\b(19|20)\d{2}\b"));

/// Expands a query into search variants for a domain policy.
#[derive(Debug, Clone)]
pub struct QueryExpander {
    current_year: i32,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExpander {
    /// An expander pinned to the current local year.
    pub fn new() -> Self {
        Self::with_year(chrono::Local::now().year())
    }

    /// An expander pinned to `year`.
    pub fn with_year(year: i32) -> Self {
        Self { current_year: year }
    }

    /// Ordered, case-insensitively unique variants, at most [`MAX_VARIANTS`].
    ///
    /// Order: normalised base, quoted form, synonym and year variants (when
    /// the query has domain cues), `today`/`live` forms (when it has no
    /// recency cue), then `site:` forms of the informative variants.
    pub fn expand(&self, query: &str, policy: &DomainPolicy) -> Vec<String> {
        let base = normalize_separators(query);
        if base.is_empty() {
            return Vec::new();
        }

        let mut variants = Variants::default();
        variants.push(base.clone());
        if base.split_whitespace().count() > 1 {
            variants.push(format!("\"{base}\""));
        }

        if matches(&DOMAIN_CUE, &base) {
            for synonym in synonym_variants(&base) {
                variants.push(synonym);
            }
            if !self.has_recent_year(&base) {
                variants.push(format!("{base} {}", self.current_year));
            }
        }

        let informative: Vec<String> = variants.items.iter().take(SITE_VARIANTS).cloned().collect();

        if !matches(&RECENCY_CUE, &base) {
            variants.push(format!("{base} today"));
            variants.push(format!("{base} live"));
        }

        let domains = policy
            .prefer
            .iter()
            .chain(&policy.allow)
            .take(SITE_DOMAINS);
        for domain in domains {
            for variant in &informative {
                variants.push(format!("{variant} site:{domain}"));
            }
        }

        let mut out = variants.items;
        out.truncate(MAX_VARIANTS);
        out
    }

    fn has_recent_year(&self, query: &str) -> bool {
        let Some(re) = YEAR.as_ref() else {
            return false;
        };
        re.find_iter(query)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .any(|y| (FIRST_RECENT_YEAR..=self.current_year).contains(&y))
    }
}

#[derive(Default)]
struct Variants {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl Variants {
    fn push(&mut self, variant: String) {
        if self.seen.insert(variant.to_lowercase()) {
            self.items.push(variant);
        }
    }
}

fn matches(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// Collapse whitespace and rewrite match separators to ` vs `.
pub fn normalize_separators(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    match MATCH_SEPARATOR.as_ref() {
        Some(re) => re.replace_all(&collapsed, "$1 vs $2").into_owned(),
        None => collapsed,
    }
}

/// Variants with the first occurrence of a known term replaced.
fn synonym_variants(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let mut out = Vec::new();
    for (term, replacements) in SYNONYMS {
        let Some(pos) = words.iter().position(|w| w == term) else {
            continue;
        };
        for replacement in replacements.iter().take(SYNONYMS_PER_TERM) {
            let mut replaced = words.clone();
            replaced[pos] = replacement;
            out.push(replaced.join(" "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::policy::{PolicyCategory, TrustPolicy};

    fn open() -> DomainPolicy {
        DomainPolicy::open(PolicyCategory::News)
    }

    #[test]
    fn separators_normalised() {
        assert_eq!(normalize_separators("Inter - Milan quote"), "Inter vs Milan quote");
        assert_eq!(normalize_separators("Arsenal v  Chelsea"), "Arsenal vs Chelsea");
        assert_eq!(normalize_separators("Roma vs. Lazio"), "Roma vs Lazio");
        assert_eq!(normalize_separators("covid-19 news"), "covid-19 news");
    }

    #[test]
    fn base_and_quoted_come_first() {
        let variants = QueryExpander::with_year(2025).expand("storia di roma", &open());
        assert_eq!(variants[0], "storia di roma");
        assert_eq!(variants[1], "\"storia di roma\"");
    }

    #[test]
    fn single_word_has_no_quoted_form() {
        let variants = QueryExpander::with_year(2025).expand("rust", &open());
        assert!(!variants.iter().any(|v| v.starts_with('"')));
    }

    #[test]
    fn domain_cues_add_synonyms_and_year() {
        let variants = QueryExpander::with_year(2025).expand("quote Inter - Milan", &open());
        assert!(variants.contains(&"odds inter vs milan".to_owned()));
        assert!(variants.contains(&"quote Inter vs Milan 2025".to_owned()));
    }

    #[test]
    fn existing_recent_year_suppresses_year_variant() {
        let variants = QueryExpander::with_year(2025).expand("prezzo bitcoin 2024", &open());
        assert!(!variants.iter().any(|v| v.ends_with(" 2025")));
    }

    #[test]
    fn recency_cue_suppresses_micro_variants() {
        let with_cue = QueryExpander::with_year(2025).expand("prezzo bitcoin oggi", &open());
        assert!(!with_cue.iter().any(|v| v.ends_with(" today") || v.ends_with(" live")));

        let without = QueryExpander::with_year(2025).expand("prezzo bitcoin", &open());
        assert!(without.contains(&"prezzo bitcoin today".to_owned()));
        assert!(without.contains(&"prezzo bitcoin live".to_owned()));
    }

    #[test]
    fn site_variants_are_bounded() {
        let policy = TrustPolicy::builtin().pick("risultati serie a");
        let variants = QueryExpander::with_year(2025).expand("risultati serie a", &policy);
        let site: Vec<&String> = variants.iter().filter(|v| v.contains(" site:")).collect();
        assert!(!site.is_empty());
        assert!(site.len() <= SITE_VARIANTS * SITE_DOMAINS);
        assert!(site[0].ends_with("site:legaseriea.it"));
        assert!(variants.len() <= MAX_VARIANTS);
    }

    #[test]
    fn variants_unique_case_insensitively() {
        let variants = QueryExpander::with_year(2025).expand("Bitcoin prezzo", &open());
        let lower: HashSet<String> = variants.iter().map(|v| v.to_lowercase()).collect();
        assert_eq!(lower.len(), variants.len());
    }

    #[test]
    fn expansion_is_idempotent() {
        let expander = QueryExpander::with_year(2025);
        let policy = TrustPolicy::builtin().pick("quote Inter Milan");
        let first = expander.expand("quote Inter Milan", &policy);
        let second = expander.expand("quote Inter Milan", &policy);
        assert_eq!(first, second);
    }

    #[test]
    fn blank_query_has_no_variants() {
        assert!(QueryExpander::new().expand("   ", &open()).is_empty());
    }
}
