//! Source-trust policy: query category to preferred/allowed domains.
//!
//! The policy is a static TOML document loaded once at startup:
//!
//! ```toml
//! [fallback.prefer]
//! "ansa.it" = 1.0
//!
//! [categories.scores.prefer]
//! "flashscore.it" = 1.35
//!
//! [categories.odds.avoid]
//! "spam.example" = 0.0
//! ```
//!
//! Queries are categorised with a data-driven regex table; lists are ordered
//! by descending weight, and missing lists come from `fallback`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use gnosis_search::SearchResult;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GnosisError, Result};
use crate::patterns::compile;

/// The policy shipped in `config/source_trust.toml`.
const BUILTIN_POLICY: &str = include_str!("../config/source_trust.toml");

/// Domains kept per list.
pub const MAX_DOMAINS: usize = 16;

/// Query categories with their trigger patterns, checked in order.
static CATEGORY_PATTERNS: LazyLock<Vec<(PolicyCategory, Regex)>> = LazyLock::new(|| {
    [
        (
            PolicyCategory::Scores,
            r"(?i)\b(risultat[oi]|score|final|live|classifica|tabellone)\b",
        ),
        (
            PolicyCategory::Odds,
            r"(?i)\b(quote|odds|linee|handicap|moneyline|over/under|spread)\b",
        ),
        (
            PolicyCategory::Stats,
            r"(?i)\b(statistiche|xg|xga|formazione|lineup|head to head|h2h|expected)\b",
        ),
        (
            PolicyCategory::News,
            r"(?i)\b(ultim[ei]|breaking|notiz\w*|rumor|infortun\w*|transfer|mercato)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(category, pattern)| compile(pattern).map(|re| (category, re)))
    .collect()
});

/// Fixed set of query categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    /// Live scores and standings.
    Scores,
    /// Betting odds and lines.
    Odds,
    /// Match statistics and lineups.
    Stats,
    /// News, transfers and injuries.
    News,
}

impl PolicyCategory {
    /// Key used in the policy file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scores => "scores",
            Self::Odds => "odds",
            Self::Stats => "stats",
            Self::News => "news",
        }
    }

    /// Categorise `query`. Unmatched queries are odds when they mention a
    /// prediction or a quote, news otherwise.
    pub fn of_query(query: &str) -> Self {
        let q = query.trim().to_lowercase();
        if let Some((category, _)) = CATEGORY_PATTERNS.iter().find(|(_, re)| re.is_match(&q)) {
            return *category;
        }
        if q.contains("pronostico") || q.contains("quota") {
            Self::Odds
        } else {
            Self::News
        }
    }
}

impl std::fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain → weight tables for one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryNode {
    /// Preferred domains.
    pub prefer: BTreeMap<String, f64>,
    /// Allowed domains.
    pub allow: BTreeMap<String, f64>,
    /// Domains dropped from results.
    pub avoid: BTreeMap<String, f64>,
}

/// The whole trust configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    /// Per-category tables, keyed by category name.
    pub categories: BTreeMap<String, CategoryNode>,
    /// Lists used when a category (or one of its lists) is absent.
    pub fallback: CategoryNode,
}

/// The policy selected for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainPolicy {
    /// Category the query fell into.
    pub category: PolicyCategory,
    /// Preferred domains, highest weight first.
    pub prefer: Vec<String>,
    /// Allowed domains, highest weight first, excluding preferred ones.
    pub allow: Vec<String>,
    /// Domains to drop.
    pub avoid: Vec<String>,
}

impl DomainPolicy {
    /// A policy with no domain preferences.
    pub fn open(category: PolicyCategory) -> Self {
        Self {
            category,
            prefer: Vec::new(),
            allow: Vec::new(),
            avoid: Vec::new(),
        }
    }
}

/// Keys ordered by weight descending; ties stay alphabetical.
fn ordered(table: &BTreeMap<String, f64>) -> Vec<String> {
    let mut items: Vec<(&String, f64)> = table.iter().map(|(k, w)| (k, *w)).collect();
    items.sort_by(|a, b| b.1.total_cmp(&a.1));
    items
        .into_iter()
        .map(|(k, _)| k.trim().to_ascii_lowercase())
        .filter(|k| !k.is_empty())
        .take(MAX_DOMAINS)
        .collect()
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

impl TrustPolicy {
    /// Parse a policy document.
    ///
    /// # Errors
    ///
    /// Returns [`GnosisError::Config`] for malformed TOML or negative weights.
    pub fn from_toml(content: &str) -> Result<Self> {
        let policy: Self = toml::from_str(content)
            .map_err(|e| GnosisError::Config(format!("invalid trust policy: {e}")))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load a policy file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// The policy shipped with the crate.
    pub fn builtin() -> Self {
        match Self::from_toml(BUILTIN_POLICY) {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!(error = %e, "built-in trust policy invalid, using an empty one");
                Self::default()
            }
        }
    }

    /// Load `path` if given, else the default policy file when present,
    /// else the built-in policy.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file is unreadable or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = crate::gnosis_dirs::policy_file();
        match path {
            Some(p) => Self::from_file(p),
            None if default_path.is_file() => Self::from_file(&default_path),
            None => Ok(Self::builtin()),
        }
    }

    /// Reject negative or non-finite weights and unknown categories.
    ///
    /// # Errors
    ///
    /// Returns [`GnosisError::Config`] naming the offending entry.
    pub fn validate(&self) -> Result<()> {
        let known = ["scores", "odds", "stats", "news"];
        for name in self.categories.keys() {
            if !known.contains(&name.as_str()) {
                return Err(GnosisError::Config(format!(
                    "unknown trust policy category `{name}`"
                )));
            }
        }
        let nodes = self
            .categories
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .chain(std::iter::once(("fallback", &self.fallback)));
        for (name, node) in nodes {
            for (domain, weight) in node.prefer.iter().chain(&node.allow).chain(&node.avoid) {
                if !weight.is_finite() || *weight < 0.0 {
                    return Err(GnosisError::Config(format!(
                        "trust weight for `{domain}` in `{name}` must be a non-negative number"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Select the domain policy for `query`.
    pub fn pick(&self, query: &str) -> DomainPolicy {
        let category = PolicyCategory::of_query(query);
        let node = self.categories.get(category.as_str());
        let list = |select: fn(&CategoryNode) -> &BTreeMap<String, f64>| {
            let own = node.map(|n| ordered(select(n))).unwrap_or_default();
            if own.is_empty() {
                ordered(select(&self.fallback))
            } else {
                own
            }
        };

        let prefer = list(|n| &n.prefer);
        let allow = list(|n| &n.allow)
            .into_iter()
            .filter(|d| !prefer.contains(d))
            .collect();
        let avoid = list(|n| &n.avoid);
        DomainPolicy {
            category,
            prefer,
            allow,
            avoid,
        }
    }

    /// Stable-sort `results` with preferred domains first, then allowed
    /// ones, dropping avoided domains.
    pub fn rank_results(results: Vec<SearchResult>, policy: &DomainPolicy) -> Vec<SearchResult> {
        let bonus = |host: &str, domains: &[String]| domains.iter().any(|d| host_matches(host, d));
        let mut scored: Vec<(u8, SearchResult)> = results
            .into_iter()
            .filter_map(|r| {
                let host = url::Url::parse(&r.url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
                    .unwrap_or_default();
                if bonus(&host, &policy.avoid) {
                    return None;
                }
                let score = if bonus(&host, &policy.prefer) {
                    2
                } else if bonus(&host, &policy.allow) {
                    1
                } else {
                    0
                };
                Some((score, r))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, r)| r).collect()
    }
}
