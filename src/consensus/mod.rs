//! Multi-source consensus over odds, scores and dates.
//!
//! Each source contributes only its first claim of each type. Values are
//! bucketed by exact normalised string and weighted by the source's domain;
//! the heaviest bucket is the majorant and its share of the total weight is
//! the per-type ratio. Overall confidence is the weighted mean of the three
//! ratios (odds 0.45, scores 0.40, dates 0.15).

pub mod claims;

use std::collections::HashMap;

use gnosis_search::chain::url_normalize::registrable_domain;
use serde::{Deserialize, Serialize};

use crate::budget::Extract;
use crate::config::ConsensusConfig;
use crate::quality::round3;

pub use claims::{ClaimType, Claims, extract_claims};

/// Built-in per-domain weights. Unlisted domains and claim types weigh 1.0.
const DOMAIN_WEIGHTS: &[(&str, ClaimType, f64)] = &[
    ("flashscore.it", ClaimType::Scores, 1.35),
    ("flashscore.it", ClaimType::Dates, 1.15),
    ("diretta.it", ClaimType::Scores, 1.30),
    ("diretta.it", ClaimType::Dates, 1.15),
    ("legaseriea.it", ClaimType::Scores, 1.40),
    ("legaseriea.it", ClaimType::Dates, 1.25),
    ("pinnacle.com", ClaimType::Odds, 1.35),
    ("bet365.com", ClaimType::Odds, 1.30),
    ("oddsportal.com", ClaimType::Odds, 1.25),
];

/// One value per claim type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerType<T> {
    /// Odds.
    pub odds: T,
    /// Scores.
    pub scores: T,
    /// Dates.
    pub dates: T,
}

impl<T> PerType<T> {
    /// Value for one claim type.
    pub fn get(&self, kind: ClaimType) -> &T {
        match kind {
            ClaimType::Odds => &self.odds,
            ClaimType::Scores => &self.scores,
            ClaimType::Dates => &self.dates,
        }
    }

    fn get_mut(&mut self, kind: ClaimType) -> &mut T {
        match kind {
            ClaimType::Odds => &mut self.odds,
            ClaimType::Scores => &mut self.scores,
            ClaimType::Dates => &mut self.dates,
        }
    }
}

/// A single disagreement with the majorant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDiff {
    /// Which claim type disagrees.
    #[serde(rename = "type")]
    pub kind: ClaimType,
    /// The source's value.
    pub got: String,
    /// The majorant.
    pub want: String,
    /// Signed `got - want` for odds, rounded to three decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

/// All disagreements of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Registrable domain of the source.
    pub domain: String,
    /// Source URL.
    pub url: String,
    /// Per-type differences.
    pub diffs: Vec<ClaimDiff>,
}

/// Result of a consensus check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    /// `confidence >= threshold`.
    pub validated: bool,
    /// Weighted mean of per-type ratios, in [0, 1], three decimals.
    pub confidence: f64,
    /// Majority value per type, absent when no source made such a claim.
    pub majorants: PerType<Option<String>>,
    /// Majorant weight over total weight per type.
    pub ratios: PerType<f64>,
    /// Sources disagreeing with a majorant.
    pub conflicts: Vec<Conflict>,
    /// Total domain weight that took part per type.
    pub field_weights: PerType<f64>,
}

struct SourceClaims<'a> {
    url: &'a str,
    domain: String,
    claims: Claims,
}

/// Domain-weighted consensus validator.
#[derive(Debug, Clone)]
pub struct ConsensusValidator {
    weights: HashMap<(String, ClaimType), f64>,
    threshold: f64,
    odds_tolerance: f64,
}

impl Default for ConsensusValidator {
    fn default() -> Self {
        Self::new(&ConsensusConfig::default())
    }
}

impl ConsensusValidator {
    /// Build a validator, merging configured overrides over the built-in table.
    pub fn new(config: &ConsensusConfig) -> Self {
        let mut weights: HashMap<(String, ClaimType), f64> = DOMAIN_WEIGHTS
            .iter()
            .map(|(domain, kind, w)| (((*domain).to_owned(), *kind), *w))
            .collect();
        for (domain, o) in &config.domain_weights {
            let domain = domain.to_ascii_lowercase();
            for (kind, w) in [
                (ClaimType::Odds, o.odds),
                (ClaimType::Scores, o.scores),
                (ClaimType::Dates, o.dates),
            ] {
                if let Some(w) = w {
                    weights.insert((domain.clone(), kind), w);
                }
            }
        }
        Self {
            weights,
            threshold: config.threshold,
            odds_tolerance: config.odds_tolerance,
        }
    }

    /// Weight of `domain` for claims of `kind`.
    pub fn weight_for(&self, domain: &str, kind: ClaimType) -> f64 {
        self.weights
            .get(&(domain.to_ascii_lowercase(), kind))
            .copied()
            .unwrap_or(1.0)
    }

    /// Compare claims across `extracts`.
    pub fn validate(&self, extracts: &[Extract]) -> ConsensusReport {
        let sources: Vec<SourceClaims<'_>> = extracts
            .iter()
            .map(|e| SourceClaims {
                url: &e.url,
                domain: registrable_domain(&e.url),
                claims: extract_claims(&e.text),
            })
            .collect();

        let mut majorants: PerType<Option<String>> = PerType::default();
        let mut ratios: PerType<f64> = PerType::default();
        let mut field_weights: PerType<f64> = PerType::default();

        for kind in ClaimType::ALL {
            let votes: Vec<(&str, f64)> = sources
                .iter()
                .filter_map(|s| {
                    s.claims
                        .first(kind)
                        .map(|v| (v, self.weight_for(&s.domain, kind)))
                })
                .collect();
            *field_weights.get_mut(kind) = votes.iter().map(|(_, w)| w).sum();
            if let Some((ratio, value)) = weighted_majorant(&votes) {
                *ratios.get_mut(kind) = ratio;
                *majorants.get_mut(kind) = Some(value.to_owned());
            }
        }

        let weighted: f64 = ClaimType::ALL
            .iter()
            .map(|k| ratios.get(*k) * k.confidence_weight())
            .sum();
        let total: f64 = ClaimType::ALL.iter().map(|k| k.confidence_weight()).sum();
        let confidence = round3((weighted / total).clamp(0.0, 1.0));

        let conflicts: Vec<Conflict> = sources
            .iter()
            .filter_map(|s| {
                let diffs = self.diffs(&s.claims, &majorants);
                (!diffs.is_empty()).then(|| Conflict {
                    domain: s.domain.clone(),
                    url: s.url.to_owned(),
                    diffs,
                })
            })
            .collect();

        let validated = confidence >= self.threshold;
        tracing::debug!(
            confidence,
            validated,
            sources = sources.len(),
            conflicts = conflicts.len(),
            "consensus computed"
        );

        ConsensusReport {
            validated,
            confidence,
            majorants,
            ratios,
            conflicts,
            field_weights,
        }
    }

    fn diffs(&self, claims: &Claims, majorants: &PerType<Option<String>>) -> Vec<ClaimDiff> {
        let mut diffs = Vec::new();
        for kind in ClaimType::ALL {
            let (Some(got), Some(want)) = (claims.first(kind), majorants.get(kind).as_deref())
            else {
                continue;
            };
            let diff = match kind {
                ClaimType::Odds => self.odds_diff(got, want),
                ClaimType::Scores | ClaimType::Dates => (got != want).then(|| ClaimDiff {
                    kind,
                    got: got.to_owned(),
                    want: want.to_owned(),
                    delta: None,
                }),
            };
            diffs.extend(diff);
        }
        diffs
    }

    fn odds_diff(&self, got: &str, want: &str) -> Option<ClaimDiff> {
        let parsed = got.parse::<f64>().ok().zip(want.parse::<f64>().ok());
        let delta = match parsed {
            Some((g, w)) if (g - w).abs() <= self.odds_tolerance => return None,
            Some((g, w)) => Some(round3(g - w)),
            None => None,
        };
        Some(ClaimDiff {
            kind: ClaimType::Odds,
            got: got.to_owned(),
            want: want.to_owned(),
            delta,
        })
    }
}

/// `(ratio, value)` of the heaviest bucket. Ties keep the value seen first.
fn weighted_majorant<'a>(votes: &[(&'a str, f64)]) -> Option<(f64, &'a str)> {
    let mut buckets: Vec<(&str, f64)> = Vec::new();
    let mut total = 0.0;
    for (value, weight) in votes {
        total += weight;
        match buckets.iter_mut().find(|(v, _)| v == value) {
            Some((_, w)) => *w += weight,
            None => buckets.push((*value, *weight)),
        }
    }
    if total <= 0.0 {
        return None;
    }
    let mut best: Option<(&str, f64)> = None;
    for (value, weight) in buckets {
        if best.is_none_or(|(_, w)| weight > w) {
            best = Some((value, weight));
        }
    }
    best.map(|(value, weight)| ((weight / total).clamp(0.0, 1.0), value))
}
