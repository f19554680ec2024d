//! Answer quality gate for synthesized text.
//!
//! Four scored checks (length, no evasive phrasing, fact density, sentence
//! count) plus a non-scoring warning for bullet-only answers. Issues are
//! machine-readable strings so callers can retry synthesis with feedback.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::patterns::compile_all;

/// Score at or above which an answer is accepted (three of four checks).
pub const VALID_THRESHOLD: f64 = 0.75;

/// Share of bullet lines above which an answer is flagged.
const BULLET_RATIO: f64 = 0.7;

/// Characters of context kept around each evasive match.
const PHRASE_CONTEXT: usize = 30;

/// Evasive phrases in Italian and English.
static EVASIVE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)non.*abbastanza.*informazion",
        r"(?i)non.*sufficien.*informazion",
        r"(?i)le\s+fonti\s+(non\s+)?contengon[oi].*sufficien",
        r"(?i)consulta.*font[ei]",
        r"(?i)apri.*fonte",
        r"(?i)visita.*sit[oi]",
        r"(?i)per\s+maggiori\s+dettagli.*font",
        r"(?i)non\s+posso\s+rispondere",
        r"(?i)non\s+ho\s+abbastanza",
        r"(?i)potrebbe.*essere.*utile.*consultare",
        r"(?i)ti\s+consiglio\s+di\s+(aprire|visitare|consultare)",
        r"(?i)per\s+informazioni\s+aggiornate.*consult",
        r"(?i)verifica\s+direttamente",
        r"(?i)sfortunatamente.*non",
        r"(?i)purtroppo.*non",
        r"(?i)mi\s+dispiace.*non",
        r"(?i)(not|n't)\s+(contain\s+)?enough\s+information",
        r"(?i)sources?\s+(do\s+not|don't|does\s+not|doesn't)\s+contain",
        r"(?i)consult\s+the\s+sources?\s+directly",
        r"(?i)visit\s+the\s+(web)?site",
        r"(?i)(i\s+cannot|i\s+can't|unable\s+to)\s+answer",
        r"(?i)for\s+(more|up-to-date)\s+(details|information).*(check|consult|visit)",
        r"(?i)unfortunately.*(cannot|can't|not\s+able)",
        r"(?i)i'm\s+sorry.*(cannot|can't)",
    ])
});

/// Fact-like patterns: numbers, dates, currency, units, percentages and
/// capitalized name pairs.
static FACTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\d+",
        r"\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}",
        r"[€$£¥]\s*\d+",
        r"\d+\s*[€$£¥]",
        r"\d+\s*(kg|km|ml|m|g|l)\b",
        r"\d+\s*%",
        r"[A-Z][a-z]+\s+[A-Z][a-z]+",
    ])
});

static SENTENCE_SPLIT: LazyLock<Option<Regex>> =
    LazyLock::new(|| crate::patterns::compile(r"[.!?]+"));

static BULLET_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| crate::patterns::compile(r"^\s*[-•*]\s"));

/// Outcome of a quality check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Whether the answer passed at least three of four checks.
    pub valid: bool,
    /// Fraction of checks passed, rounded to three decimals.
    pub score: f64,
    /// Machine-readable issue tags, e.g. `too_short_40_chars`.
    pub issues: Vec<String>,
    /// Fact-like pattern matches.
    pub facts_count: usize,
    /// Answer length in characters.
    pub length: usize,
    /// Non-empty sentences.
    pub sentences_count: usize,
    /// Remediation hints, one per issue.
    pub suggestions: Vec<String>,
}

/// Scores synthesized answers against configured minimums.
#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    config: QualityConfig,
}

impl QualityValidator {
    /// Create a validator with the given minimums.
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Score `text`.
    pub fn validate(&self, text: &str) -> QualityReport {
        let text = text.trim();
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        let length = text.chars().count();
        let length_ok = length >= self.config.min_length;
        if !length_ok {
            issues.push(format!("too_short_{length}_chars"));
            suggestions.push(format!(
                "Expand the answer to at least {} characters",
                self.config.min_length
            ));
        }

        let evasive: Vec<&str> = EVASIVE
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| m.as_str()))
            .collect();
        if !evasive.is_empty() {
            issues.push(format!("evasive_patterns_{}", evasive.len()));
            suggestions.push(format!(
                "Remove evasive phrasing such as: {}",
                evasive.iter().take(3).copied().collect::<Vec<_>>().join(", ")
            ));
        }

        let facts_count: usize = FACTS.iter().map(|re| re.find_iter(text).count()).sum();
        let facts_ok = facts_count >= self.config.min_facts;
        if !facts_ok {
            issues.push(format!("insufficient_facts_{facts_count}"));
            suggestions.push(format!(
                "Add concrete details (numbers, dates, names): found {facts_count}, need {}",
                self.config.min_facts
            ));
        }

        let sentences_count = count_sentences(text);
        let sentences_ok = sentences_count >= self.config.min_sentences;
        if !sentences_ok {
            issues.push(format!("insufficient_sentences_{sentences_count}"));
            suggestions.push(format!(
                "Write at least {} separate sentences",
                self.config.min_sentences
            ));
        }

        if mostly_bullets(text) {
            issues.push("mostly_bullets".to_owned());
            suggestions.push("Use prose rather than a bullet list".to_owned());
        }

        let passed = [length_ok, evasive.is_empty(), facts_ok, sentences_ok]
            .into_iter()
            .filter(|ok| *ok)
            .count();
        let score = round3(passed as f64 / 4.0);
        let valid = score >= VALID_THRESHOLD;
        if !valid {
            tracing::warn!(score, ?issues, "synthesis quality check failed");
        }

        QualityReport {
            valid,
            score,
            issues,
            facts_count,
            length,
            sentences_count,
            suggestions,
        }
    }

    /// Up to five evasive matches with surrounding context.
    pub fn extract_bad_phrases(&self, text: &str) -> Vec<String> {
        EVASIVE
            .iter()
            .flat_map(|re| re.find_iter(text))
            .map(|m| with_context(text, m.start(), m.end()))
            .take(5)
            .collect()
    }
}

fn count_sentences(text: &str) -> usize {
    match SENTENCE_SPLIT.as_ref() {
        Some(re) => re.split(text).filter(|s| !s.trim().is_empty()).count(),
        None => usize::from(!text.is_empty()),
    }
}

fn mostly_bullets(text: &str) -> bool {
    let Some(re) = BULLET_LINE.as_ref() else {
        return false;
    };
    let lines: Vec<&str> = text.split('\n').collect();
    let bullets = lines.iter().filter(|l| re.is_match(l)).count();
    !text.is_empty() && bullets as f64 / lines.len() as f64 > BULLET_RATIO
}

fn with_context(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(PHRASE_CONTEXT)
        .last()
        .map_or(start, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(PHRASE_CONTEXT)
        .map_or(text.len(), |(i, _)| end + i);
    text[from..to].trim().to_owned()
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
