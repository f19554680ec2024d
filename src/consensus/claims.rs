//! Typed claim extraction: odds, scores and dates.
//!
//! Odds are normalised to two-decimal strings, scores to `A-B` and dates to
//! ISO `yyyy-mm-dd`. Extraction order matters because only the first claim
//! of each type per source takes part in consensus: fractional odds come
//! before American and decimal ones; month-name dates before ISO and slash
//! dates.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::patterns::compile;

/// Smallest accepted decimal odds.
pub const MIN_ODDS: f64 = 1.01;
/// Largest accepted decimal odds.
pub const MAX_ODDS: f64 = 50.0;

static SCORE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(\d+)\s*[-–:.]\s*(\d+)\b"));
static ODDS_DECIMAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"[0-9]+(?:\.[0-9]+)?|\.[0-9]+"));
static ODDS_FRACTIONAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(\d{1,3})\s*/\s*(\d{1,3})\b"));
static ODDS_AMERICAN: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"[+-]\d{3,4}"));
static DATE_ISO: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(\d{4})-(\d{2})-(\d{2})\b"));
static DATE_SLASH: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\b"));
static DATE_TEXT: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\b(\d{1,2})\s+([a-zà-ÿ.]{3,12})\s+(\d{2,4})\b"));

/// Italian and English month names and abbreviations.
const MONTHS: &[(&str, u32)] = &[
    ("gen", 1), ("gennaio", 1), ("jan", 1), ("january", 1),
    ("feb", 2), ("febbraio", 2), ("february", 2),
    ("mar", 3), ("marzo", 3), ("march", 3),
    ("apr", 4), ("aprile", 4), ("april", 4),
    ("mag", 5), ("maggio", 5), ("may", 5),
    ("giu", 6), ("giugno", 6), ("jun", 6), ("june", 6),
    ("lug", 7), ("luglio", 7), ("jul", 7), ("july", 7),
    ("ago", 8), ("agosto", 8), ("aug", 8), ("august", 8),
    ("set", 9), ("sett", 9), ("settembre", 9), ("sep", 9), ("sept", 9), ("september", 9),
    ("ott", 10), ("ottobre", 10), ("oct", 10), ("october", 10),
    ("nov", 11), ("novembre", 11), ("november", 11),
    ("dic", 12), ("dicembre", 12), ("dec", 12), ("december", 12),
];

/// Kinds of factual claim compared across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// Betting odds, decimal notation.
    Odds,
    /// Match scores.
    Scores,
    /// Calendar dates.
    Dates,
}

impl ClaimType {
    /// All claim types in report order.
    pub const ALL: [ClaimType; 3] = [ClaimType::Odds, ClaimType::Scores, ClaimType::Dates];

    /// Share of overall confidence carried by this type.
    pub fn confidence_weight(self) -> f64 {
        match self {
            Self::Odds => 0.45,
            Self::Scores => 0.40,
            Self::Dates => 0.15,
        }
    }
}

/// Every claim found in one text, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Decimal odds as two-decimal strings.
    pub odds: Vec<String>,
    /// Scores as `A-B`.
    pub scores: Vec<String>,
    /// Dates as `yyyy-mm-dd`.
    pub dates: Vec<String>,
}

impl Claims {
    /// Claims of one type.
    pub fn of(&self, kind: ClaimType) -> &[String] {
        match kind {
            ClaimType::Odds => &self.odds,
            ClaimType::Scores => &self.scores,
            ClaimType::Dates => &self.dates,
        }
    }

    /// The first claim of one type, which is the one used for consensus.
    pub fn first(&self, kind: ClaimType) -> Option<&str> {
        self.of(kind).first().map(String::as_str)
    }
}

/// Decimal odds from fractional `num/den`: `1 + num/den`.
pub fn decimal_from_fractional(num: u32, den: u32) -> Option<f64> {
    (den > 0).then(|| 1.0 + f64::from(num) / f64::from(den))
}

/// Decimal odds from American notation: `+150` → 2.50, `-120` → 1.83.
pub fn decimal_from_american(us: i32) -> Option<f64> {
    if us >= 100 {
        Some(1.0 + f64::from(us) / 100.0)
    } else if us <= -100 {
        Some(1.0 + 100.0 / f64::from(us.unsigned_abs()))
    } else {
        None
    }
}

/// `05` or `07.5`: a clock or list number, not a price.
fn zero_padded(token: &str) -> bool {
    let mut digits = token.bytes();
    digits.next() == Some(b'0') && digits.next().is_some_and(|b| b.is_ascii_digit())
}

/// Format odds to two decimals when inside the accepted range.
fn odds_value(decimal: f64) -> Option<String> {
    let rounded = (decimal * 100.0).round() / 100.0;
    (MIN_ODDS..=MAX_ODDS)
        .contains(&rounded)
        .then(|| format!("{rounded:.2}"))
}

/// Two-digit years below 70 are 20xx, the rest 19xx.
fn coerce_year(year: i32) -> i32 {
    match year {
        0..=69 => 2000 + year,
        70..=99 => 1900 + year,
        _ => year,
    }
}

fn iso_date(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.trim_matches('.').to_lowercase();
    MONTHS.iter().find(|(m, _)| *m == name).map(|(_, n)| *n)
}

fn group<T: std::str::FromStr>(caps: &Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

/// Whether the byte before `start` or at `end` is an ASCII digit.
fn touches_digit(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].bytes().next_back().is_some_and(|b| b.is_ascii_digit());
    let after = text[end..].bytes().next().is_some_and(|b| b.is_ascii_digit());
    before || after
}

fn text_date(caps: &Captures<'_>) -> Option<String> {
    let day = group::<u32>(caps, 1)?;
    let month = month_number(caps.get(2)?.as_str())?;
    let year = coerce_year(group::<i32>(caps, 3)?);
    iso_date(year, month, day)
}

fn iso_caps_date(caps: &Captures<'_>) -> Option<String> {
    iso_date(group(caps, 1)?, group(caps, 2)?, group(caps, 3)?)
}

fn slash_date(caps: &Captures<'_>) -> Option<String> {
    let day = group::<u32>(caps, 1)?;
    let month = group::<u32>(caps, 2)?;
    let year = coerce_year(group::<i32>(caps, 3)?);
    iso_date(year, month, day)
}

/// Extract every odds, score and date claim from `text`.
pub fn extract_claims(text: &str) -> Claims {
    let text = text.trim();
    let mut claims = Claims::default();

    if let Some(re) = ODDS_FRACTIONAL.as_ref() {
        for caps in re.captures_iter(text) {
            let (Some(num), Some(den)) = (group::<u32>(&caps, 1), group::<u32>(&caps, 2)) else {
                continue;
            };
            if (1900..=2099).contains(&den) {
                continue;
            }
            if let Some(v) = decimal_from_fractional(num, den).and_then(odds_value) {
                claims.odds.push(v);
            }
        }
    }

    if let Some(re) = ODDS_AMERICAN.as_ref() {
        for m in re.find_iter(text) {
            if touches_digit(text, m.start(), m.end()) {
                continue;
            }
            let value = m
                .as_str()
                .parse::<i32>()
                .ok()
                .and_then(decimal_from_american)
                .and_then(odds_value);
            if let Some(v) = value {
                claims.odds.push(v);
            }
        }
    }

    if let Some(re) = ODDS_DECIMAL.as_ref() {
        for m in re.find_iter(text).filter(|m| !zero_padded(m.as_str())) {
            if let Some(v) = m.as_str().parse::<f64>().ok().and_then(odds_value) {
                claims.odds.push(v);
            }
        }
    }

    if let Some(re) = SCORE.as_ref() {
        for caps in re.captures_iter(text) {
            if let (Some(a), Some(b)) = (group::<u64>(&caps, 1), group::<u64>(&caps, 2)) {
                claims.scores.push(format!("{a}-{b}"));
            }
        }
    }

    let date_forms: [(&LazyLock<Option<Regex>>, fn(&Captures<'_>) -> Option<String>); 3] = [
        (&DATE_TEXT, text_date),
        (&DATE_ISO, iso_caps_date),
        (&DATE_SLASH, slash_date),
    ];
    for (pattern, parse) in date_forms {
        if let Some(re) = pattern.as_ref() {
            claims.dates.extend(re.captures_iter(text).filter_map(|caps| parse(&caps)));
        }
    }

    claims
}
