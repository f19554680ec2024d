//! Token budget allocation across extracted documents.
//!
//! Token counts are a character heuristic, not a tokenizer: characters
//! divided by four, or by three for bracket-dense (code-like) text.

use serde::{Deserialize, Serialize};

use crate::config::BudgetConfig;

/// Marker appended after a hard character cut.
pub const ELLIPSIS: &str = "…";

/// Sentence-trimmed output shorter than this share of the allowance falls
/// back to a hard cut.
const MIN_KEEP_RATIO: f64 = 0.3;

const CODE_CHARS: &[char] = &['{', '}', '[', ']', '(', ')', '<', '>', ';', '='];

/// How a total budget is split across extracts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStrategy {
    /// Even split.
    Equal,
    /// Fixed front-loaded percentages.
    TopHeavy,
    /// Weighted by rerank score; even split when no scores are present.
    #[default]
    Proportional,
}

impl std::str::FromStr for BudgetStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "top_heavy" | "top-heavy" => Ok(Self::TopHeavy),
            "proportional" => Ok(Self::Proportional),
            other => Err(format!("unknown budget strategy: {other}")),
        }
    }
}

/// One fetched document, owned by a single research call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extract {
    /// Source URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Block-structured text, trimmed after allocation.
    pub text: String,
    /// Rerank score in [0, 1], when the extract was reranked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Tokens granted by the allocator.
    #[serde(default)]
    pub budget_allocated: usize,
    /// Estimated tokens of the trimmed text.
    #[serde(default)]
    pub budget_used: usize,
}

impl Extract {
    /// A fresh extract with no allocation yet.
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: text.into(),
            score: None,
            budget_allocated: 0,
            budget_used: 0,
        }
    }

    /// Attach a rerank score, clamped to [0, 1].
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 1.0));
        self
    }
}

/// Splits a token budget across extracts and trims each to its share.
#[derive(Debug, Clone, Default)]
pub struct BudgetAllocator {
    config: BudgetConfig,
}

impl BudgetAllocator {
    /// Create an allocator with the given heuristics.
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    /// Characters per token for `text`.
    pub fn chars_per_token(&self, text: &str) -> usize {
        let total = text.chars().count();
        if total == 0 {
            return self.config.chars_per_token.max(1);
        }
        let code = text.chars().filter(|c| CODE_CHARS.contains(c)).count();
        let density = code as f64 / total as f64;
        if density > self.config.code_density_threshold {
            self.config.code_chars_per_token.max(1)
        } else {
            self.config.chars_per_token.max(1)
        }
    }

    /// Estimated token count of `text`.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token(text))
    }

    /// Give each extract its share of `total_budget` tokens and trim its text
    /// to whole sentences within that share.
    pub fn allocate(
        &self,
        extracts: Vec<Extract>,
        total_budget: usize,
        strategy: BudgetStrategy,
    ) -> Vec<Extract> {
        let shares = shares(&extracts, total_budget, strategy);
        extracts
            .into_iter()
            .zip(shares)
            .map(|(mut extract, tokens)| {
                let max_chars = tokens * self.chars_per_token(&extract.text);
                extract.text = trim_to_sentences(&extract.text, max_chars);
                extract.budget_allocated = tokens;
                extract.budget_used = self.estimate_tokens(&extract.text);
                extract
            })
            .collect()
    }
}

/// Token share per extract, in input order. Shares never sum above `total`.
fn shares(extracts: &[Extract], total: usize, strategy: BudgetStrategy) -> Vec<usize> {
    let n = extracts.len();
    if n == 0 {
        return Vec::new();
    }
    match strategy {
        BudgetStrategy::Equal => equal_shares(n, total),
        BudgetStrategy::TopHeavy => top_heavy_percentages(n)
            .into_iter()
            .map(|pct| (total as f64 * pct / 100.0).floor() as usize)
            .collect(),
        BudgetStrategy::Proportional => {
            let weights: Vec<f64> = extracts
                .iter()
                .map(|e| e.score.unwrap_or(0.0).max(0.0))
                .collect();
            let sum: f64 = weights.iter().sum();
            if sum <= f64::EPSILON {
                return equal_shares(n, total);
            }
            weights
                .into_iter()
                .map(|w| (total as f64 * w / sum).floor() as usize)
                .collect()
        }
    }
}

fn equal_shares(n: usize, total: usize) -> Vec<usize> {
    let base = total / n;
    let remainder = total % n;
    (0..n).map(|i| base + usize::from(i < remainder)).collect()
}

/// Percentages for the front-loaded split: 100; 60/40; 40/30/30; beyond
/// three documents 40/30/20 with the last 10% spread over the rest.
fn top_heavy_percentages(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![100.0],
        2 => vec![60.0, 40.0],
        3 => vec![40.0, 30.0, 30.0],
        _ => {
            let tail = 10.0 / (n - 3) as f64;
            let mut pcts = vec![40.0, 30.0, 20.0];
            pcts.extend(std::iter::repeat_n(tail, n - 3));
            pcts
        }
    }
}

/// Trim `text` to at most `max_chars` characters on sentence boundaries.
///
/// Falls back to a hard cut at the last whitespace plus [`ELLIPSIS`] when
/// whole sentences would keep too little of the allowance.
pub fn trim_to_sentences(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    if max_chars == 0 {
        return String::new();
    }

    let mut kept = String::new();
    let mut kept_chars = 0;
    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if kept_chars + len > max_chars {
            break;
        }
        kept.push_str(sentence);
        kept_chars += len;
    }
    let kept = kept.trim_end().to_owned();

    if (kept.chars().count() as f64) < max_chars as f64 * MIN_KEEP_RATIO {
        hard_cut(text, max_chars)
    } else {
        kept
    }
}

/// Sentence slices of `text`, each including its terminator and the
/// whitespace that follows it.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let terminal = matches!(c, '.' | '!' | '?' | '…' | '\n');
        let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
        if terminal && at_boundary {
            let mut end = i + c.len_utf8();
            while let Some(&(j, ws)) = chars.peek() {
                if !ws.is_whitespace() {
                    break;
                }
                end = j + ws.len_utf8();
                chars.next();
            }
            sentences.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn hard_cut(text: &str, max_chars: usize) -> String {
    let room = max_chars.saturating_sub(1);
    let end = text
        .char_indices()
        .nth(room)
        .map_or(text.len(), |(i, _)| i);
    let head = &text[..end];
    let head = match head.rfind(char::is_whitespace) {
        Some(ws) if ws > 0 => &head[..ws],
        _ => head,
    };
    format!("{}{ELLIPSIS}", head.trim_end())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn extract(text: &str) -> Extract {
        Extract::new("https://example.com", "Example", text)
    }

    #[test]
    fn prose_uses_four_chars_per_token() {
        let allocator = BudgetAllocator::default();
        assert_eq!(allocator.estimate_tokens("abcdefgh"), 2);
        assert_eq!(allocator.estimate_tokens("abcdefghi"), 3);
        assert_eq!(allocator.estimate_tokens(""), 0);
    }

    #[test]
    fn code_like_text_uses_three_chars_per_token() {
        let allocator = BudgetAllocator::default();
        let code = "fn main() { let x = [1, 2]; }";
        assert_eq!(allocator.chars_per_token(code), 3);
        assert_eq!(allocator.chars_per_token("Plain prose without brackets."), 4);
    }

    #[test]
    fn equal_split_distributes_remainder() {
        assert_eq!(equal_shares(3, 100), vec![34, 33, 33]);
        assert_eq!(equal_shares(2, 100), vec![50, 50]);
    }

    #[test]
    fn top_heavy_percentages_by_count() {
        assert_eq!(top_heavy_percentages(1), vec![100.0]);
        assert_eq!(top_heavy_percentages(2), vec![60.0, 40.0]);
        assert_eq!(top_heavy_percentages(3), vec![40.0, 30.0, 30.0]);
        assert_eq!(top_heavy_percentages(5), vec![40.0, 30.0, 20.0, 5.0, 5.0]);
        let sum: f64 = top_heavy_percentages(7).iter().sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn proportional_follows_scores() {
        let extracts = vec![
            extract("a").with_score(0.75),
            extract("b").with_score(0.25),
        ];
        assert_eq!(shares(&extracts, 1000, BudgetStrategy::Proportional), vec![750, 250]);
    }

    #[test]
    fn proportional_without_scores_is_equal() {
        let extracts = vec![extract("a"), extract("b")];
        assert_eq!(shares(&extracts, 1000, BudgetStrategy::Proportional), vec![500, 500]);
    }

    #[test]
    fn shares_never_exceed_total() {
        let extracts: Vec<Extract> = (0..7u32).map(|i| extract("x").with_score(0.1 * f64::from(i))).collect();
        for strategy in [BudgetStrategy::Equal, BudgetStrategy::TopHeavy, BudgetStrategy::Proportional] {
            let total: usize = shares(&extracts, 1501, strategy).iter().sum();
            assert!(total <= 1501, "{strategy:?} allocated {total}");
        }
    }

    #[test]
    fn trim_keeps_whole_sentences() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let trimmed = trim_to_sentences(text, 45);
        assert_eq!(trimmed, "First sentence here. Second sentence here.");
    }

    #[test]
    fn short_text_untouched() {
        assert_eq!(trim_to_sentences("Short.", 100), "Short.");
    }

    #[test]
    fn hard_cut_when_first_sentence_is_too_long() {
        let text = "word ".repeat(100);
        let trimmed = trim_to_sentences(text.trim(), 50);
        assert!(trimmed.ends_with(ELLIPSIS));
        assert!(trimmed.chars().count() <= 50);
        assert!(!trimmed.contains("wo…"));
    }

    #[test]
    fn allocate_records_budgets() {
        let long = "This sentence is fairly long and informative. ".repeat(40);
        let allocator = BudgetAllocator::default();
        let out = allocator.allocate(
            vec![extract(&long), extract(&long)],
            100,
            BudgetStrategy::Equal,
        );
        assert_eq!(out.len(), 2);
        for e in &out {
            assert_eq!(e.budget_allocated, 50);
            assert!(e.budget_used <= 50);
            assert!(e.text.ends_with('.'));
        }
    }

    #[test]
    fn allocate_empty_is_empty() {
        let allocator = BudgetAllocator::default();
        assert!(allocator.allocate(Vec::new(), 1500, BudgetStrategy::TopHeavy).is_empty());
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("top-heavy".parse::<BudgetStrategy>().unwrap(), BudgetStrategy::TopHeavy);
        assert!("random".parse::<BudgetStrategy>().is_err());
    }
}
