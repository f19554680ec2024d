//! Relevance reranking of search candidates.
//!
//! An optional cross-encoder scores `(query, text)` pairs; when it is absent
//! or fails, cosine similarity over bag-of-words vectors is used instead.

use std::collections::HashMap;

use gnosis_search::SearchResult;
use serde::{Deserialize, Serialize};

use crate::error::{GnosisError, Result};

/// Characters of `title + snippet` considered per candidate.
pub const MAX_TEXT_CHARS: usize = 512;

/// Candidates beyond this many are dropped before scoring.
pub const MAX_CANDIDATES: usize = 40;

/// Default number of results returned.
pub const DEFAULT_TOP_K: usize = 8;

/// A model that scores query/passage relevance.
pub trait CrossEncoder: Send + Sync {
    /// One score per text, ideally in [0, 1].
    ///
    /// # Errors
    ///
    /// Any error makes the reranker fall back to lexical scoring.
    fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f64>>;
}

/// A search result with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// The underlying search result.
    #[serde(flatten)]
    pub result: SearchResult,
    /// Relevance in [0, 1].
    pub rerank_score: f64,
}

/// Reorders candidates by relevance to the query.
#[derive(Default)]
pub struct Reranker {
    model: Option<Box<dyn CrossEncoder>>,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("model", &self.model.as_ref().map(|_| "cross-encoder"))
            .finish()
    }
}

impl Reranker {
    /// A lexical-only reranker.
    pub fn lexical() -> Self {
        Self { model: None }
    }

    /// A reranker backed by `model`, falling back to lexical scoring on error.
    pub fn with_model(model: Box<dyn CrossEncoder>) -> Self {
        Self { model: Some(model) }
    }

    /// Score and sort `results`, keeping the best `top_k`. Ties keep input order.
    pub fn rerank(&self, query: &str, results: Vec<SearchResult>, top_k: usize) -> Vec<RankedResult> {
        if results.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let mut results = results;
        results.truncate(MAX_CANDIDATES);

        let texts: Vec<String> = results.iter().map(candidate_text).collect();
        let scores = self.scores(query, &texts);

        let mut ranked: Vec<RankedResult> = results
            .into_iter()
            .zip(scores)
            .map(|(result, score)| RankedResult {
                result,
                rerank_score: clamp_score(score),
            })
            .collect();
        ranked.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score));
        ranked.truncate(top_k);
        ranked
    }

    fn scores(&self, query: &str, texts: &[String]) -> Vec<f64> {
        if let Some(model) = &self.model {
            let scored = model.score(query, texts).and_then(|scores| {
                if scores.len() == texts.len() {
                    Ok(scores)
                } else {
                    Err(GnosisError::Config(format!(
                        "cross-encoder returned {} scores for {} texts",
                        scores.len(),
                        texts.len()
                    )))
                }
            });
            match scored {
                Ok(scores) => return scores,
                Err(e) => tracing::warn!(error = %e, "cross-encoder failed, using lexical scores"),
            }
        }
        let query_vec = bag_of_words(query);
        texts
            .iter()
            .map(|t| cosine(&query_vec, &bag_of_words(t)))
            .collect()
    }
}

/// `title + " " + snippet`, capped at [`MAX_TEXT_CHARS`].
fn candidate_text(result: &SearchResult) -> String {
    let joined = format!("{} {}", result.title.trim(), result.snippet_text().trim());
    let trimmed = joined.trim();
    let text = if trimmed.is_empty() { "Untitled" } else { trimmed };
    text.chars().take(MAX_TEXT_CHARS).collect()
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

/// Lowercased alphanumeric term counts.
fn bag_of_words(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom <= f64::EPSILON { 0.0 } else { dot / denom }
}
