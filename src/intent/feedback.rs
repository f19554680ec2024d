//! Routing feedback and user corrections.
//!
//! Feedback records go to a capped list; corrections live in a hash keyed by
//! the sha256 of the normalised query and expire after the configured TTL.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::Intent;
use crate::config::StoreConfig;
use crate::error::{GnosisError, Result};
use crate::store::KvStore;

/// List of feedback records, newest first.
pub const FEEDBACK_KEY: &str = "list:intent_feedback";

/// Hash of query hash to corrected intent label.
pub const CORRECTIONS_KEY: &str = "hash:corrections";

/// Words of the query used to group feedback.
const PATTERN_WORDS: usize = 3;

/// Hex sha256 of the trimmed, lowercased query.
pub fn query_hash(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One stored feedback record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub query: String,
    pub qhash: String,
    pub intent: Intent,
    pub satisfaction: f64,
    pub response_time_ms: u64,
    /// Unix seconds.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Aggregate over feedback sharing the same leading words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub count: usize,
    pub avg_satisfaction: f64,
    pub intents: BTreeMap<String, usize>,
}

/// Keep scalars; arrays and objects become their JSON text.
fn scalar_only(extra: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, serde_json::Value> {
    extra
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                (key, serde_json::Value::String(value.to_string()))
            }
            scalar => (key, scalar),
        })
        .collect()
}

fn pattern_of(query: &str) -> String {
    query
        .split_whitespace()
        .take(PATTERN_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Feedback and correction log over a [`KvStore`].
#[derive(Clone)]
pub struct FeedbackLog {
    store: Arc<dyn KvStore>,
    max_len: usize,
    correction_ttl: Duration,
}

impl std::fmt::Debug for FeedbackLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackLog")
            .field("max_len", &self.max_len)
            .field("correction_ttl", &self.correction_ttl)
            .finish_non_exhaustive()
    }
}

impl FeedbackLog {
    pub fn new(store: Arc<dyn KvStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            max_len: config.feedback_max_len,
            correction_ttl: Duration::from_secs(u64::from(config.correction_ttl_days) * 86_400),
        }
    }

    /// Append a feedback record.
    ///
    /// # Errors
    ///
    /// [`GnosisError::Config`] for a non-finite satisfaction; store errors
    /// otherwise.
    pub async fn record_feedback(
        &self,
        query: &str,
        intent: Intent,
        satisfaction: f64,
        response_time_ms: u64,
        extra: BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        if !satisfaction.is_finite() {
            return Err(GnosisError::Config(format!(
                "satisfaction must be finite, got {satisfaction}"
            )));
        }
        let record = FeedbackRecord {
            query: query.to_owned(),
            qhash: query_hash(query),
            intent,
            satisfaction,
            response_time_ms,
            ts: chrono::Utc::now().timestamp(),
            extra: scalar_only(extra),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| GnosisError::Store(format!("cannot serialize feedback: {e}")))?;
        self.store.list_push(FEEDBACK_KEY, json, self.max_len).await
    }

    /// Relabel `query`; overrides classification until the TTL lapses.
    pub async fn record_correction(&self, query: &str, intent: Intent) -> Result<()> {
        debug!(intent = intent.as_str(), "recording intent correction");
        self.store
            .hash_set(
                CORRECTIONS_KEY,
                &query_hash(query),
                intent.as_str().to_owned(),
                Some(self.correction_ttl),
            )
            .await
    }

    /// Live correction for `query`, if any.
    pub async fn correction(&self, query: &str) -> Result<Option<Intent>> {
        let Some(label) = self.store.hash_get(CORRECTIONS_KEY, &query_hash(query)).await? else {
            return Ok(None);
        };
        match label.parse::<Intent>() {
            Ok(intent) => Ok(Some(intent)),
            Err(e) => {
                warn!(label, error = %e, "ignoring stored correction");
                Ok(None)
            }
        }
    }

    /// Drop the correction for `query`. Returns whether one existed.
    pub async fn clear_correction(&self, query: &str) -> Result<bool> {
        self.store.hash_del(CORRECTIONS_KEY, &query_hash(query)).await
    }

    /// Group the newest `n` records by their first three words.
    /// Unparseable records are skipped.
    pub async fn analyze_last(&self, n: usize) -> Result<BTreeMap<String, PatternStats>> {
        let raw = self.store.list_range(FEEDBACK_KEY, 0, n).await?;
        let mut sums: BTreeMap<String, (usize, f64, BTreeMap<String, usize>)> = BTreeMap::new();
        for item in raw {
            let Ok(record) = serde_json::from_str::<FeedbackRecord>(&item) else {
                continue;
            };
            let entry = sums.entry(pattern_of(&record.query)).or_default();
            entry.0 += 1;
            entry.1 += record.satisfaction;
            *entry.2.entry(record.intent.as_str().to_owned()).or_default() += 1;
        }
        Ok(sums
            .into_iter()
            .map(|(pattern, (count, total, intents))| {
                let avg_satisfaction = if count == 0 { 0.0 } else { total / count as f64 };
                (
                    pattern,
                    PatternStats {
                        count,
                        avg_satisfaction,
                        intents,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn log() -> FeedbackLog {
        FeedbackLog::new(Arc::new(MemoryStore::new()), &StoreConfig::default())
    }

    #[test]
    fn hash_ignores_case_and_padding() {
        assert_eq!(query_hash("  Meteo Roma "), query_hash("meteo roma"));
        assert_eq!(query_hash("x").len(), 64);
    }

    #[tokio::test]
    async fn correction_round_trip() {
        let log = log();
        assert!(log.correction("meteo roma").await.unwrap().is_none());
        log.record_correction("Meteo Roma", Intent::WebSearch).await.unwrap();
        assert_eq!(log.correction("meteo roma").await.unwrap(), Some(Intent::WebSearch));
        assert!(log.clear_correction("meteo roma").await.unwrap());
        assert!(log.correction("meteo roma").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn analyze_groups_by_leading_words() {
        let log = log();
        let extra = BTreeMap::from([
            ("user".to_owned(), json!(42)),
            ("tags".to_owned(), json!(["a", "b"])),
        ]);
        log.record_feedback("prezzo bitcoin oggi subito", Intent::WebSearch, 1.0, 900, extra)
            .await
            .unwrap();
        log.record_feedback("Prezzo Bitcoin oggi", Intent::DirectAnswer, 0.0, 300, BTreeMap::new())
            .await
            .unwrap();
        log.record_feedback("ciao", Intent::DirectAnswer, 1.0, 10, BTreeMap::new())
            .await
            .unwrap();

        let stats = log.analyze_last(10).await.unwrap();
        let group = &stats["prezzo bitcoin oggi"];
        assert_eq!(group.count, 2);
        assert!((group.avg_satisfaction - 0.5).abs() < 1e-9);
        assert_eq!(group.intents["WEB_SEARCH"], 1);
        assert_eq!(group.intents["DIRECT_ANSWER"], 1);
        assert_eq!(stats["ciao"].count, 1);
    }

    #[tokio::test]
    async fn non_scalar_extras_are_stringified() {
        let store = Arc::new(MemoryStore::new());
        let log = FeedbackLog::new(store.clone(), &StoreConfig::default());
        let extra = BTreeMap::from([("nested".to_owned(), json!({"k": 1}))]);
        log.record_feedback("q", Intent::WebSearch, 0.8, 5, extra).await.unwrap();

        let raw = store.list_range(FEEDBACK_KEY, 0, 1).await.unwrap();
        let record: FeedbackRecord = serde_json::from_str(&raw[0]).unwrap();
        assert_eq!(record.extra["nested"], json!("{\"k\":1}"));
    }

    #[tokio::test]
    async fn non_finite_satisfaction_rejected() {
        let err = log()
            .record_feedback("q", Intent::WebSearch, f64::NAN, 5, BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[tokio::test]
    async fn list_is_capped() {
        let config = StoreConfig {
            feedback_max_len: 2,
            ..Default::default()
        };
        let log = FeedbackLog::new(Arc::new(MemoryStore::new()), &config);
        for i in 0..4 {
            log.record_feedback(&format!("q{i}"), Intent::WebSearch, 1.0, 1, BTreeMap::new())
                .await
                .unwrap();
        }
        let stats = log.analyze_last(10).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.contains_key("q3"));
    }
}
