//! Query intent classification.
//!
//! Decides per query between answering directly, reading a named page and
//! searching the web. Layers, in order: user corrections, the result
//! cache, the optional LLM-assisted path, the rule engine. The rule result
//! is always computed so it is ready as the fallback.

pub mod assisted;
pub mod feedback;
pub mod rules;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::IntentConfig;
use crate::llm::LlmClient;

pub use assisted::is_historical_price_query;
pub use feedback::{FeedbackLog, FeedbackRecord, PatternStats};

/// Routing decision for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    DirectAnswer,
    ReadUrl,
    WebSearch,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectAnswer => "DIRECT_ANSWER",
            Self::ReadUrl => "READ_URL",
            Self::WebSearch => "WEB_SEARCH",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIRECT_ANSWER" => Ok(Self::DirectAnswer),
            "READ_URL" => Ok(Self::ReadUrl),
            "WEB_SEARCH" => Ok(Self::WebSearch),
            other => Err(format!("unknown intent label: {other}")),
        }
    }
}

/// Which layer produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Rule,
    Llm,
    Cache,
    Heuristic,
}

/// Live-information family behind a web-search decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveType {
    Weather,
    Price,
    Sports,
    Schedule,
    News,
}

/// Outcome of [`IntentClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Human-readable trace of the deciding rule or fallback.
    pub reason: String,
    pub method: Method,
    pub latency_ms: u64,
    /// First URL found, for [`Intent::ReadUrl`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_type: Option<LiveType>,
}

/// Counters reported by [`IntentClassifier::stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierStats {
    pub llm_enabled: bool,
    pub total_classifications: u64,
    pub llm_successes: u64,
    pub fallbacks: u64,
    pub cache_hits: u64,
    pub cache_size: u64,
    pub confidence_threshold: f64,
}

impl ClassifierStats {
    fn rate(&self, n: u64) -> f64 {
        n as f64 / self.total_classifications.max(1) as f64
    }

    pub fn llm_success_rate(&self) -> f64 {
        self.rate(self.llm_successes)
    }

    pub fn fallback_rate(&self) -> f64 {
        self.rate(self.fallbacks)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        self.rate(self.cache_hits)
    }
}

/// Normalised cache key: trimmed, lowercased, single-spaced.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    llm_ok: AtomicU64,
    fallbacks: AtomicU64,
    cache_hits: AtomicU64,
}

/// Layered intent classifier with an injected cache.
pub struct IntentClassifier {
    config: IntentConfig,
    llm: Option<Arc<dyn LlmClient>>,
    feedback: Option<FeedbackLog>,
    cache: Cache<String, ClassificationResult>,
    counters: Counters,
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("config", &self.config)
            .field("llm", &self.llm.is_some())
            .field("feedback", &self.feedback.is_some())
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl IntentClassifier {
    /// Rule-only classifier with a process-lifetime cache.
    pub fn new(config: IntentConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.cache_capacity).build();
        Self {
            config,
            llm: None,
            feedback: None,
            cache,
            counters: Counters::default(),
        }
    }

    /// Enable the LLM-assisted path (still gated by `llm_enabled`).
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Consult user corrections before anything else.
    pub fn with_feedback(mut self, feedback: FeedbackLog) -> Self {
        self.feedback = Some(feedback);
        self
    }

    fn llm_active(&self) -> Option<&dyn LlmClient> {
        if self.config.llm_enabled {
            self.llm.as_deref()
        } else {
            None
        }
    }

    /// Classify `text`. Never fails.
    pub async fn classify(&self, text: &str) -> ClassificationResult {
        let started = Instant::now();
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let key = normalize_query(text);

        let mut result = self.resolve(text, &key).await;
        result.confidence = result.confidence.clamp(0.0, 1.0);
        result.latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            intent = result.intent.as_str(),
            confidence = result.confidence,
            method = ?result.method,
            reason = %result.reason,
            "classified query"
        );
        result
    }

    async fn resolve(&self, text: &str, key: &str) -> ClassificationResult {
        if let Some(corrected) = self.corrected(text).await {
            return corrected;
        }

        if !key.is_empty()
            && let Some(mut cached) = self.cache.get(key).await
        {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            cached.method = Method::Cache;
            return cached;
        }

        let rule = rules::classify(text);
        let result = match self.llm_active() {
            Some(llm) => self.assisted(llm, text, rule).await,
            None => rule,
        };
        if !key.is_empty() {
            self.cache.insert(key.to_owned(), result.clone()).await;
        }
        result
    }

    async fn corrected(&self, text: &str) -> Option<ClassificationResult> {
        let feedback = self.feedback.as_ref()?;
        match feedback.correction(text).await {
            Ok(Some(intent)) => Some(ClassificationResult {
                intent,
                confidence: 1.0,
                reason: "user_correction".into(),
                method: Method::Heuristic,
                latency_ms: 0,
                url: if intent == Intent::ReadUrl {
                    rules::extract_url(text)
                } else {
                    None
                },
                live_type: None,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "correction lookup failed");
                None
            }
        }
    }

    async fn assisted(
        &self,
        llm: &dyn LlmClient,
        text: &str,
        rule: ClassificationResult,
    ) -> ClassificationResult {
        if rule.intent == Intent::ReadUrl {
            return rule;
        }
        if assisted::is_historical_price_query(text) {
            return ClassificationResult {
                intent: Intent::DirectAnswer,
                confidence: 0.96,
                reason: "historical_price".into(),
                method: Method::Heuristic,
                latency_ms: 0,
                url: None,
                live_type: None,
            };
        }

        match assisted::ask(llm, text, rule.confidence, &self.config).await {
            assisted::Verdict::Accepted {
                intent,
                confidence,
                reason,
            } => {
                self.counters.llm_ok.fetch_add(1, Ordering::Relaxed);
                ClassificationResult {
                    intent,
                    confidence,
                    reason,
                    method: Method::Llm,
                    latency_ms: 0,
                    url: if intent == Intent::ReadUrl {
                        rules::extract_url(text)
                    } else {
                        None
                    },
                    live_type: if intent == Intent::WebSearch {
                        rule.live_type
                    } else {
                        None
                    },
                }
            }
            assisted::Verdict::Fallback(why) => {
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                ClassificationResult {
                    reason: format!("fallback:{why}|{}", rule.reason),
                    ..rule
                }
            }
        }
    }

    /// Current counters.
    pub async fn stats(&self) -> ClassifierStats {
        self.cache.run_pending_tasks().await;
        ClassifierStats {
            llm_enabled: self.llm_active().is_some(),
            total_classifications: self.counters.total.load(Ordering::Relaxed),
            llm_successes: self.counters.llm_ok.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_size: self.cache.entry_count(),
            confidence_threshold: self.config.llm_min_confidence,
        }
    }

    /// Drop every cached classification and reset the hit counter.
    /// Returns the number of entries dropped.
    pub async fn clear_cache(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        let dropped = self.cache.entry_count();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.counters.cache_hits.store(0, Ordering::Relaxed);
        dropped
    }
}
