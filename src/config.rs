//! Configuration for the routing and research pipeline.
//!
//! Loaded from a TOML document whose sections all default, so an empty file
//! (or no file) yields a working configuration. A file that fails to parse
//! or validate is fatal at startup.

use std::collections::BTreeMap;
use std::path::Path;

use gnosis_search::SearchConfig;
use serde::{Deserialize, Serialize};

use crate::budget::BudgetStrategy;
use crate::error::{GnosisError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GnosisConfig {
    /// Intent classifier settings.
    pub intent: IntentConfig,
    /// Language-model endpoint settings.
    pub llm: LlmConfig,
    /// Research orchestrator settings.
    pub research: ResearchConfig,
    /// Token estimate tunables.
    pub budget: BudgetConfig,
    /// Answer quality gate.
    pub quality: QualityConfig,
    /// Source consensus settings.
    pub consensus: ConsensusConfig,
    /// Feedback/correction store.
    pub store: StoreConfig,
    /// Search providers and page fetching.
    pub search: SearchConfig,
}

/// Intent classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Ask the LLM before falling back to rules.
    pub llm_enabled: bool,
    /// LLM answers below this confidence fall back to rules.
    pub llm_min_confidence: f64,
    /// Budget for the classification call.
    pub llm_timeout_ms: u64,
    /// Completion cap for the classification call.
    pub llm_max_tokens: u32,
    /// Maximum cached classifications.
    pub cache_capacity: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            llm_enabled: false,
            llm_min_confidence: 0.75,
            llm_timeout_ms: 3_000,
            llm_max_tokens: 200,
            cache_capacity: 2_048,
        }
    }
}

/// OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Direct endpoint base URL.
    pub endpoint: Option<String>,
    /// Tunnel endpoint; preferred over `endpoint` when both are set.
    pub tunnel_endpoint: Option<String>,
    /// Model name sent with each request.
    pub model: String,
    /// Bearer token, if the endpoint requires one.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Sampling temperature for synthesis.
    pub temperature: f64,
    /// Completion cap for synthesis.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            tunnel_endpoint: None,
            model: "local-model".to_owned(),
            api_key: None,
            timeout_ms: 30_000,
            temperature: 0.2,
            max_tokens: 900,
        }
    }
}

impl LlmConfig {
    /// The endpoint base to use: tunnel first, then direct. Blank values
    /// count as unset.
    pub fn resolved_endpoint(&self) -> Option<&str> {
        [&self.tunnel_endpoint, &self.endpoint]
            .into_iter()
            .filter_map(|e| e.as_deref())
            .map(str::trim)
            .find(|e| !e.is_empty())
    }

    /// Full chat-completions URL for the resolved endpoint.
    pub fn chat_url(&self) -> Option<String> {
        self.resolved_endpoint().map(chat_completions_url)
    }

    /// Overlay `TUNNEL_ENDPOINT`, `LLM_ENDPOINT`, `LLM_MODEL` and
    /// `LLM_API_KEY` from an environment-like lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("TUNNEL_ENDPOINT") {
            self.tunnel_endpoint = Some(v);
        }
        if let Some(v) = get("LLM_ENDPOINT") {
            self.endpoint = Some(v);
        }
        if let Some(v) = get("LLM_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("LLM_API_KEY") {
            self.api_key = Some(v);
        }
    }
}

/// Build a chat-completions URL from an endpoint base.
///
/// Bases already ending in `/chat/completions` are kept; a trailing `/v1`
/// gets only `/chat/completions`; anything else gets `/v1/chat/completions`.
pub fn chat_completions_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_owned()
    } else if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

/// Research orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Search the web at all. When off, research calls answer with
    /// `web_search_unavailable`.
    pub web_search: bool,
    /// Documents fetched per request.
    pub max_docs: usize,
    /// Per-fetch timeout.
    pub fetch_timeout_ms: u64,
    /// Token budget shared by all extracts.
    pub token_budget: usize,
    /// Search results requested from the chain.
    pub search_results: usize,
    /// Results fetched from the same registrable domain.
    pub max_per_domain: usize,
    /// Deadline for a whole research call.
    pub deadline_ms: u64,
    /// Candidates kept after reranking.
    pub rerank_top_k: usize,
    /// Budget split across extracts.
    pub strategy: BudgetStrategy,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            web_search: true,
            max_docs: 3,
            fetch_timeout_ms: 6_000,
            token_budget: 1_500,
            search_results: 8,
            max_per_domain: 2,
            deadline_ms: 25_000,
            rerank_top_k: 8,
            strategy: BudgetStrategy::Proportional,
        }
    }
}

/// Token estimate tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Characters per token for prose.
    pub chars_per_token: usize,
    /// Characters per token for code-like text.
    pub code_chars_per_token: usize,
    /// Bracket density above which text counts as code-like.
    pub code_density_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            code_chars_per_token: 3,
            code_density_threshold: 0.05,
        }
    }
}

/// Answer quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum answer length in characters.
    pub min_length: usize,
    /// Minimum sentence count.
    pub min_sentences: usize,
    /// Minimum fact-like pattern matches.
    pub min_facts: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_length: 80,
            min_sentences: 2,
            min_facts: 2,
        }
    }
}

/// Per-claim-type weight override for one domain. Unset types keep the
/// built-in weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainWeightOverride {
    /// Weight for odds claims.
    pub odds: Option<f64>,
    /// Weight for score claims.
    pub scores: Option<f64>,
    /// Weight for date claims.
    pub dates: Option<f64>,
}

/// Source consensus configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Overrides merged over the built-in domain table, keyed by registrable domain.
    pub domain_weights: BTreeMap<String, DomainWeightOverride>,
    /// Confidence at or above which a report is validated.
    pub threshold: f64,
    /// Odds within this distance of the majorant agree.
    pub odds_tolerance: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            domain_weights: BTreeMap::new(),
            threshold: 0.70,
            odds_tolerance: 0.03,
        }
    }
}

/// Feedback/correction store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Days a correction overrides classification.
    pub correction_ttl_days: u32,
    /// Feedback records kept.
    pub feedback_max_len: usize,
    /// JSON snapshot file; in-memory only when unset.
    pub path: Option<std::path::PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            correction_ttl_days: 30,
            feedback_max_len: 5_000,
            path: None,
        }
    }
}

fn ensure(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(GnosisError::Config(message.to_owned()))
    }
}

fn unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl GnosisConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`GnosisError::Config`] on parse or validation failure.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| GnosisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default config file when it exists,
    /// else defaults. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file is unreadable or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = crate::gnosis_dirs::config_file();
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if default_path.is_file() => Self::from_file(&default_path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables on the LLM and search sections.
    pub fn apply_env(&mut self) {
        self.llm.apply_overrides(|k| std::env::var(k).ok());
        self.search.apply_env();
    }

    /// Check every section for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`GnosisError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        ensure(
            unit_interval(self.intent.llm_min_confidence),
            "intent.llm_min_confidence must be within [0, 1]",
        )?;
        ensure(self.intent.llm_timeout_ms > 0, "intent.llm_timeout_ms must be greater than 0")?;
        ensure(self.llm.timeout_ms > 0, "llm.timeout_ms must be greater than 0")?;
        ensure(
            (0.0..=2.0).contains(&self.llm.temperature),
            "llm.temperature must be within [0, 2]",
        )?;
        ensure(self.llm.max_tokens > 0, "llm.max_tokens must be greater than 0")?;
        if let Some(endpoint) = self.llm.resolved_endpoint() {
            url::Url::parse(endpoint).map_err(|e| {
                GnosisError::Config(format!("invalid LLM endpoint `{endpoint}`: {e}"))
            })?;
        }
        ensure(self.research.max_docs > 0, "research.max_docs must be greater than 0")?;
        ensure(
            self.research.fetch_timeout_ms > 0,
            "research.fetch_timeout_ms must be greater than 0",
        )?;
        ensure(self.research.token_budget > 0, "research.token_budget must be greater than 0")?;
        ensure(
            self.research.search_results > 0,
            "research.search_results must be greater than 0",
        )?;
        ensure(
            self.research.max_per_domain > 0,
            "research.max_per_domain must be greater than 0",
        )?;
        ensure(self.research.deadline_ms > 0, "research.deadline_ms must be greater than 0")?;
        ensure(self.research.rerank_top_k > 0, "research.rerank_top_k must be greater than 0")?;
        ensure(
            self.budget.chars_per_token > 0 && self.budget.code_chars_per_token > 0,
            "budget chars per token must be greater than 0",
        )?;
        ensure(
            unit_interval(self.budget.code_density_threshold),
            "budget.code_density_threshold must be within [0, 1]",
        )?;
        ensure(
            unit_interval(self.consensus.threshold),
            "consensus.threshold must be within [0, 1]",
        )?;
        ensure(
            self.consensus.odds_tolerance >= 0.0,
            "consensus.odds_tolerance must not be negative",
        )?;
        for (domain, weights) in &self.consensus.domain_weights {
            let all_positive = [weights.odds, weights.scores, weights.dates]
                .into_iter()
                .flatten()
                .all(|w| w > 0.0);
            if !all_positive {
                return Err(GnosisError::Config(format!(
                    "consensus.domain_weights.{domain} must be positive"
                )));
            }
        }
        ensure(
            self.store.feedback_max_len > 0,
            "store.feedback_max_len must be greater than 0",
        )?;
        self.search.validate()?;
        Ok(())
    }
}
