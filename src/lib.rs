//! Gnosis: query routing and web-grounded answer synthesis.
//!
//! Decides per query whether to answer from the model, read a named page or
//! research the web, and for web research produces an answer with
//! attributed sources:
//! Query → Intent → Expand + Policy → Search → Rerank → Fetch → Budget →
//! LLM synthesis → Quality / Consensus
//!
//! # Architecture
//!
//! - **Intent**: bilingual rule engine, optional LLM-assisted path, result
//!   cache and user corrections ([`intent`])
//! - **Expansion**: query variants scoped by a source-trust policy
//!   ([`expander`], [`policy`])
//! - **Search and fetch**: provider fallback chain and page extraction in the
//!   `gnosis-search` crate
//! - **Ranking and budget**: relevance reranking and token budget split
//!   ([`rerank`], [`budget`])
//! - **Validation**: cross-source claim consensus and answer quality
//!   ([`consensus`], [`quality`])
//! - **Orchestration**: the staged research call ([`research`])

pub mod budget;
pub mod config;
pub mod consensus;
pub mod error;
pub mod expander;
pub mod gnosis_dirs;
pub mod intent;
pub mod llm;
mod patterns;
pub mod policy;
pub mod quality;
pub mod rerank;
pub mod research;
pub mod store;

pub use budget::{BudgetAllocator, BudgetStrategy, Extract};
pub use config::GnosisConfig;
pub use consensus::{ConsensusReport, ConsensusValidator};
pub use error::{GnosisError, Result};
pub use expander::QueryExpander;
pub use intent::{ClassificationResult, Intent, IntentClassifier};
pub use llm::{HttpLlmClient, LlmClient, LlmRequest};
pub use policy::TrustPolicy;
pub use quality::{QualityReport, QualityValidator};
pub use rerank::{RankedResult, Reranker};
pub use research::{ResearchNote, ResearchOrchestrator, ResearchResponse};
pub use store::KvStore;
