//! Web research orchestrator.
//!
//! One call runs `SEARCH -> FETCH -> SYNTHESIS -> VALIDATE`. Every stage
//! can end the call early with a terminal [`ResearchNote`]; no stage error
//! escapes. A caller deadline bounds the whole call and each stage gets
//! whatever is left of it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use gnosis_search::chain::url_normalize::{dedup_key, registrable_domain};
use gnosis_search::{ContentFetcher, PageFetcher, SearchChain, SearchResult};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::budget::{BudgetAllocator, Extract};
use crate::config::{GnosisConfig, ResearchConfig};
use crate::consensus::{ConsensusReport, ConsensusValidator};
use crate::error::Result;
use crate::expander::QueryExpander;
use crate::llm::{HttpLlmClient, LlmClient, LlmRequest};
use crate::policy::TrustPolicy;
use crate::quality::{QualityReport, QualityValidator, round3};
use crate::rerank::{RankedResult, Reranker};

/// Query variants searched before giving up on reaching the result target.
const MAX_SEARCH_VARIANTS: usize = 4;

/// Sources listed when pages were found but none could be read.
const UNREADABLE_SOURCES: usize = 3;

/// Query words shorter than this are ignored by the keyword coverage score.
const MIN_KEYWORD_CHARS: usize = 4;

const EMPTY_SERP_ANSWER: &str = "I could not find reliable results for this request with the \
search engines available. Try rephrasing with more detail, such as a date, a place, a \
competition or a reference site.";

const NO_EXTRACTS_ANSWER: &str = "I found pages that look relevant but could not extract their \
content (timeout or read error). The links below may still cover the topic.";

const UNAVAILABLE_ANSWER: &str = "Web search is not configured, so I cannot research this \
request on the web.";

const SYNTHESIS_FAILED_ANSWER: &str = "I could not generate a summary from the extracts. The \
linked sources contain information relevant to the question.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You answer questions using only the web extracts you are \
given. Be concrete: report numbers, dates and units exactly as the extracts state them. If the \
extracts lack the exact detail asked for, summarise what they do say and name what is missing. \
Never reply only that the sources lack the information, and never tell the reader to consult \
the sources or open the links instead of answering. Mention disagreements between sources \
briefly. Answer in the language of the question, in 3 to 8 sentences, and end with one line \
'Sources: URL1, URL2, URL3' listing at most three URLs.";

/// Terminal outcome of a research call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchNote {
    Ok,
    EmptySerp,
    NoExtracts,
    WebSearchUnavailable,
}

/// Pipeline stage recorded in the step trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Search,
    Fetch,
    Synthesis,
}

/// One entry of the step trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position in the trace.
    pub step: usize,
    pub stage: Stage,
    pub query: String,
    pub results_count: usize,
    pub docs_read: usize,
    /// Share of this step's results not seen in earlier steps. Search steps only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novelty: Option<f64>,
    /// This step ended its stage before the remaining work ran.
    pub early_exit: bool,
    pub elapsed_ms: u64,
}

/// An attributed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Result of [`ResearchOrchestrator::research`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub steps: Vec<Step>,
    pub total_steps: usize,
    pub note: ResearchNote,
    /// Synthesis quality, when an answer was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
    /// Cross-source agreement over the extracts read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusReport>,
    /// Estimate of how well the extracts cover the query, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_quality: Option<f64>,
}

impl ResearchResponse {
    fn terminal(answer: &str, note: ResearchNote, sources: Vec<Source>, steps: Vec<Step>) -> Self {
        Self {
            answer: answer.to_owned(),
            sources,
            total_steps: steps.len(),
            steps,
            note,
            quality: None,
            consensus: None,
            research_quality: None,
        }
    }
}

/// `0.4·min(n/5, 1) + 0.3·min(domains/3, 1) + 0.3·keyword coverage`, where
/// coverage counts query words (of at least four characters) found in each
/// extract over every (word, extract) pair.
pub fn estimate_research_quality(extracts: &[Extract], query: &str) -> f64 {
    if extracts.is_empty() {
        return 0.0;
    }
    let count_score = (extracts.len() as f64 / 5.0).min(1.0);
    let domains: BTreeSet<String> = extracts.iter().map(|e| registrable_domain(&e.url)).collect();
    let diversity_score = (domains.len() as f64 / 3.0).min(1.0);

    let lowered = query.to_lowercase();
    let words: BTreeSet<&str> = lowered.split_whitespace().collect();
    let hits: usize = extracts
        .iter()
        .map(|e| {
            let text = e.text.to_lowercase();
            words
                .iter()
                .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS && text.contains(*w))
                .count()
        })
        .sum();
    let possible = words.len().max(1) * extracts.len();
    let keyword_score = (hits as f64 / possible as f64).min(1.0);

    round3(0.4 * count_score + 0.3 * diversity_score + 0.3 * keyword_score)
}

/// Context blocks handed to the model, one per extract.
pub fn format_context(extracts: &[Extract]) -> String {
    extracts
        .iter()
        .map(|e| format!("### {}\nURL: {}\n\n{}", e.title, e.url, e.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Synthesis request for `query` over `extracts`.
pub fn synthesis_request(
    query: &str,
    extracts: &[Extract],
    temperature: f64,
    max_tokens: u32,
) -> LlmRequest {
    let user_prompt = format!(
        "QUESTION: {query}\n\n=== WEB EXTRACTS (use only this information) ===\n{}\n",
        format_context(extracts)
    );
    LlmRequest {
        system_prompt: SYNTHESIS_SYSTEM_PROMPT.to_owned(),
        user_prompt,
        temperature,
        max_tokens,
    }
}

/// Keep at most `max_per_domain` candidates per registrable domain, then
/// the first `max_docs`.
fn cap_per_domain(
    ranked: Vec<RankedResult>,
    max_per_domain: usize,
    max_docs: usize,
) -> Vec<RankedResult> {
    let mut per_domain: HashMap<String, usize> = HashMap::new();
    ranked
        .into_iter()
        .filter(|r| {
            let seen = per_domain.entry(registrable_domain(&r.result.url)).or_default();
            *seen += 1;
            *seen <= max_per_domain
        })
        .take(max_docs)
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn source_of(result: &SearchResult) -> Source {
    Source {
        url: result.url.clone(),
        title: if result.title.trim().is_empty() {
            result.url.clone()
        } else {
            result.title.clone()
        },
        image: None,
    }
}

/// Composes expansion, search, reranking, fetching, budgeting, synthesis
/// and validation.
pub struct ResearchOrchestrator {
    config: ResearchConfig,
    synthesis_temperature: f64,
    synthesis_max_tokens: u32,
    policy: Arc<TrustPolicy>,
    expander: QueryExpander,
    chain: Option<Arc<SearchChain>>,
    fetcher: Arc<dyn ContentFetcher>,
    reranker: Reranker,
    budget: BudgetAllocator,
    llm: Option<Arc<dyn LlmClient>>,
    quality: QualityValidator,
    consensus: ConsensusValidator,
}

impl std::fmt::Debug for ResearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchOrchestrator")
            .field("config", &self.config)
            .field("web_search", &self.chain.is_some())
            .field("llm", &self.llm.is_some())
            .finish_non_exhaustive()
    }
}

impl ResearchOrchestrator {
    /// Orchestrator over explicit search and fetch dependencies, with the
    /// built-in trust policy, lexical reranking and no synthesis model.
    pub fn new(
        config: &GnosisConfig,
        chain: Option<Arc<SearchChain>>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            config: config.research.clone(),
            synthesis_temperature: config.llm.temperature,
            synthesis_max_tokens: config.llm.max_tokens,
            policy: Arc::new(TrustPolicy::builtin()),
            expander: QueryExpander::new(),
            chain: chain.filter(|_| config.research.web_search),
            fetcher,
            reranker: Reranker::lexical(),
            budget: BudgetAllocator::new(config.budget.clone()),
            llm: None,
            quality: QualityValidator::new(config.quality.clone()),
            consensus: ConsensusValidator::new(&config.consensus),
        }
    }

    /// Orchestrator with the standard provider chain, the HTTP page fetcher
    /// and the configured LLM endpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid search config and an
    /// HTTP error if the client cannot be built.
    pub fn from_config(config: &GnosisConfig, policy: TrustPolicy) -> Result<Self> {
        let chain = SearchChain::from_config(&config.search)?;
        let fetcher = PageFetcher::from_config(&config.search)?
            .with_timeout(Duration::from_millis(config.research.fetch_timeout_ms));
        let mut orchestrator = Self::new(config, Some(Arc::new(chain)), Arc::new(fetcher))
            .with_policy(Arc::new(policy));
        if let Some(llm) = HttpLlmClient::from_config(&config.llm) {
            orchestrator = orchestrator.with_llm(Arc::new(llm));
        }
        Ok(orchestrator)
    }

    pub fn with_policy(mut self, policy: Arc<TrustPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Research `query` under the configured deadline.
    pub async fn research(&self, query: &str) -> ResearchResponse {
        self.research_with_deadline(query, Duration::from_millis(self.config.deadline_ms))
            .await
    }

    /// Research `query`; stages still running when `budget` runs out are
    /// abandoned and count as contributing nothing.
    pub async fn research_with_deadline(&self, query: &str, budget: Duration) -> ResearchResponse {
        let started = Instant::now();
        let deadline = started + budget;
        let query = query.trim();

        let Some(chain) = &self.chain else {
            info!("research requested but web search is unavailable");
            return ResearchResponse::terminal(
                UNAVAILABLE_ANSWER,
                ResearchNote::WebSearchUnavailable,
                Vec::new(),
                Vec::new(),
            );
        };

        let mut steps = Vec::new();

        // SEARCH
        let domain_policy = self.policy.pick(query);
        let variants = self.expander.expand(query, &domain_policy);
        let found = self.gather(chain, &variants, deadline, &mut steps).await;
        let ranked = TrustPolicy::rank_results(found, &domain_policy);
        if ranked.is_empty() {
            info!(steps = steps.len(), "no search results");
            return ResearchResponse::terminal(
                EMPTY_SERP_ANSWER,
                ResearchNote::EmptySerp,
                Vec::new(),
                steps,
            );
        }

        let reranked = self.reranker.rerank(query, ranked, self.config.rerank_top_k);
        let candidates = cap_per_domain(reranked, self.config.max_per_domain, self.config.max_docs);

        // FETCH
        let fetch_started = Instant::now();
        let (extracts, images) = self.fetch(&candidates, deadline).await;
        steps.push(Step {
            step: steps.len() + 1,
            stage: Stage::Fetch,
            query: query.to_owned(),
            results_count: candidates.len(),
            docs_read: extracts.len(),
            novelty: None,
            early_exit: extracts.is_empty(),
            elapsed_ms: elapsed_ms(fetch_started),
        });
        if extracts.is_empty() {
            info!(candidates = candidates.len(), "no page could be read");
            let sources = candidates
                .iter()
                .take(UNREADABLE_SOURCES)
                .map(|c| source_of(&c.result))
                .collect();
            return ResearchResponse::terminal(
                NO_EXTRACTS_ANSWER,
                ResearchNote::NoExtracts,
                sources,
                steps,
            );
        }

        let extracts = self.budget.allocate(extracts, self.config.token_budget, self.config.strategy);
        let sources: Vec<Source> = extracts
            .iter()
            .map(|e| Source {
                url: e.url.clone(),
                title: e.title.clone(),
                image: images.get(&e.url).cloned().flatten(),
            })
            .collect();

        // SYNTHESIS
        let synthesis_started = Instant::now();
        let synthesized = self.synthesize(query, &extracts, deadline).await;
        let answer = synthesized
            .clone()
            .unwrap_or_else(|| SYNTHESIS_FAILED_ANSWER.to_owned());

        // VALIDATE
        let quality = synthesized.as_deref().map(|a| self.quality.validate(a));
        let consensus = self.consensus.validate(&extracts);
        let research_quality = estimate_research_quality(&extracts, query);

        steps.push(Step {
            step: steps.len() + 1,
            stage: Stage::Synthesis,
            query: query.to_owned(),
            results_count: candidates.len(),
            docs_read: extracts.len(),
            novelty: None,
            early_exit: synthesized.is_none(),
            elapsed_ms: elapsed_ms(synthesis_started),
        });
        info!(
            sources = sources.len(),
            quality_valid = quality.as_ref().map(|q| q.valid),
            consensus_confidence = consensus.confidence,
            research_quality,
            elapsed_ms = elapsed_ms(started),
            "research complete"
        );

        ResearchResponse {
            answer,
            sources,
            total_steps: steps.len(),
            steps,
            note: ResearchNote::Ok,
            quality,
            consensus: Some(consensus),
            research_quality: Some(research_quality),
        }
    }

    /// Search variants in priority order until enough unique results have
    /// been gathered, the variant cap is hit or the deadline passes.
    async fn gather(
        &self,
        chain: &SearchChain,
        variants: &[String],
        deadline: Instant,
        steps: &mut Vec<Step>,
    ) -> Vec<SearchResult> {
        let want = self.config.search_results;
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for variant in variants.iter().take(MAX_SEARCH_VARIANTS) {
            let started = Instant::now();
            let Ok(batch) = timeout_at(deadline, chain.search(variant, want)).await else {
                warn!("research deadline reached during search");
                break;
            };
            let returned = batch.len();
            let before = results.len();
            for result in batch {
                if seen.insert(dedup_key(&result.url)) {
                    results.push(result);
                }
            }
            let added = results.len() - before;
            let enough = results.len() >= want;
            tracing::trace!(variant = %variant, returned, added, "variant searched");
            steps.push(Step {
                step: steps.len() + 1,
                stage: Stage::Search,
                query: variant.clone(),
                results_count: returned,
                docs_read: 0,
                novelty: Some(if returned == 0 {
                    0.0
                } else {
                    round3(added as f64 / returned as f64)
                }),
                early_exit: enough,
                elapsed_ms: elapsed_ms(started),
            });
            if enough {
                break;
            }
        }
        results
    }

    /// Fetch candidates concurrently, each bounded by the earlier of its own
    /// timeout and the research deadline. Failures and timeouts are dropped.
    /// Also returns each read page's image by URL.
    async fn fetch(
        &self,
        candidates: &[RankedResult],
        deadline: Instant,
    ) -> (Vec<Extract>, HashMap<String, Option<String>>) {
        let per_fetch = Duration::from_millis(self.config.fetch_timeout_ms);
        let fetches = candidates.iter().map(|candidate| async move {
            let url = candidate.result.url.as_str();
            let cutoff = deadline.min(Instant::now() + per_fetch);
            match timeout_at(cutoff, self.fetcher.fetch(url)).await {
                Ok(Ok(page)) if !page.text.trim().is_empty() => {
                    let title = [page.title.as_str(), candidate.result.title.as_str(), url]
                        .into_iter()
                        .map(str::trim)
                        .find(|t| !t.is_empty())
                        .unwrap_or(url)
                        .to_owned();
                    let extract = Extract::new(url, title, page.text)
                        .with_score(candidate.rerank_score);
                    Some((extract, page.image))
                }
                Ok(Ok(_)) => {
                    debug!(url, "page had no text");
                    None
                }
                Ok(Err(e)) => {
                    debug!(url, error = %e, "fetch failed");
                    None
                }
                Err(_) if cutoff == deadline => {
                    warn!(url, "research deadline reached during fetch");
                    None
                }
                Err(_) => {
                    debug!(url, timeout_ms = self.config.fetch_timeout_ms, "fetch timed out");
                    None
                }
            }
        });

        let done = join_all(fetches).await;
        let mut images = HashMap::new();
        let extracts = done
            .into_iter()
            .flatten()
            .map(|(extract, image)| {
                images.insert(extract.url.clone(), image);
                extract
            })
            .collect();
        (extracts, images)
    }

    async fn synthesize(
        &self,
        query: &str,
        extracts: &[Extract],
        deadline: Instant,
    ) -> Option<String> {
        let llm = self.llm.as_deref()?;
        let request = synthesis_request(
            query,
            extracts,
            self.synthesis_temperature,
            self.synthesis_max_tokens,
        );
        match timeout_at(deadline, llm.complete(&request)).await {
            Ok(Ok(answer)) if !answer.trim().is_empty() => Some(answer.trim().to_owned()),
            Ok(Ok(_)) => {
                warn!("synthesis returned an empty answer");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, code = e.code(), "synthesis failed");
                None
            }
            Err(_) => {
                warn!("research deadline reached during synthesis");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use gnosis_search::ProviderKind;

    use super::*;

    fn extract(url: &str, text: &str) -> Extract {
        Extract::new(url, "t", text)
    }

    fn ranked(url: &str) -> RankedResult {
        RankedResult {
            result: SearchResult::new(url, "t", "", ProviderKind::DuckDuckGoPost),
            rerank_score: 0.5,
        }
    }

    #[test]
    fn context_block_format() {
        let ctx = format_context(&[
            Extract::new("https://a.com/1", "A", "alpha"),
            Extract::new("https://b.com/2", "B", "beta"),
        ]);
        assert_eq!(
            ctx,
            "### A\nURL: https://a.com/1\n\nalpha\n\n### B\nURL: https://b.com/2\n\nbeta"
        );
    }

    #[test]
    fn quality_estimate_components() {
        assert_eq!(estimate_research_quality(&[], "q"), 0.0);
        let extracts = vec![
            extract("https://a.com/x", "bitcoin climbs"),
            extract("https://b.org/y", "nothing relevant"),
        ];
        // count 2/5, domains 2/3, coverage: "bitcoin" hit once, "price" never,
        // over 2 words x 2 extracts
        let expected = 0.4 * 0.4 + 0.3 * (2.0 / 3.0) + 0.3 * 0.25;
        let got = estimate_research_quality(&extracts, "bitcoin price");
        assert!((got - expected).abs() < 1e-3, "{got} vs {expected}");
    }

    #[test]
    fn per_domain_cap_then_doc_cap() {
        let kept = cap_per_domain(
            vec![
                ranked("https://a.com/1"),
                ranked("https://www.a.com/2"),
                ranked("https://news.a.com/3"),
                ranked("https://b.com/1"),
                ranked("https://c.com/1"),
            ],
            2,
            3,
        );
        let urls: Vec<_> = kept.iter().map(|r| r.result.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/1", "https://www.a.com/2", "https://b.com/1"]);
    }

    #[test]
    fn synthesis_request_carries_context() {
        let req = synthesis_request("q?", &[Extract::new("https://a.com", "A", "x")], 0.2, 900);
        assert!(req.user_prompt.starts_with("QUESTION: q?"));
        assert!(req.user_prompt.contains("### A\nURL: https://a.com"));
        assert!(req.system_prompt.contains("Sources:"));
        assert_eq!(req.max_tokens, 900);
    }

    #[test]
    fn note_serialization() {
        assert_eq!(
            serde_json::to_string(&ResearchNote::WebSearchUnavailable).unwrap(),
            "\"web_search_unavailable\""
        );
        assert_eq!(serde_json::to_string(&ResearchNote::EmptySerp).unwrap(), "\"empty_serp\"");
    }
}
