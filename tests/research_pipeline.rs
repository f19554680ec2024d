//! End-to-end tests for routing and research.
//!
//! Search providers and page fetches are scripted in-process; the synthesis
//! model is a local mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gnosis::config::IntentConfig;
use gnosis::intent::Method;
use gnosis::research::Stage;
use gnosis::{
    GnosisConfig, HttpLlmClient, Intent, IntentClassifier, QualityValidator, ResearchNote,
    ResearchOrchestrator,
};
use gnosis_search::{
    ContentFetcher, PageContent, ProviderKind, SearchCache, SearchChain, SearchError,
    SearchProvider, SearchResult,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUERY: &str = "history of roman aqueduct construction";

struct Fixed(Vec<&'static str>);

#[async_trait]
impl SearchProvider for Fixed {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bing
    }

    async fn search(&self, _query: &str, n: usize) -> Result<Vec<SearchResult>, SearchError> {
        Ok(self
            .0
            .iter()
            .take(n)
            .map(|u| {
                SearchResult::new(
                    *u,
                    "Roman aqueduct construction",
                    "How the roman aqueducts were built",
                    ProviderKind::Bing,
                )
            })
            .collect())
    }
}

struct Failing;

#[async_trait]
impl SearchProvider for Failing {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DuckDuckGoPost
    }

    async fn search(&self, _query: &str, _n: usize) -> Result<Vec<SearchResult>, SearchError> {
        Err(SearchError::Provider("blocked".into()))
    }
}

#[derive(Default)]
struct Pages(HashMap<&'static str, &'static str>);

impl Pages {
    fn with(mut self, url: &'static str, text: &'static str) -> Self {
        self.0.insert(url, text);
        self
    }
}

#[async_trait]
impl ContentFetcher for Pages {
    async fn fetch(&self, url: &str) -> gnosis_search::Result<PageContent> {
        let text = self
            .0
            .get(url)
            .ok_or_else(|| SearchError::Http(format!("HTTP 404 for {url}")))?;
        Ok(PageContent {
            url: url.to_owned(),
            title: String::new(),
            text: (*text).to_owned(),
            word_count: text.split_whitespace().count(),
            image: Some(format!("{url}/cover.jpg")),
        })
    }
}

/// Serves `pages` but never finishes loading `stalled`.
struct Stalling {
    pages: Pages,
    stalled: &'static str,
}

#[async_trait]
impl ContentFetcher for Stalling {
    async fn fetch(&self, url: &str) -> gnosis_search::Result<PageContent> {
        if url == self.stalled {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.pages.fetch(url).await
    }
}

fn chain(providers: Vec<Box<dyn SearchProvider>>) -> Arc<SearchChain> {
    Arc::new(SearchChain::new(
        providers,
        SearchCache::disabled(),
        Duration::from_secs(2),
        20,
    ))
}

fn found() -> Arc<SearchChain> {
    chain(vec![Box::new(Fixed(vec![
        "https://alpha.example/aqueducts",
        "https://beta.example/roman-construction",
        "https://gamma.example/history",
    ]))])
}

fn pages() -> Pages {
    Pages::default()
        .with(
            "https://alpha.example/aqueducts",
            "The Aqua Appia, completed in 312 BC, was the first roman aqueduct.\n\
             Its construction used gravity and a gradient of about 10 metres over 16 km.",
        )
        .with(
            "https://beta.example/roman-construction",
            "By 226 AD eleven aqueducts supplied Rome.\n\
             Construction relied on arches, tunnels and lead pipes.",
        )
}

async fn llm_server(status: u16, content: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .mount(&server)
        .await;
    server
}

fn llm(server: &MockServer) -> Arc<HttpLlmClient> {
    Arc::new(HttpLlmClient::new(
        format!("{}/v1/chat/completions", server.uri()),
        "test-model",
    ))
}

#[tokio::test]
async fn research_reads_pages_and_synthesizes() {
    let answer = "The first roman aqueduct, the Aqua Appia, was completed in 312 BC. \
                  By 226 AD eleven aqueducts supplied Rome, built with arches and tunnels. \
                  Sources: https://alpha.example/aqueducts, https://beta.example/roman-construction";
    let server = llm_server(200, answer).await;
    let orchestrator =
        ResearchOrchestrator::new(&GnosisConfig::default(), Some(found()), Arc::new(pages()))
            .with_llm(llm(&server));

    let response = orchestrator.research(QUERY).await;

    assert_eq!(response.note, ResearchNote::Ok);
    assert_eq!(response.answer, answer);
    let urls: Vec<&str> = response.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.contains(&"https://alpha.example/aqueducts"));
    assert!(!urls.contains(&"https://gamma.example/history"));
    assert!(response.sources.iter().all(|s| s.image.is_some()));
    assert!(response.sources.iter().all(|s| !s.title.is_empty()));

    assert_eq!(response.total_steps, response.steps.len());
    assert_eq!(response.steps.first().unwrap().stage, Stage::Search);
    assert_eq!(response.steps.last().unwrap().stage, Stage::Synthesis);
    let fetch = response
        .steps
        .iter()
        .find(|s| s.stage == Stage::Fetch)
        .unwrap();
    assert_eq!(fetch.docs_read, 2);
    for (i, step) in response.steps.iter().enumerate() {
        assert_eq!(step.step, i + 1);
    }

    let quality = response.quality.unwrap();
    assert!(quality.facts_count >= 2);
    let research_quality = response.research_quality.unwrap();
    assert!((0.0..=1.0).contains(&research_quality));
    assert!(response.consensus.is_some());
}

#[tokio::test]
async fn failing_providers_give_empty_serp() {
    let orchestrator = ResearchOrchestrator::new(
        &GnosisConfig::default(),
        Some(chain(vec![Box::new(Failing), Box::new(Failing)])),
        Arc::new(pages()),
    );

    let response = orchestrator.research(QUERY).await;

    assert_eq!(response.note, ResearchNote::EmptySerp);
    assert!(response.sources.is_empty());
    assert!(!response.answer.is_empty());
    assert!(response.steps.iter().all(|s| s.stage == Stage::Search));
    assert!(response.quality.is_none());
}

#[tokio::test]
async fn unreadable_pages_give_no_extracts_with_links() {
    let orchestrator = ResearchOrchestrator::new(
        &GnosisConfig::default(),
        Some(found()),
        Arc::new(Pages::default()),
    );

    let response = orchestrator.research(QUERY).await;

    assert_eq!(response.note, ResearchNote::NoExtracts);
    assert!(!response.sources.is_empty());
    assert!(response.sources.len() <= 3);
    assert!(response.sources.iter().all(|s| s.image.is_none()));
    assert_eq!(response.steps.last().unwrap().stage, Stage::Fetch);
    assert!(response.steps.last().unwrap().early_exit);
}

#[tokio::test]
async fn deadline_keeps_pages_already_read() {
    let mut config = GnosisConfig::default();
    config.research.deadline_ms = 500;
    config.research.fetch_timeout_ms = 10_000;
    let fetcher = Stalling {
        pages: pages(),
        stalled: "https://gamma.example/history",
    };
    let orchestrator = ResearchOrchestrator::new(&config, Some(found()), Arc::new(fetcher));

    let started = std::time::Instant::now();
    let response = orchestrator.research(QUERY).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(response.note, ResearchNote::Ok);
    let urls: Vec<&str> = response.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls.len(), 2);
    assert!(!urls.contains(&"https://gamma.example/history"));
    let fetch = response
        .steps
        .iter()
        .find(|s| s.stage == Stage::Fetch)
        .unwrap();
    assert_eq!(fetch.results_count, 3);
    assert_eq!(fetch.docs_read, 2);
}

#[tokio::test]
async fn only_search_steps_report_novelty() {
    let response =
        ResearchOrchestrator::new(&GnosisConfig::default(), Some(found()), Arc::new(pages()))
            .research(QUERY)
            .await;

    for step in &response.steps {
        assert_eq!(step.novelty.is_some(), step.stage == Stage::Search);
    }
    let json = serde_json::to_value(response.steps.last().unwrap()).unwrap();
    assert!(json.get("novelty").is_none());
}

#[tokio::test]
async fn missing_chain_is_unavailable() {
    let response = ResearchOrchestrator::new(&GnosisConfig::default(), None, Arc::new(pages()))
        .research(QUERY)
        .await;

    assert_eq!(response.note, ResearchNote::WebSearchUnavailable);
    assert!(response.sources.is_empty());
    assert_eq!(response.total_steps, 0);
}

#[tokio::test]
async fn disabled_web_search_is_unavailable() {
    let mut config = GnosisConfig::default();
    config.research.web_search = false;

    let response = ResearchOrchestrator::new(&config, Some(found()), Arc::new(pages()))
        .research(QUERY)
        .await;

    assert_eq!(response.note, ResearchNote::WebSearchUnavailable);
}

#[tokio::test]
async fn synthesis_failure_keeps_sources() {
    let server = llm_server(500, "").await;
    let orchestrator =
        ResearchOrchestrator::new(&GnosisConfig::default(), Some(found()), Arc::new(pages()))
            .with_llm(llm(&server));

    let response = orchestrator.research(QUERY).await;

    assert_eq!(response.note, ResearchNote::Ok);
    assert!(response.answer.contains("could not generate a summary"));
    assert_eq!(response.sources.len(), 2);
    assert!(response.quality.is_none());
    assert!(response.steps.last().unwrap().early_exit);
}

#[tokio::test]
async fn routing_scenarios() {
    let classifier = IntentClassifier::new(IntentConfig::default());

    let price = classifier.classify("bitcoin price").await;
    assert_eq!(price.intent, Intent::WebSearch);
    assert!(price.confidence >= 0.9);

    let evergreen = classifier.classify("what is the capital of France").await;
    assert_eq!(evergreen.intent, Intent::DirectAnswer);

    let read = classifier
        .classify("https://example.com/article please summarize")
        .await;
    assert_eq!(read.intent, Intent::ReadUrl);
    assert_eq!(read.url.as_deref(), Some("https://example.com/article"));

    let again = classifier.classify("bitcoin price").await;
    assert_eq!(again.intent, Intent::WebSearch);
    assert_eq!(again.method, Method::Cache);
}

#[tokio::test]
async fn routing_consults_llm_for_ambiguous_queries() {
    let server = llm_server(
        200,
        r#"{"intent": "WEB_SEARCH", "confidence": 0.9, "reason": "needs current data"}"#,
    )
    .await;
    let config = IntentConfig {
        llm_enabled: true,
        ..Default::default()
    };
    let classifier = IntentClassifier::new(config).with_llm(llm(&server));

    let result = classifier.classify("tell me about the new stadium plans").await;

    assert_eq!(result.intent, Intent::WebSearch);
    assert_eq!(result.method, Method::Llm);
}

#[test]
fn short_answer_without_facts_is_rejected() {
    let validator = QualityValidator::new(GnosisConfig::default().quality);
    let report = validator.validate("This answer is short and has no numbers");

    assert!(!report.valid);
    assert!(report.issues.iter().any(|i| i.starts_with("too_short")));
    assert!(report.issues.iter().any(|i| i.starts_with("insufficient_facts")));
}
