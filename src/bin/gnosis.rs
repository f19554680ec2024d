//! Command-line front end for the gnosis pipeline. Output is JSON on stdout;
//! logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use gnosis::intent::FeedbackLog;
use gnosis::policy::TrustPolicy;
use gnosis::{
    GnosisConfig, HttpLlmClient, IntentClassifier, QualityValidator, QueryExpander,
    ResearchOrchestrator, store,
};
use gnosis_search::SearchChain;
use tracing_subscriber::EnvFilter;

struct Args {
    command: String,
    text: String,
    config: Option<PathBuf>,
    policy: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut config = None;
    let mut policy = None;
    let mut positional = Vec::new();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(iter.next().context("--config needs a path")?)),
            "--policy" => policy = Some(PathBuf::from(iter.next().context("--policy needs a path")?)),
            "help" | "--help" | "-h" => return Ok(None),
            _ => positional.push(arg),
        }
    }
    let Some((command, rest)) = positional.split_first() else {
        return Ok(None);
    };
    Ok(Some(Args {
        command: command.clone(),
        text: rest.join(" "),
        config,
        policy,
    }))
}

fn print_usage() {
    println!(
        "usage: gnosis [--config <file>] [--policy <file>] \
         <classify|expand|search|research|validate-quality|correct <INTENT>> <text>"
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(args) = parse_args()? else {
        print_usage();
        return Ok(());
    };
    let config = GnosisConfig::load(args.config.as_deref()).context("loading configuration")?;

    match args.command.as_str() {
        "classify" => {
            let store = store::open_store(&config.store);
            let mut classifier = IntentClassifier::new(config.intent.clone())
                .with_feedback(FeedbackLog::new(store, &config.store));
            if let Some(llm) = HttpLlmClient::from_config(&config.llm) {
                classifier = classifier.with_llm(Arc::new(llm));
            }
            print_json(&classifier.classify(&args.text).await)
        }
        "correct" => {
            let Some((label, query)) = args.text.split_once(' ') else {
                bail!("correct needs an intent label and a query");
            };
            let intent: gnosis::Intent = label.to_ascii_uppercase().parse().map_err(anyhow::Error::msg)?;
            let feedback = FeedbackLog::new(store::open_store(&config.store), &config.store);
            feedback.record_correction(query, intent).await?;
            print_json(&serde_json::json!({"query": query, "intent": intent}))
        }
        "expand" => {
            let policy = TrustPolicy::load(args.policy.as_deref())?;
            let domain_policy = policy.pick(&args.text);
            let variants = QueryExpander::new().expand(&args.text, &domain_policy);
            print_json(&serde_json::json!({
                "category": domain_policy.category.as_str(),
                "variants": variants,
            }))
        }
        "search" => {
            let chain = SearchChain::from_config(&config.search)?;
            let report = chain
                .search_with_report(&args.text, config.research.search_results)
                .await;
            print_json(&report)
        }
        "research" => {
            let policy = TrustPolicy::load(args.policy.as_deref())?;
            let orchestrator = ResearchOrchestrator::from_config(&config, policy)?;
            print_json(&orchestrator.research(&args.text).await)
        }
        "validate-quality" => {
            let validator = QualityValidator::new(config.quality.clone());
            let mut report = serde_json::to_value(validator.validate(&args.text))?;
            if let Some(obj) = report.as_object_mut() {
                obj.insert(
                    "bad_phrases".to_owned(),
                    serde_json::json!(validator.extract_bad_phrases(&args.text)),
                );
            }
            print_json(&report)
        }
        other => {
            print_usage();
            bail!("unknown command `{other}`")
        }
    }
}
