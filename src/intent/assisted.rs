//! LLM-assisted classification.
//!
//! The model is asked for a JSON object `{intent, confidence, reason}`.
//! Anything unusable turns into a [`Verdict::Fallback`] carrying the reason
//! prefix; the caller then answers with the rule engine's result.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use super::Intent;
use crate::config::IntentConfig;
use crate::llm::{LlmClient, LlmRequest};
use crate::patterns::compile;

const SYSTEM_PROMPT: &str = "You are an intent classifier. Decide whether a query needs the web \
or can be answered from the model's own knowledge. Reply with ONE valid JSON object only: no \
text outside the JSON, no comments, no code fences.";

static YEAR: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\b(19|20)\d{2}\b"));

const PRICE_WORDS: &[&str] = &["prezzo", "quotazione", "valore", "price"];
const HISTORICAL_WORDS: &[&str] = &["storico", "storicamente", "historical", "historically"];

/// Outcome of asking the model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Verdict {
    /// Usable answer.
    Accepted {
        intent: Intent,
        confidence: f64,
        reason: String,
    },
    /// Use the rule result; the string is the reason prefix.
    Fallback(&'static str),
}

/// Price question pinned to the past: a price word plus a 19xx/20xx year or
/// "historical" wording.
pub fn is_historical_price_query(query: &str) -> bool {
    let q = query.to_lowercase();
    if !PRICE_WORDS.iter().any(|w| q.contains(w)) {
        return false;
    }
    YEAR.as_ref().is_some_and(|re| re.is_match(&q)) || HISTORICAL_WORDS.iter().any(|w| q.contains(w))
}

/// Chat request for classifying `query`.
pub fn build_request(query: &str, max_tokens: u32) -> LlmRequest {
    let user_prompt = format!(
        r#"Classify the intent of this query.

Query: "{query}"

Allowed intents:
- "WEB_SEARCH": needs live or recent data from the web (today's weather, real-time prices, sports results, schedules, breaking news, "now", "today").
- "READ_URL": the message contains a URL and the user wants it read or summarized.
- "DIRECT_ANSWER": the model's own knowledge is enough (explanations, concepts, history, programming, reasoning, historical data).

Rules:
- A price or quote in a PAST year, or explicitly historical, is always "DIRECT_ANSWER".
- "today", "now", "latest news", "weather", "today's results" mean "WEB_SEARCH".
- A URL in the query means "READ_URL".

Reply with JSON only, for example:
{{"intent": "WEB_SEARCH", "confidence": 0.92, "reason": "current weather needs live data"}}"#
    );
    LlmRequest {
        system_prompt: SYSTEM_PROMPT.to_owned(),
        user_prompt,
        temperature: 0.0,
        max_tokens,
    }
}

/// JSON object from a model reply: a ```json fence first, then the outermost
/// `{...}` span, then the whole text.
pub fn extract_json(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    if let Some(start) = lower.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```")
            && let Ok(serde_json::Value::Object(map)) = serde_json::from_str(after[..end].trim())
        {
            return Some(map);
        }
    }

    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    };
    match serde_json::from_str(candidate) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn parse_confidence(value: Option<&serde_json::Value>) -> Option<f64> {
    let raw = match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    raw.is_finite().then(|| raw.clamp(0.0, 1.0))
}

/// Interpret a model reply. `rule_confidence` stands in when the reply
/// omits a usable confidence.
pub(crate) fn interpret(content: &str, rule_confidence: f64, threshold: f64) -> Verdict {
    let Some(map) = extract_json(content) else {
        return Verdict::Fallback("invalid_llm_response");
    };
    let Some(label) = map.get("intent").and_then(|v| v.as_str()) else {
        return Verdict::Fallback("invalid_llm_response");
    };
    let Ok(intent) = label.trim().to_ascii_uppercase().parse::<Intent>() else {
        return Verdict::Fallback("invalid_intent_label");
    };
    let confidence = parse_confidence(map.get("confidence")).unwrap_or(rule_confidence);
    if confidence < threshold {
        return Verdict::Fallback("low_confidence_llm");
    }
    let reason = map
        .get("reason")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("llm_intent")
        .to_owned();
    Verdict::Accepted {
        intent,
        confidence,
        reason,
    }
}

/// Ask `client` to classify `query`, bounded by the configured timeout.
pub(crate) async fn ask(
    client: &dyn LlmClient,
    query: &str,
    rule_confidence: f64,
    config: &IntentConfig,
) -> Verdict {
    let request = build_request(query, config.llm_max_tokens);
    let timeout = Duration::from_millis(config.llm_timeout_ms);
    let content = match tokio::time::timeout(timeout, client.complete(&request)).await {
        Ok(Ok(content)) => content,
        Ok(Err(e)) => {
            warn!(error = %e, "intent LLM call failed");
            return Verdict::Fallback("invalid_llm_response");
        }
        Err(_) => {
            warn!(timeout_ms = config.llm_timeout_ms, "intent LLM call timed out");
            return Verdict::Fallback("invalid_llm_response");
        }
    };
    let verdict = interpret(&content, rule_confidence, config.llm_min_confidence);
    debug!(?verdict, "intent LLM verdict");
    verdict
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn historical_price_detection() {
        assert!(is_historical_price_query("prezzo bitcoin nel 2020"));
        assert!(is_historical_price_query("quotazione storica? no, valore storico dell'oro"));
        assert!(!is_historical_price_query("prezzo bitcoin oggi"));
        assert!(!is_historical_price_query("olimpiadi 2020"));
    }

    #[test]
    fn extracts_fenced_json() {
        let map = extract_json("sure:\n```JSON\n{\"intent\": \"WEB_SEARCH\"}\n```").unwrap();
        assert_eq!(map["intent"], "WEB_SEARCH");
    }

    #[test]
    fn extracts_embedded_object() {
        let map = extract_json("answer {\"intent\": \"READ_URL\", \"confidence\": 0.9} done").unwrap();
        assert_eq!(map["intent"], "READ_URL");
    }

    #[test]
    fn rejects_non_objects() {
        assert!(extract_json("").is_none());
        assert!(extract_json("[1, 2]").is_none());
        assert!(extract_json("no json here").is_none());
    }

    #[test]
    fn accepted_verdict() {
        let v = interpret(
            r#"{"intent": "web_search", "confidence": "0.93", "reason": "live prices"}"#,
            0.7,
            0.75,
        );
        assert_eq!(
            v,
            Verdict::Accepted {
                intent: Intent::WebSearch,
                confidence: 0.93,
                reason: "live prices".into()
            }
        );
    }

    #[test]
    fn fallback_reasons() {
        assert_eq!(interpret("garbage", 0.7, 0.75), Verdict::Fallback("invalid_llm_response"));
        assert_eq!(
            interpret(r#"{"intent": "CALCULATOR", "confidence": 0.99}"#, 0.7, 0.75),
            Verdict::Fallback("invalid_intent_label")
        );
        assert_eq!(
            interpret(r#"{"intent": "WEB_SEARCH", "confidence": 0.5}"#, 0.7, 0.75),
            Verdict::Fallback("low_confidence_llm")
        );
    }

    #[test]
    fn missing_confidence_uses_rule_confidence() {
        let v = interpret(r#"{"intent": "DIRECT_ANSWER"}"#, 0.9, 0.75);
        assert!(matches!(v, Verdict::Accepted { confidence, .. } if confidence == 0.9));
    }

    #[test]
    fn confidence_is_clamped() {
        let v = interpret(r#"{"intent": "DIRECT_ANSWER", "confidence": 7}"#, 0.5, 0.75);
        assert!(matches!(v, Verdict::Accepted { confidence, .. } if confidence == 1.0));
    }

    #[test]
    fn request_is_deterministic() {
        let req = build_request("meteo roma", 200);
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.max_tokens, 200);
        assert!(req.user_prompt.contains("\"meteo roma\""));
    }
}
