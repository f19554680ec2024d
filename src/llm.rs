//! Language-model client for an OpenAI-compatible chat endpoint.
//!
//! Used for answer synthesis and the optional LLM-assisted intent path.
//! Requests are single-shot (no streaming); the reply is the first choice's
//! message content.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{GnosisError, Result};

/// One chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// System message.
    pub system_prompt: String,
    /// User message.
    pub user_prompt: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion cap.
    pub max_tokens: u32,
}

/// Something that answers chat requests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Return the first choice's message content.
    ///
    /// # Errors
    ///
    /// [`GnosisError::Llm`] on non-200, malformed JSON or an empty choice;
    /// [`GnosisError::Timeout`] when the call exceeds its budget.
    async fn complete(&self, request: &LlmRequest) -> Result<String>;
}

/// HTTP client for `/v1/chat/completions`.
pub struct HttpLlmClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLlmClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpLlmClient {
    /// Client for an explicit chat-completions URL.
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_millis(LlmConfig::default().timeout_ms),
        }
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Client for the configured endpoint, or `None` when no endpoint is set.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let url = config.chat_url()?;
        let mut client = Self::new(url, config.model.clone())
            .with_timeout(Duration::from_millis(config.timeout_ms));
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            client = client.with_api_key(key);
        }
        Some(client)
    }

    /// The chat-completions URL requests go to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, request: &LlmRequest) -> Result<String> {
        let body = build_chat_request(&self.model, request);
        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GnosisError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GnosisError::Llm(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body_text)
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GnosisError::Llm(format!("malformed JSON response: {e}")))?;
        first_choice_content(&value)
            .ok_or_else(|| GnosisError::Llm("response has no choices[0].message.content".into()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(GnosisError::Timeout(format!(
                "LLM call exceeded {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

/// JSON body for a non-streaming chat completion.
pub fn build_chat_request(model: &str, request: &LlmRequest) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": request.system_prompt},
            {"role": "user", "content": request.user_prompt},
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "stream": false,
    })
}

fn first_choice_content(value: &serde_json::Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
}

/// Error message from an OpenAI-style error body, or the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}
