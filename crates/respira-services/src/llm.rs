//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use respira_contracts::error::{RespiraError, RespiraResult};
use respira_core::traits::TextGenerator;

const SERVICE: &str = "llm";

/// `[explainer]` section of `respira.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Sampling temperature sent with every request.
    pub temperature: f64,
    /// Read from `OPENAI_API_KEY`, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 20,
            temperature: 0.3,
            api_key: None,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// `TextGenerator` over the `/chat/completions` endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
}

impl OpenAiClient {
    /// Build a client from config. Returns `Ok(None)` when no API key is
    /// configured, in which case the explainer runs offline.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the HTTP client cannot be constructed.
    pub fn from_config(config: &ExplainerConfig) -> RespiraResult<Option<Self>> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RespiraError::ConfigError {
                reason: format!("cannot build LLM HTTP client: {e}"),
            })?;

        Ok(Some(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> RespiraResult<String> {
        let upstream = |reason: String| RespiraError::Upstream {
            service: SERVICE.to_string(),
            reason,
        };

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    upstream("request timed out".to_string())
                } else {
                    upstream(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(upstream(format!("status {}", status.as_u16())));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| upstream(format!("malformed response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| upstream("response has no content".to_string()))?;

        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }
}

impl TextGenerator for OpenAiClient {
    fn generate<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, RespiraResult<String>> {
        Box::pin(self.complete(system, prompt))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
