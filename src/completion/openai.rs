//! OpenAI Completion Backend
//!
//! Implementation of the `CompletionProvider` trait for the OpenAI chat
//! completions API (and compatible endpoints via `base_url`).
//!
//! - Endpoint: `POST https://api.openai.com/v1/chat/completions`
//! - Body: `{ model, messages, max_tokens, temperature }`
//! - Reply: `choices[0].message.content`, whitespace-trimmed

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{
    parse_http_error, CompletionConfig, CompletionError, CompletionProvider, CompletionResult,
};
use crate::message::Message;

/// Default OpenAI chat completions endpoint.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// OpenAI chat completion provider.
pub struct OpenAICompletion {
    config: CompletionConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAICompletion {
    /// Create a new provider from a `CompletionConfig`.
    pub fn new(config: CompletionConfig) -> CompletionResult<Self> {
        config.validate()?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            CompletionError::InvalidConfig {
                message: "OpenAI completions require an API key".to_string(),
            }
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::InvalidConfig {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    /// Get the API base URL.
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    /// Build the request body for the API.
    fn build_request_body(&self, messages: &[Message]) -> serde_json::Value {
        let wire_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        serde_json::json!({
            "model": self.config.model,
            "messages": wire_messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }

    /// Extract the single reply text from a parsed response.
    fn extract_reply(&self, response: ChatResponse) -> CompletionResult<String> {
        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(CompletionError::EmptyReply)?;

        let reply = reply.trim().to_string();
        if reply.is_empty() {
            return Err(CompletionError::EmptyReply);
        }
        Ok(reply)
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    async fn complete(&self, messages: &[Message]) -> CompletionResult<String> {
        let body = self.build_request_body(messages);
        debug!(
            model = %self.config.model,
            messages = messages.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(self.base_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|e| CompletionError::NetworkError {
                message: e.to_string(),
            })?;

        if status != 200 {
            let message = serde_json::from_str::<ApiErrorResponse>(&body_text)
                .ok()
                .and_then(|r| r.error)
                .and_then(|d| d.message)
                .unwrap_or(body_text);
            return Err(parse_http_error(status, &message, &self.config.model));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body_text).map_err(|e| CompletionError::ParseError {
                message: format!("failed to parse completion response: {}", e),
            })?;

        self.extract_reply(parsed)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> CompletionResult<()> {
        let probe = [Message::user("ping")];
        self.complete(&probe).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
