//! Speech-to-Text Boundary
//!
//! The `voice` operation delegates transcription to an external
//! collaborator behind the `Transcriber` trait; the core only consumes
//! the resulting text and runs a normal chat turn with it.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Default OpenAI audio transcriptions endpoint.
const OPENAI_TRANSCRIPTION_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Default transcription model.
const DEFAULT_MODEL: &str = "whisper-1";

/// Request timeout for transcription uploads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// External speech-to-text collaborator.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio payload into text. `filename` carries the
    /// original name so the backend can infer the container format.
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> AppResult<String>;
}

/// OpenAI Whisper transcription backend (multipart upload).
pub struct OpenAITranscriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAITranscriber {
    /// Create a new Whisper transcriber.
    pub fn new(api_key: impl Into<String>) -> AppResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AppError::transcription("API key must not be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::transcription(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_TRANSCRIPTION_API_URL.to_string(),
        })
    }

    /// Override the endpoint (compatible APIs, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> AppResult<String> {
        if audio.is_empty() {
            return Err(AppError::validation("no audio provided"));
        }

        let part = reqwest::multipart::Part::bytes(audio).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::transcription(format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|e| AppError::transcription(format!("failed to read response: {}", e)))?;

        if status != 200 {
            return Err(AppError::transcription(format!(
                "HTTP {}: {}",
                status, body_text
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| AppError::transcription(format!("failed to parse response: {}", e)))?;

        let text = parsed
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| AppError::transcription("response has no text field"))?;

        Ok(text.trim().to_string())
    }
}
