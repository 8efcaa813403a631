//! OpenAI Embedding Backend
//!
//! Implements the `EmbeddingProvider` trait against the OpenAI embeddings
//! API (and any OpenAI-compatible endpoint via `base_url`).
//!
//! ## API Details
//!
//! - Endpoint: `POST https://api.openai.com/v1/embeddings`
//! - Auth: `Authorization: Bearer {api_key}`
//! - Body: `{ model, input: ["text1", ...], dimensions? }`
//! - Response: `{ data: [{ embedding, index }], model, usage }`

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::provider::{EmbeddingConfig, EmbeddingError, EmbeddingProvider, EmbeddingResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI embedding API endpoint.
const OPENAI_EMBEDDING_API_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding dimension for text-embedding-3-small.
const DEFAULT_DIMENSION: usize = 1536;

/// Maximum batch size supported by the OpenAI embedding API.
const MAX_BATCH_SIZE: usize = 2048;

/// Request timeout. Provider calls must be timeout-bound so a hung
/// upstream cannot stall a turn indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
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

/// OpenAI embedding provider.
///
/// # Thread Safety
///
/// `Send + Sync` — the reqwest `Client` is internally arc'd and
/// clone-safe, and all fields are immutable after construction.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
    batch_size: usize,
    display_name: String,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedding provider from an `EmbeddingConfig`.
    pub fn new(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        config.validate()?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            EmbeddingError::InvalidConfig {
                message: "OpenAI embeddings require an API key".to_string(),
            }
        })?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_EMBEDDING_API_URL)
            .to_string();

        let model = config.model.trim().to_string();
        let dimension = config.dimension.unwrap_or(DEFAULT_DIMENSION);
        let display_name = format!("OpenAI ({})", model);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            dimension,
            batch_size: config.batch_size.min(MAX_BATCH_SIZE),
            display_name,
        })
    }

    /// Build the JSON request body for the embedding API.
    fn build_request_body(&self, input: serde_json::Value) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        // The dimensions parameter is only honored by Matryoshka-capable
        // models (text-embedding-3-*); omit it otherwise so compatible
        // APIs use the model's native dimension.
        if self.model.contains("text-embedding-3") {
            body["dimensions"] = serde_json::json!(self.dimension);
        }

        body
    }

    /// Send a POST request to the embedding API and parse the response.
    async fn post_embeddings(
        &self,
        body: &serde_json::Value,
    ) -> EmbeddingResult<EmbeddingResponse> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();

        if status == 200 {
            let resp_text =
                response
                    .text()
                    .await
                    .map_err(|e| EmbeddingError::NetworkError {
                        message: format!("failed to read response body: {}", e),
                    })?;

            serde_json::from_str::<EmbeddingResponse>(&resp_text).map_err(|e| {
                EmbeddingError::ParseError {
                    message: format!("failed to parse embedding response: {}", e),
                }
            })
        } else {
            let body_text = response.text().await.unwrap_or_default();
            Err(self.map_http_error(status, &body_text))
        }
    }

    /// Map a reqwest transport error to `EmbeddingError`.
    fn map_reqwest_error(&self, err: reqwest::Error) -> EmbeddingError {
        let msg = err.to_string();

        if err.is_connect() {
            EmbeddingError::ProviderUnavailable {
                message: format!("cannot connect to embedding API at {}: {}", self.base_url, msg),
            }
        } else if err.is_timeout() {
            EmbeddingError::NetworkError {
                message: format!("embedding request timed out: {}", msg),
            }
        } else {
            EmbeddingError::NetworkError { message: msg }
        }
    }

    /// Map an HTTP error response to `EmbeddingError`.
    fn map_http_error(&self, status: u16, body_text: &str) -> EmbeddingError {
        let error_message = serde_json::from_str::<ApiErrorResponse>(body_text)
            .ok()
            .and_then(|r| r.error)
            .and_then(|d| d.message)
            .unwrap_or_else(|| body_text.to_string());

        match status {
            401 | 403 => EmbeddingError::AuthenticationFailed {
                message: error_message,
            },
            429 => EmbeddingError::RateLimited {
                message: error_message,
            },
            400 => {
                if error_message.contains("token") || error_message.contains("length") {
                    EmbeddingError::InputTooLong {
                        message: error_message,
                    }
                } else {
                    EmbeddingError::InvalidConfig {
                        message: format!("bad request: {}", error_message),
                    }
                }
            }
            404 => EmbeddingError::ModelNotFound {
                model: format!("'{}' not found at {}", self.model, self.base_url),
            },
            _ => EmbeddingError::ServerError {
                message: error_message,
                status: Some(status),
            },
        }
    }

    /// Sort by index and extract embedding vectors from the API response.
    fn extract_embeddings(
        &self,
        mut response: EmbeddingResponse,
        expected_count: usize,
    ) -> EmbeddingResult<Vec<Vec<f32>>> {
        if response.data.len() != expected_count {
            return Err(EmbeddingError::ParseError {
                message: format!(
                    "expected {} embeddings but provider returned {}",
                    expected_count,
                    response.data.len()
                ),
            });
        }

        // Sort by index to preserve input order
        response.data.sort_by_key(|d| d.index);

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.len() > self.batch_size {
            return Err(EmbeddingError::BatchSizeLimitExceeded {
                requested: texts.len(),
                max_allowed: self.batch_size,
            });
        }

        // Blank input is rejected here, not forwarded as a provider 400.
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }

        let body = self.build_request_body(serde_json::json!(texts));
        let response = self.post_embeddings(&body).await?;

        self.extract_embeddings(response, texts.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        let body = self.build_request_body(serde_json::json!("health check"));
        self.post_embeddings(&body).await?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EmbeddingConfig {
        let mut config = EmbeddingConfig::new("text-embedding-3-small");
        config.api_key = Some("sk-test".to_string());
        config.dimension = Some(384);
        config
    }

    #[test]
    fn new_requires_api_key() {
        let config = EmbeddingConfig::new("text-embedding-3-small");
        let result = OpenAIEmbedder::new(&config);
        assert!(matches!(
            result,
            Err(EmbeddingError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn new_uses_configured_dimension() {
        let embedder = OpenAIEmbedder::new(&test_config()).unwrap();
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.display_name(), "OpenAI (text-embedding-3-small)");
    }

    #[test]
    fn request_body_includes_dimensions_for_v3_models() {
        let embedder = OpenAIEmbedder::new(&test_config()).unwrap();
        let body = embedder.build_request_body(serde_json::json!(["hello"]));
        assert_eq!(body["model"], "text-embedding-3-small");
        assert_eq!(body["dimensions"], 384);
    }

    #[test]
    fn request_body_omits_dimensions_for_other_models() {
        let mut config = test_config();
        config.model = "all-minilm-l6-v2".to_string();
        let embedder = OpenAIEmbedder::new(&config).unwrap();
        let body = embedder.build_request_body(serde_json::json!(["hello"]));
        assert!(body.get("dimensions").is_none());
    }

    #[test]
    fn extract_embeddings_restores_input_order() {
        let embedder = OpenAIEmbedder::new(&test_config()).unwrap();
        let response = EmbeddingResponse {
            data: vec![
                EmbeddingData {
                    embedding: vec![2.0],
                    index: 1,
                },
                EmbeddingData {
                    embedding: vec![1.0],
                    index: 0,
                },
            ],
        };
        let vectors = embedder.extract_embeddings(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn extract_embeddings_rejects_count_mismatch() {
        let embedder = OpenAIEmbedder::new(&test_config()).unwrap();
        let response = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![1.0],
                index: 0,
            }],
        };
        let result = embedder.extract_embeddings(response, 2);
        assert!(matches!(result, Err(EmbeddingError::ParseError { .. })));
    }

    #[test]
    fn map_http_error_variants() {
        let embedder = OpenAIEmbedder::new(&test_config()).unwrap();
        assert!(matches!(
            embedder.map_http_error(401, "{}"),
            EmbeddingError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            embedder.map_http_error(429, "{}"),
            EmbeddingError::RateLimited { .. }
        ));
        assert!(matches!(
            embedder.map_http_error(404, "{}"),
            EmbeddingError::ModelNotFound { .. }
        ));
        assert!(matches!(
            embedder.map_http_error(500, "{}"),
            EmbeddingError::ServerError {
                status: Some(500),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn embed_batch_rejects_blank_input() {
        let embedder = OpenAIEmbedder::new(&test_config()).unwrap();
        let result = embedder.embed_batch(&["hello", "   "]).await;
        assert!(matches!(result, Err(EmbeddingError::EmptyInput)));
    }

    #[tokio::test]
    async fn embed_batch_rejects_oversized_batch() {
        let mut config = test_config();
        config.batch_size = 2;
        let embedder = OpenAIEmbedder::new(&config).unwrap();
        let result = embedder.embed_batch(&["a", "b", "c"]).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::BatchSizeLimitExceeded {
                requested: 3,
                max_allowed: 2
            })
        ));
    }

    #[tokio::test]
    async fn embed_batch_empty_input_returns_empty() {
        let embedder = OpenAIEmbedder::new(&test_config()).unwrap();
        let result = embedder.embed_batch(&[]).await.unwrap();
        assert!(result.is_empty());
    }
}
