//! Embedding Provider Abstraction
//!
//! Defines the async `EmbeddingProvider` trait and supporting types for
//! pluggable embedding backends. Embedding is a distinct responsibility
//! from chat completion, so it gets its own trait rather than extending
//! `CompletionProvider`; the trait is async-friendly and object-safe
//! (`Send + Sync` for use across Tokio tasks).
//!
//! Determinism contract: for a fixed model version, identical input text
//! always produces an identical vector. The serving-time retrieval path
//! relies on this.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingError {
    /// Authentication failed (invalid or missing API key).
    AuthenticationFailed { message: String },

    /// The requested model was not found or is not available.
    ModelNotFound { model: String },

    /// The provider is not reachable or not running.
    ProviderUnavailable { message: String },

    /// The input text is empty after normalization.
    EmptyInput,

    /// The input batch exceeds the provider's maximum batch size.
    BatchSizeLimitExceeded {
        requested: usize,
        max_allowed: usize,
    },

    /// The input text exceeds the provider's maximum token/character limit.
    InputTooLong { message: String },

    /// A network or connection error occurred.
    NetworkError { message: String },

    /// The provider returned an unexpected or unparseable response.
    ParseError { message: String },

    /// The provider returned an HTTP error.
    ServerError {
        message: String,
        status: Option<u16>,
    },

    /// Rate limit exceeded.
    RateLimited { message: String },

    /// Configuration is invalid or incomplete.
    InvalidConfig { message: String },
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed { message } => {
                write!(f, "authentication failed: {}", message)
            }
            Self::ModelNotFound { model } => write!(f, "model not found: {}", model),
            Self::ProviderUnavailable { message } => {
                write!(f, "provider unavailable: {}", message)
            }
            Self::EmptyInput => write!(f, "input text is empty after normalization"),
            Self::BatchSizeLimitExceeded {
                requested,
                max_allowed,
            } => write!(f, "batch size {} exceeds maximum {}", requested, max_allowed),
            Self::InputTooLong { message } => write!(f, "input too long: {}", message),
            Self::NetworkError { message } => write!(f, "network error: {}", message),
            Self::ParseError { message } => write!(f, "parse error: {}", message),
            Self::ServerError { message, status } => {
                if let Some(code) = status {
                    write!(f, "server error (HTTP {}): {}", code, message)
                } else {
                    write!(f, "server error: {}", message)
                }
            }
            Self::RateLimited { message } => write!(f, "rate limited: {}", message),
            Self::InvalidConfig { message } => write!(f, "invalid config: {}", message),
        }
    }
}

impl std::error::Error for EmbeddingError {}

impl EmbeddingError {
    /// Whether this error is transient. The core never retries; this is
    /// advisory for external retry policy layers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::NetworkError { .. }
                | EmbeddingError::RateLimited { .. }
                | EmbeddingError::ServerError { .. }
                | EmbeddingError::ProviderUnavailable { .. }
        )
    }
}

/// Convenience alias for embedding operation results.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

// ---------------------------------------------------------------------------
// Provider configuration
// ---------------------------------------------------------------------------

fn default_batch_size() -> usize {
    32
}

/// Configuration for an embedding provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier (e.g., "text-embedding-3-small").
    pub model: String,

    /// API key for remote providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override for the provider API. If `None`, the provider's
    /// default endpoint is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Desired embedding dimension. If `None`, the provider's default is
    /// used. Must match the dimension of any index queried with these
    /// vectors; a mismatch is a fatal configuration error, not a
    /// recoverable one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Maximum number of texts to embed in a single request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl EmbeddingConfig {
    /// Create a configuration for the given model with defaults.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            base_url: None,
            dimension: None,
            batch_size: default_batch_size(),
        }
    }

    /// Validate the configuration and return the first issue found.
    pub fn validate(&self) -> EmbeddingResult<()> {
        if self.model.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig {
                message: "model name must not be empty".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(EmbeddingError::InvalidConfig {
                message: "batch_size must be at least 1".to_string(),
            });
        }
        if let Some(0) = self.dimension {
            return Err(EmbeddingError::InvalidConfig {
                message: "dimension must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Embedding provider trait
// ---------------------------------------------------------------------------

/// Async trait for embedding providers.
///
/// Implementations produce dense vector representations of text. All
/// vectors returned by one provider instance have the same dimensionality
/// (`self.dimension()`), and this must equal the dimensionality of the
/// index the vectors are searched against.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts into dense vectors, one per input, in input
    /// order.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Embed a single text into a dense vector.
    ///
    /// The default implementation delegates to `embed_batch` with a
    /// single-element slice.
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::ParseError {
                message: "embed_batch returned no vector for single input".to_string(),
            })
    }

    /// Returns the dimensionality of the embedding vectors produced.
    fn dimension(&self) -> usize;

    /// Returns the maximum number of texts per batch request.
    fn max_batch_size(&self) -> usize;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> EmbeddingResult<()>;

    /// Returns a human-readable name for this provider instance.
    fn display_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validate_rejects_empty_model() {
        let mut config = EmbeddingConfig::new("text-embedding-3-small");
        assert!(config.validate().is_ok());

        config.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_validate_rejects_zero_batch_size() {
        let mut config = EmbeddingConfig::new("text-embedding-3-small");
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_validate_rejects_zero_dimension() {
        let mut config = EmbeddingConfig::new("text-embedding-3-small");
        config.dimension = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_serde_skips_none_fields() {
        let config = EmbeddingConfig::new("text-embedding-3-small");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("api_key"));
        assert!(!json.contains("base_url"));
    }

    #[test]
    fn error_is_retryable() {
        assert!(EmbeddingError::NetworkError {
            message: "timeout".into()
        }
        .is_retryable());
        assert!(EmbeddingError::ProviderUnavailable {
            message: "offline".into()
        }
        .is_retryable());

        assert!(!EmbeddingError::EmptyInput.is_retryable());
        assert!(!EmbeddingError::AuthenticationFailed {
            message: "bad key".into()
        }
        .is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EmbeddingError::BatchSizeLimitExceeded {
            requested: 100,
            max_allowed: 64,
        };
        assert_eq!(err.to_string(), "batch size 100 exceeds maximum 64");
        assert_eq!(
            EmbeddingError::EmptyInput.to_string(),
            "input text is empty after normalization"
        );
    }

    #[test]
    fn error_serde_roundtrip() {
        let err = EmbeddingError::ServerError {
            message: "internal error".into(),
            status: Some(500),
        };
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: EmbeddingError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            EmbeddingError::ServerError {
                status: Some(500),
                ..
            }
        ));
    }

    #[test]
    fn embedding_provider_trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }

    #[test]
    fn embedding_provider_trait_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Box<dyn EmbeddingProvider>>();
    }
}
