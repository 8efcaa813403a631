//! Completion Provider Trait
//!
//! Defines the common interface for completion engines: given an ordered
//! list of role-tagged messages, return a single generated reply. This is
//! the external-collaborator boundary of the chat pipeline; the core
//! never retries a failed generation and never persists anything for a
//! turn whose generation failed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::Message;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during completion operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionError {
    /// Authentication failed (invalid or missing API key).
    AuthenticationFailed { message: String },

    /// The requested model was not found or is not available.
    ModelNotFound { model: String },

    /// A network or connection error occurred, including timeouts.
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

    /// The provider returned no reply message.
    EmptyReply,

    /// Configuration is invalid or incomplete.
    InvalidConfig { message: String },
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed { message } => {
                write!(f, "authentication failed: {}", message)
            }
            Self::ModelNotFound { model } => write!(f, "model not found: {}", model),
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
            Self::EmptyReply => write!(f, "provider returned no reply message"),
            Self::InvalidConfig { message } => write!(f, "invalid config: {}", message),
        }
    }
}

impl std::error::Error for CompletionError {}

/// Convenience alias for completion operation results.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Map an HTTP error status to a `CompletionError`.
pub fn parse_http_error(status: u16, message: &str, model: &str) -> CompletionError {
    match status {
        401 | 403 => CompletionError::AuthenticationFailed {
            message: message.to_string(),
        },
        404 => CompletionError::ModelNotFound {
            model: format!("'{}': {}", model, message),
        },
        429 => CompletionError::RateLimited {
            message: message.to_string(),
        },
        _ => CompletionError::ServerError {
            message: message.to_string(),
            status: Some(status),
        },
    }
}

// ---------------------------------------------------------------------------
// Provider configuration
// ---------------------------------------------------------------------------

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    120
}

/// Configuration for a completion provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Model identifier (e.g., "gpt-4").
    pub model: String,

    /// API key for remote providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override for the provider API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Bounded reply-length budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds. Generation is timeout-bound; a timed
    /// out turn has no partial side effects.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CompletionConfig {
    /// Create a configuration for the given model with defaults.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Validate the configuration and return the first issue found.
    pub fn validate(&self) -> CompletionResult<()> {
        if self.model.trim().is_empty() {
            return Err(CompletionError::InvalidConfig {
                message: "model name must not be empty".to_string(),
            });
        }
        if self.max_tokens == 0 {
            return Err(CompletionError::InvalidConfig {
                message: "max_tokens must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Completion provider trait
// ---------------------------------------------------------------------------

/// Trait that all completion engines must implement.
///
/// Object-safe and `Send + Sync` for use behind `Arc<dyn
/// CompletionProvider>` across Tokio tasks.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate exactly one reply for the given ordered message sequence.
    ///
    /// The sequence already contains any synthesized system message; the
    /// provider must not reorder it.
    async fn complete(&self, messages: &[Message]) -> CompletionResult<String>;

    /// Returns the model identifier in use.
    fn model(&self) -> &str;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> CompletionResult<()>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = CompletionConfig::new("gpt-4");
        assert_eq!(config.max_tokens, 500);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_validate_rejects_empty_model() {
        let config = CompletionConfig::new("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_validate_rejects_zero_max_tokens() {
        let mut config = CompletionConfig::new("gpt-4");
        config.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_http_error_classification() {
        assert!(matches!(
            parse_http_error(401, "bad key", "gpt-4"),
            CompletionError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            parse_http_error(404, "gone", "gpt-4"),
            CompletionError::ModelNotFound { .. }
        ));
        assert!(matches!(
            parse_http_error(429, "slow down", "gpt-4"),
            CompletionError::RateLimited { .. }
        ));
        assert!(matches!(
            parse_http_error(503, "down", "gpt-4"),
            CompletionError::ServerError {
                status: Some(503),
                ..
            }
        ));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            CompletionError::EmptyReply.to_string(),
            "provider returned no reply message"
        );
        let err = CompletionError::ServerError {
            message: "boom".into(),
            status: Some(500),
        };
        assert_eq!(err.to_string(), "server error (HTTP 500): boom");
    }

    #[test]
    fn completion_provider_trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn CompletionProvider) {}
    }
}
