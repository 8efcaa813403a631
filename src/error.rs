//! Error Handling
//!
//! Unified error types for the assistant core.
//! Uses thiserror for ergonomic error definitions.
//!
//! Every failure aborts the current operation as a whole: nothing in the
//! core retries automatically, and no partial transcript state is ever
//! persisted or returned. Retry policy, if desired, belongs to the caller.

use thiserror::Error;

use crate::completion::CompletionError;
use crate::embedding::EmbeddingError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed input (user-correctable, no retry)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad credentials or invalid bearer token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Registration attempted with an existing username
    #[error("Username already exists: {0}")]
    UsernameTaken(String),

    /// Caller does not own the requested resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Query/index dimensionality mismatch (deployment defect, fatal)
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector index unreachable or corrupt (aborts the turn before generation)
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Completion engine failure or timeout (aborts the turn, no transcript write)
    #[error("Generation error: {0}")]
    Generation(#[from] CompletionError),

    /// Speech-to-text collaborator failure
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Durable store unreachable
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a retrieval error
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    /// Create a transcription error
    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error was caused by the caller (bad input, bad
    /// credentials) rather than by the system.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Unauthorized(_)
                | Self::UsernameTaken(_)
                | Self::Forbidden(_)
        )
    }
}
