//! Configuration
//!
//! Immutable configuration objects constructed once at process startup and
//! passed by reference into the engine. There are no process-wide
//! singletons: every client and model handle is built from one of these
//! and shared via `Arc`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Instructional preamble placed at the top of every synthesized system
/// message.
pub const DEFAULT_PREAMBLE: &str = "You are ISSAC, an intelligent assistant. \
     Use DOCUMENT context & PAST CONVERSATION to inform your reply.";

/// Number of snippets retrieved for a chat turn.
pub const CHAT_TOP_K: usize = 3;

/// Number of snippets returned by a pure search query.
///
/// Chat and search are independent call sites with different K; these are
/// deliberately two constants, not one.
pub const SEARCH_TOP_K: usize = 5;

fn default_chat_top_k() -> usize {
    CHAT_TOP_K
}

fn default_search_top_k() -> usize {
    SEARCH_TOP_K
}

fn default_history_window() -> usize {
    20
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

/// Engine-level knobs for the retrieval-augmented chat pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Top-K snippets retrieved for each chat turn.
    #[serde(default = "default_chat_top_k")]
    pub chat_top_k: usize,

    /// Top-K snippets returned by the pure search operation.
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Truncation policy for prompt assembly: only the last
    /// `history_window` transcript messages enter the prompt (both the
    /// HISTORY block and the trailing message list). The full transcript
    /// is always persisted and served by history lookups.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Instructional preamble for the synthesized system message.
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chat_top_k: CHAT_TOP_K,
            search_top_k: SEARCH_TOP_K,
            history_window: default_history_window(),
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        if self.chat_top_k == 0 {
            return Err(AppError::validation("chat_top_k must be at least 1"));
        }
        if self.search_top_k == 0 {
            return Err(AppError::validation("search_top_k must be at least 1"));
        }
        if self.history_window == 0 {
            return Err(AppError::validation("history_window must be at least 1"));
        }
        if self.preamble.trim().is_empty() {
            return Err(AppError::validation("preamble must not be empty"));
        }
        Ok(())
    }
}

/// Configuration for the offline ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory containing the raw corpus documents (`*.txt`).
    pub corpus_dir: PathBuf,

    /// Output path for the serialized vector index artifact.
    pub index_path: PathBuf,

    /// Output path for the position-aligned snippet-text artifact.
    pub snippets_path: PathBuf,
}

impl IngestConfig {
    /// Conventional artifact layout: `corpus.index.json` and
    /// `snippets.json` inside `artifact_dir`.
    pub fn new(corpus_dir: impl Into<PathBuf>, artifact_dir: impl Into<PathBuf>) -> Self {
        let artifact_dir = artifact_dir.into();
        Self {
            corpus_dir: corpus_dir.into(),
            index_path: artifact_dir.join("corpus.index.json"),
            snippets_path: artifact_dir.join("snippets.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chat_top_k, 3);
        assert_eq!(config.search_top_k, 5);
    }

    #[test]
    fn validate_rejects_zero_top_k() {
        let config = EngineConfig {
            chat_top_k: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_preamble() {
        let config = EngineConfig {
            preamble: "   ".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.chat_top_k, 3);
        assert_eq!(config.search_top_k, 5);
        assert_eq!(config.history_window, 20);
        assert_eq!(config.preamble, DEFAULT_PREAMBLE);
    }

    #[test]
    fn ingest_config_artifact_layout() {
        let config = IngestConfig::new("/data/docs", "/data/artifacts");
        assert_eq!(
            config.index_path,
            PathBuf::from("/data/artifacts/corpus.index.json")
        );
        assert_eq!(
            config.snippets_path,
            PathBuf::from("/data/artifacts/snippets.json")
        );
    }
}
