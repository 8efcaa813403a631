//! ISSAC
//!
//! A retrieval-augmented conversational assistant:
//! - session-scoped conversation memory persisted in SQLite
//! - exact nearest-neighbor retrieval over an embedded document corpus
//! - deterministic prompt assembly (preamble, DOCUMENT block, HISTORY
//!   block, windowed transcript)
//! - pluggable embedding, completion, and transcription providers
//! - account registration, token authentication, and an offline
//!   ingestion pipeline that builds the serving artifacts
//!
//! The authenticated surface lives in [`service::AssistantService`];
//! the chat pipeline itself in [`engine::ChatEngine`].

pub mod completion;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod message;
pub mod prompt;
pub mod service;
pub mod store;
pub mod transcribe;

// Re-export main types
pub use completion::{CompletionConfig, CompletionError, CompletionProvider, OpenAICompletion};
pub use config::{EngineConfig, IngestConfig, CHAT_TOP_K, DEFAULT_PREAMBLE, SEARCH_TOP_K};
pub use embedding::{EmbeddingConfig, EmbeddingError, EmbeddingProvider, OpenAIEmbedder};
pub use engine::{ChatEngine, ChatReply};
pub use error::{AppError, AppResult};
pub use index::{Corpus, FlatIndex};
pub use ingest::{IngestReport, split_paragraphs};
pub use message::{Message, Role, Session};
pub use service::{AssistantService, VoiceReply};
pub use store::{SessionStore, SqliteStore};
pub use transcribe::{OpenAITranscriber, Transcriber};
