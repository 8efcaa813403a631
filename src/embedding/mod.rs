//! Embedding Backends
//!
//! Maps text to fixed-dimension dense vectors, both at ingestion time and
//! at query time. The same provider (same model, same dimension) must be
//! used for both sides of one index.

pub mod openai;
pub mod provider;

pub use openai::OpenAIEmbedder;
pub use provider::{EmbeddingConfig, EmbeddingError, EmbeddingProvider, EmbeddingResult};
