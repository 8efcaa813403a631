//! Completion Engines
//!
//! External-collaborator boundary: given an ordered message sequence,
//! return a single generated reply.

pub mod openai;
pub mod provider;

pub use openai::OpenAICompletion;
pub use provider::{
    CompletionConfig, CompletionError, CompletionProvider, CompletionResult,
};
