//! Conversation Data Model
//!
//! Role-tagged messages and session transcripts. Transcripts are
//! append-only: each completed chat turn appends exactly one user message
//! and one assistant message, in call order. The `System` role exists only
//! for the synthesized prompt preamble and is never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Synthesized prompt preamble only; never stored in a transcript.
    System,
}

impl Role {
    /// Wire name used in completion requests ("user", "assistant", "system").
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Parse a stored role string. Unknown values are rejected so a
    /// corrupted row surfaces instead of silently mislabeling a message.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role-tagged message within a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Render this message as a `ROLE: content` history line.
    pub fn history_line(&self) -> String {
        format!("{}: {}", self.role.as_str().to_uppercase(), self.content)
    }
}

/// A durable conversation: owner identity plus an ordered, append-only
/// transcript. A session belongs to exactly one username for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Owning user identity (opaque, verified by the caller's auth layer).
    pub username: String,
    /// Ordered transcript, append-only.
    pub messages: Vec<Message>,
}

impl Session {
    /// Create an empty session owned by `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            messages: Vec::new(),
        }
    }
}
