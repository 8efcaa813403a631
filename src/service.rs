//! Assistant Service Facade
//!
//! Transport-agnostic serving surface: registration, login, and the
//! token-gated chat / search / history / voice operations. An HTTP layer
//! (or any other transport) maps requests onto these methods; the facade
//! resolves bearer tokens to usernames and delegates to the engine.

use std::sync::Arc;
use tracing::info;

use crate::engine::{ChatEngine, ChatReply};
use crate::error::AppResult;
use crate::message::Message;
use crate::store::SqliteStore;
use crate::transcribe::Transcriber;

/// Result of one voice turn: the recognized text plus the chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceReply {
    /// Text recognized from the audio payload.
    pub transcript: String,
    /// The generated assistant reply.
    pub reply: String,
    /// The resolved or freshly minted session identifier.
    pub session_id: String,
}

/// The assistant's serving facade.
pub struct AssistantService {
    store: Arc<SqliteStore>,
    engine: Arc<ChatEngine>,
    transcriber: Arc<dyn Transcriber>,
}

impl AssistantService {
    /// Create the facade over its collaborators.
    pub fn new(
        store: Arc<SqliteStore>,
        engine: Arc<ChatEngine>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            store,
            engine,
            transcriber,
        }
    }

    /// Register a new user account.
    pub async fn register(&self, username: &str, password: &str) -> AppResult<()> {
        self.store.register_user(username, password).await
    }

    /// Verify credentials and issue an opaque bearer token.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<String> {
        self.store.login(username, password).await
    }

    /// Resolve a bearer token to its owning username.
    async fn authenticate(&self, token: &str) -> AppResult<String> {
        self.store.username_for_token(token).await
    }

    /// Run one chat turn for the token's owner.
    pub async fn chat(
        &self,
        token: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> AppResult<ChatReply> {
        let username = self.authenticate(token).await?;
        self.engine.chat(&username, message, session_id).await
    }

    /// Pure retrieval: the top snippets for a query.
    pub async fn search(&self, token: &str, query: &str) -> AppResult<Vec<String>> {
        self.authenticate(token).await?;
        self.engine.search(query).await
    }

    /// Transcript lookup; empty for sessions the caller does not own.
    pub async fn history(&self, token: &str, session_id: &str) -> AppResult<Vec<Message>> {
        let username = self.authenticate(token).await?;
        self.engine.history(&username, session_id).await
    }

    /// Transcribe an audio payload and run a chat turn with the result.
    pub async fn voice(
        &self,
        token: &str,
        audio: Vec<u8>,
        filename: &str,
        session_id: Option<&str>,
    ) -> AppResult<VoiceReply> {
        let username = self.authenticate(token).await?;
        let transcript = self.transcriber.transcribe(audio, filename).await?;
        info!(chars = transcript.len(), "audio transcribed");

        let reply = self
            .engine
            .chat(&username, &transcript, session_id)
            .await?;
        Ok(VoiceReply {
            transcript,
            reply: reply.reply,
            session_id: reply.session_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
