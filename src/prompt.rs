//! Prompt Assembly
//!
//! Deterministically merges retrieved document context with conversation
//! history into the message sequence sent to the completion engine.
//!
//! The layout is load-bearing: the synthesized system message comes
//! first (preamble, then the DOCUMENT block in retrieval order, then the
//! HISTORY block in transcript order), followed by the prior transcript
//! in original order, followed by the new user message last. This
//! determines what the completion engine sees as priority and recency.

use crate::message::Message;

/// Separator between snippets inside the DOCUMENT block.
const SNIPPET_SEPARATOR: &str = "\n---\n";

/// Assemble the full message sequence for one chat turn.
///
/// `history` must already be windowed by the caller (see
/// `EngineConfig::history_window`); this function does not truncate.
pub fn assemble(
    preamble: &str,
    snippets: &[String],
    history: &[Message],
    user_message: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_content(preamble, snippets, history)));
    messages.extend(history.iter().cloned());
    messages.push(Message::user(user_message));
    messages
}

/// Build the synthesized system message content.
fn system_content(preamble: &str, snippets: &[String], history: &[Message]) -> String {
    let document_block = snippets.join(SNIPPET_SEPARATOR);
    let history_block = history
        .iter()
        .map(Message::history_line)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n=== DOCUMENT ===\n{}\n\n=== HISTORY ===\n{}",
        preamble, document_block, history_block
    )
}

/// Apply the history-window truncation policy: keep the last `window`
/// messages of the transcript.
pub fn window<'a>(history: &'a [Message], window: usize) -> &'a [Message] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
