//! Session Store
//!
//! Durable keyed store mapping a session identifier to an owner identity
//! and an ordered transcript. `get` miss is a normal outcome signaling a
//! new session; `put` is a full-replace upsert executed inside one SQLite
//! transaction so a concurrent reader never observes a torn transcript.
//!
//! The read-modify-write cycle around this store is not atomic by itself;
//! `ChatEngine` serializes turns per session identifier (see
//! `engine::ChatEngine`).

use async_trait::async_trait;
use rusqlite::params;

use super::SqliteStore;
use crate::error::{AppError, AppResult};
use crate::message::{Message, Role, Session};

/// Durable conversation store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session. `None` means "new session", not an error.
    async fn get(&self, session_id: &str) -> AppResult<Option<Session>>;

    /// Full-replace upsert of the session value under `session_id`.
    async fn put(&self, session_id: &str, session: &Session) -> AppResult<()>;
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, session_id: &str) -> AppResult<Option<Session>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let username: Option<String> = conn
                .query_row(
                    "SELECT username FROM sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            let Some(username) = username else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT role, content FROM messages
                 WHERE session_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content) = row?;
                let role = Role::parse(&role).ok_or_else(|| {
                    AppError::store(format!("corrupt message row: unknown role '{}'", role))
                })?;
                messages.push(Message { role, content });
            }

            Ok(Some(Session { username, messages }))
        })
        .await
    }

    async fn put(&self, session_id: &str, session: &Session) -> AppResult<()> {
        let session_id = session_id.to_string();
        let session = session.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO sessions (session_id, username)
                 VALUES (?1, ?2)
                 ON CONFLICT(session_id) DO UPDATE SET
                     username = excluded.username,
                     updated_at = CURRENT_TIMESTAMP",
                params![session_id, session.username],
            )?;

            tx.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                params![session_id],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO messages (session_id, seq, role, content)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (seq, message) in session.messages.iter().enumerate() {
                    stmt.execute(params![
                        session_id,
                        seq as i64,
                        message.role.as_str(),
                        message.content
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn two_turn_session() -> Session {
        let mut session = Session::new("alice");
        session.messages.push(Message::user("hello"));
        session.messages.push(Message::assistant("hi"));
        session.messages.push(Message::user("how are you"));
        session.messages.push(Message::assistant("fine"));
        session
    }

    #[tokio::test]
    async fn get_miss_is_none_not_error() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_get_roundtrip_preserves_order() {
        let store = SqliteStore::new_in_memory().unwrap();
        let session = two_turn_session();

        store.put("s1", &session).await.unwrap();
        let loaded = store.get("s1").await.unwrap().unwrap();

        assert_eq!(loaded, session);
        assert_eq!(loaded.messages[0].role, Role::User);
        assert_eq!(loaded.messages[3].content, "fine");
    }

    #[tokio::test]
    async fn put_is_full_replace() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.put("s1", &two_turn_session()).await.unwrap();

        let mut shorter = Session::new("alice");
        shorter.messages.push(Message::user("fresh start"));
        shorter.messages.push(Message::assistant("ok"));
        store.put("s1", &shorter).await.unwrap();

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "fresh start");
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_id() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.put("s1", &two_turn_session()).await.unwrap();

        let mut other = Session::new("bob");
        other.messages.push(Message::user("hey"));
        other.messages.push(Message::assistant("yo"));
        store.put("s2", &other).await.unwrap();

        assert_eq!(store.get("s1").await.unwrap().unwrap().username, "alice");
        assert_eq!(store.get("s2").await.unwrap().unwrap().username, "bob");
        assert_eq!(store.get("s1").await.unwrap().unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn empty_transcript_roundtrips() {
        let store = SqliteStore::new_in_memory().unwrap();
        let session = Session::new("carol");
        store.put("s3", &session).await.unwrap();

        let loaded = store.get("s3").await.unwrap().unwrap();
        assert_eq!(loaded.username, "carol");
        assert!(loaded.messages.is_empty());
    }
}
