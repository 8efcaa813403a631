//! User Accounts and Bearer Tokens
//!
//! Registration, login, and opaque bearer token issuance on top of
//! `SqliteStore`. Passwords are hashed with PBKDF2-HMAC-SHA256 over a
//! per-user random salt; tokens are 32 random bytes, base64-encoded.
//!
//! Login failure is uniform: a wrong password and an unknown username
//! produce the same `Unauthorized` error, so callers cannot probe which
//! usernames exist.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::params;
use sha2::Sha256;
use tracing::info;

use super::SqliteStore;
use crate::error::{AppError, AppResult};

/// PBKDF2 iteration count for password hashing.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes.
const SALT_SIZE: usize = 16;

/// Derived key length in bytes.
const KEY_SIZE: usize = 32;

/// Bearer token length in bytes (base64-encoded for storage and the wire).
const TOKEN_SIZE: usize = 32;

/// Uniform login failure message (no username-existence leak).
const BAD_CREDENTIALS: &str = "bad username or password";

fn hash_password(password: &str, salt: &[u8]) -> [u8; KEY_SIZE] {
    let mut derived = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut derived);
    derived
}

/// Constant-shape comparison over fixed-length digests.
fn digests_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl SqliteStore {
    /// Register a new user.
    ///
    /// Fails with `UsernameTaken` if the username exists and `Validation`
    /// if either field is blank.
    pub async fn register_user(&self, username: &str, password: &str) -> AppResult<()> {
        let username = username.trim().to_string();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::validation("username and password required"));
        }

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let hash = hash_password(password, &salt);
        let salt_b64 = BASE64.encode(salt);
        let hash_b64 = BASE64.encode(hash);

        let taken = username.clone();
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO users (username, password_hash, salt) VALUES (?1, ?2, ?3)",
                params![taken, hash_b64, salt_b64],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(AppError::UsernameTaken(taken.clone()))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?;

        info!(username = %username, "user registered");
        Ok(())
    }

    /// Verify credentials and issue a fresh opaque bearer token.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<String> {
        let username = username.trim().to_string();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::validation("username and password required"));
        }

        let lookup = username.clone();
        let stored: Option<(String, String)> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT password_hash, salt FROM users WHERE username = ?1",
                    params![lookup],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other.into()),
                })
            })
            .await?;

        // Same failure for unknown user and wrong password.
        let (hash_b64, salt_b64) =
            stored.ok_or_else(|| AppError::unauthorized(BAD_CREDENTIALS))?;
        let salt = BASE64
            .decode(&salt_b64)
            .map_err(|_| AppError::store("corrupt user row: bad salt encoding"))?;
        let stored_hash = BASE64
            .decode(&hash_b64)
            .map_err(|_| AppError::store("corrupt user row: bad hash encoding"))?;

        let candidate = hash_password(password, &salt);
        if !digests_match(&candidate, &stored_hash) {
            return Err(AppError::unauthorized(BAD_CREDENTIALS));
        }

        let mut token_bytes = [0u8; TOKEN_SIZE];
        OsRng.fill_bytes(&mut token_bytes);
        let token = BASE64.encode(token_bytes);

        let issued = token.clone();
        let owner = username.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tokens (token, username) VALUES (?1, ?2)",
                params![issued, owner],
            )?;
            Ok(())
        })
        .await?;

        info!(username = %username, "login succeeded");
        Ok(token)
    }

    /// Resolve a bearer token to its owning username.
    pub async fn username_for_token(&self, token: &str) -> AppResult<String> {
        let lookup = token.to_string();
        let username: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT username FROM tokens WHERE token = ?1",
                    params![lookup],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other.into()),
                })
            })
            .await?;

        username.ok_or_else(|| AppError::unauthorized("invalid bearer token"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
