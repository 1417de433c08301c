use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use rand::RngCore;
use rusqlite::params;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{QueryExt, affected};
use crate::models::{RowExt, format_timestamp};
use crate::{Database, Result};

const TOKEN_BYTES: usize = 32;

/// Sessions are keyed by the SHA-256 of the bearer token; the token itself is
/// never stored.
pub struct SessionRepository<'a> {
    db: &'a Database,
}

impl<'a> SessionRepository<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Returns the bearer token for the new session.
    pub fn create(&self, user_id: Uuid, ttl: Duration) -> Result<String> {
        let mut raw = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);

        let expires_at = format_timestamp(Utc::now() + ttl);

        self.db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![hash_token(&token), user_id.to_string(), expires_at],
            )?;
            Ok(())
        })?;

        Ok(token)
    }

    /// Resolves a live session to its user.
    pub fn get_user(&self, token: &str) -> Result<Uuid> {
        let now = format_timestamp(Utc::now());

        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
                params![hash_token(token), now],
                |row| row.parsed(0),
            )
            .found("session")
        })
    }

    pub fn delete(&self, token: &str) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let rows = conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                [hash_token(token)],
            )?;
            affected(rows, "session")
        })
    }

    pub fn delete_for_user(&self, user_id: Uuid) -> Result<usize> {
        self.db.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id.to_string()])?)
        })
    }

    /// Removes expired sessions and returns how many were removed.
    pub fn clean_expired(&self) -> Result<usize> {
        let now = format_timestamp(Utc::now());

        self.db.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?)
        })
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
