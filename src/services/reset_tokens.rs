//! In-memory password reset token store.
//!
//! Tokens are single-use and expire after a configurable TTL. Only the
//! SHA-256 hash of a token is kept as the key, so the store never holds a
//! usable token.
//!
//! The store is process-local: tokens issued before a restart are lost and
//! the user simply requests a new one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

struct ResetEntry {
    user_id: i64,
    expires_at: DateTime<Utc>,
}

pub struct ResetTokenStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, ResetEntry>>,
}

impl ResetTokenStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a new token for `user_id`.
    ///
    /// Any earlier token for the same user is revoked and expired entries
    /// are purged.
    pub async fn issue(&self, user_id: i64) -> String {
        self.issue_at(user_id, Utc::now()).await
    }

    async fn issue_at(&self, user_id: i64, now: DateTime<Utc>) -> String {
        let token = generate_token();

        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.user_id != user_id && entry.expires_at > now);
        entries.insert(
            hash_token(&token),
            ResetEntry {
                user_id,
                expires_at: now + self.ttl,
            },
        );

        token
    }

    /// Consume a token, returning the user it was issued for.
    ///
    /// Returns `None` for unknown, already used or expired tokens.
    pub async fn consume(&self, token: &str) -> Option<i64> {
        self.consume_at(token, Utc::now()).await
    }

    async fn consume_at(&self, token: &str, now: DateTime<Utc>) -> Option<i64> {
        let entry = self.entries.lock().await.remove(&hash_token(token))?;
        (entry.expires_at > now).then_some(entry.user_id)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// 32 random bytes, hex encoded.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}
