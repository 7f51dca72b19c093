//! Revoked access token cache.
//!
//! A logged-out access token stays cryptographically valid until its `exp`.
//! The revocation store remembers such tokens until that moment so the token
//! service can reject them immediately.
//!
//! # Eviction contract
//!
//! - `add` is idempotent and keeps the later of two expiries for the same key.
//! - An entry stays present until a `sweep` whose `now` is at or after its
//!   expiry, or until the process exits. Nothing re-adds a swept entry.
//! - `sweep` runs on a timer (see [`spawn_revocation_sweeper`]), never on the
//!   request path.
//!
//! Presence is only a fast reject. Every validation also checks signature and
//! expiry, so an expired entry that has not been swept yet changes nothing.
//!
//! Keys are the hex SHA-256 digest of the token string (see
//! [`revocation_key`]), so raw bearer tokens are not kept in memory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::AuthResult;

/// Storage trait for revoked access tokens.
///
/// The in-process implementation is [`InMemoryRevocationStore`]. A shared
/// store (for several server replicas) implements the same trait and is
/// swapped in without touching the token service.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Marks a token as revoked until `expires_at`.
    ///
    /// # Idempotency
    ///
    /// Adding an already-present key succeeds. The stored expiry becomes the
    /// later of the two, so a stale second insert cannot shorten the entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn add(&self, token_key: &str, expires_at: OffsetDateTime) -> AuthResult<()>;

    /// Returns `true` if the key has been revoked and not yet swept.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn contains(&self, token_key: &str) -> AuthResult<bool>;

    /// Removes every entry whose expiry is at or before `now`.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn sweep(&self, now: OffsetDateTime) -> AuthResult<u64>;
}

/// Computes the revocation key of a token.
#[must_use]
pub fn revocation_key(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// In-process revocation store on a sharded concurrent map.
///
/// Readers and writers on different shards never contend; a sweep locks one
/// shard at a time.
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    entries: DashMap<String, OffsetDateTime>,
}

impl InMemoryRevocationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, swept or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn add(&self, token_key: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        self.entries
            .entry(token_key.to_string())
            .and_modify(|current| {
                if expires_at > *current {
                    *current = expires_at;
                }
            })
            .or_insert(expires_at);
        Ok(())
    }

    async fn contains(&self, token_key: &str) -> AuthResult<bool> {
        Ok(self.entries.contains_key(token_key))
    }

    async fn sweep(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut removed = 0u64;
        self.entries.retain(|_, expires_at| {
            let keep = *expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

/// Starts the background task that sweeps `store` every `interval`.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. A zero interval is raised to one second.
pub fn spawn_revocation_sweeper(
    store: Arc<dyn RevocationStore>,
    interval: Duration,
) -> JoinHandle<()> {
    let period = interval.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match store.sweep(OffsetDateTime::now_utc()).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Swept expired revocation entries");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Revocation sweep failed");
                }
                _ => {}
            }
        }
    })
}
