//! The key-value store trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreResult;

/// Token proving ownership of a named lock.
///
/// Returned by [`KvStore::try_lock`] and required by [`KvStore::unlock`] so a
/// worker that lost its lock to the hold timeout cannot release a later
/// holder's acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(pub Uuid);

impl LockToken {
    /// Create a fresh random token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for the backing key-value store.
///
/// All durable workflow state flows through this interface. Implementations
/// must make each operation atomic; no multi-key transaction is required
/// because the engine's state machine is monotonic.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete a key (string or hash). Returns whether it existed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Check whether a key (string or hash) exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Get a single field of a hash.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Set a single field of a hash, creating the hash if needed.
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Get every value of a hash.
    async fn hvals(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Check whether a hash contains a field.
    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Enumerate the field/value pairs of a hash.
    ///
    /// Callers probing for "any entry" take the first pair.
    async fn hscan(&self, key: &str) -> StoreResult<Vec<(String, String)>>;

    /// Enumerate keys matching a `prefix:*` pattern, sorted.
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Apply a time-to-live to a key (string or hash). Returns whether the
    /// key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Attempt to take the named advisory lock without waiting.
    ///
    /// Returns a token when the lock was free (or its previous holder
    /// exceeded `max_hold`), `None` when currently held.
    async fn try_lock(&self, name: &str, max_hold: Duration) -> StoreResult<Option<LockToken>>;

    /// Release a named lock. Returns `false` when the token no longer holds
    /// the lock (expired hold or never acquired).
    async fn unlock(&self, name: &str, token: &LockToken) -> StoreResult<bool>;
}

/// Extract the literal prefix of a `prefix:*` scan pattern.
pub(crate) fn scan_prefix(pattern: &str) -> &str {
    pattern.strip_suffix('*').unwrap_or(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_token_unique() {
        assert_ne!(LockToken::new(), LockToken::new());
    }

    #[test]
    fn test_scan_prefix() {
        assert_eq!(scan_prefix("workflows:*"), "workflows:");
        assert_eq!(scan_prefix("jobs:abc:*"), "jobs:abc:");
        assert_eq!(scan_prefix("exact-key"), "exact-key");
    }
}
