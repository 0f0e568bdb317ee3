//! In-memory store for development and testing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::store::{scan_prefix, KvStore, LockToken};

#[derive(Debug)]
struct StringEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct HashEntry {
    fields: FxHashMap<String, String>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct LockEntry {
    token: LockToken,
    held_until: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    strings: FxHashMap<String, StringEntry>,
    hashes: FxHashMap<String, HashEntry>,
    locks: FxHashMap<String, LockEntry>,
}

fn live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_none_or(|t| t > now)
}

impl Tables {
    /// Drop every expired entry. Called from write paths; read paths just
    /// treat expired entries as absent.
    fn purge(&mut self, now: DateTime<Utc>) {
        self.strings.retain(|_, e| live(e.expires_at, now));
        self.hashes.retain(|_, e| live(e.expires_at, now));
        self.locks.retain(|_, e| e.held_until > now);
    }
}

/// In-memory key-value store.
///
/// Backed by `FxHashMap` tables behind a `tokio` RwLock. Expiry is lazy:
/// expired entries are invisible to reads and physically removed on the next
/// write. Suitable for development and tests, not for durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Utc::now();
        let tables = self.tables.read().await;
        Ok(tables
            .strings
            .get(key)
            .filter(|e| live(e.expires_at, now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        tables.purge(now);
        tables.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        tables.purge(now);
        let had_string = tables.strings.remove(key).is_some();
        let had_hash = tables.hashes.remove(key).is_some();
        Ok(had_string || had_hash)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = Utc::now();
        let tables = self.tables.read().await;
        let string = tables
            .strings
            .get(key)
            .is_some_and(|e| live(e.expires_at, now));
        let hash = tables
            .hashes
            .get(key)
            .is_some_and(|e| live(e.expires_at, now));
        Ok(string || hash)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let now = Utc::now();
        let tables = self.tables.read().await;
        Ok(tables
            .hashes
            .get(key)
            .filter(|e| live(e.expires_at, now))
            .and_then(|e| e.fields.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        tables.purge(now);
        tables
            .hashes
            .entry(key.to_string())
            .or_default()
            .fields
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hvals(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .hscan(key)
            .await?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.hget(key, field).await?.is_some())
    }

    async fn hscan(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        let now = Utc::now();
        let tables = self.tables.read().await;
        let mut pairs: Vec<_> = tables
            .hashes
            .get(key)
            .filter(|e| live(e.expires_at, now))
            .map(|e| {
                e.fields
                    .iter()
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        pairs.sort();
        Ok(pairs)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let prefix = scan_prefix(pattern);
        let now = Utc::now();
        let tables = self.tables.read().await;
        let mut keys: Vec<String> = tables
            .strings
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && live(e.expires_at, now))
            .map(|(k, _)| k.clone())
            .chain(
                tables
                    .hashes
                    .iter()
                    .filter(|(k, e)| k.starts_with(prefix) && live(e.expires_at, now))
                    .map(|(k, _)| k.clone()),
            )
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Utc::now();
        let deadline = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut tables = self.tables.write().await;
        tables.purge(now);
        let mut found = false;
        if let Some(entry) = tables.strings.get_mut(key) {
            entry.expires_at = Some(deadline);
            found = true;
        }
        if let Some(entry) = tables.hashes.get_mut(key) {
            entry.expires_at = Some(deadline);
            found = true;
        }
        Ok(found)
    }

    async fn try_lock(&self, name: &str, max_hold: Duration) -> StoreResult<Option<LockToken>> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        if tables.locks.get(name).is_some_and(|e| e.held_until > now) {
            return Ok(None);
        }
        let token = LockToken::new();
        let held_until =
            now + chrono::Duration::from_std(max_hold).unwrap_or(chrono::Duration::MAX);
        tables.locks.insert(
            name.to_string(),
            LockEntry {
                token: token.clone(),
                held_until,
            },
        );
        Ok(Some(token))
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> StoreResult<bool> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        match tables.locks.get(name) {
            Some(e) if e.token == *token && e.held_until > now => {
                tables.locks.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
