//! Store URL parsing and the engine-owned connection cache.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use crate::store::KvStore;

/// Open a store from a URL.
///
/// Recognized forms:
/// - `memory:` for a fresh [`MemoryStore`]
/// - `sqlite::memory:` for an in-memory [`SqliteStore`]
/// - `sqlite:<path>` for an on-disk [`SqliteStore`]
pub fn connect(url: &str) -> StoreResult<Arc<dyn KvStore>> {
    if url == "memory:" || url == "memory://" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url == "sqlite::memory:" {
        return Ok(Arc::new(SqliteStore::in_memory()?));
    }
    if let Some(path) = url.strip_prefix("sqlite:") {
        if path.is_empty() {
            return Err(StoreError::InvalidUrl(url.to_string()));
        }
        return Ok(Arc::new(SqliteStore::open(path)?));
    }
    Err(StoreError::InvalidUrl(url.to_string()))
}

/// One cached store connection, keyed by URL.
///
/// Owned by the engine instance rather than living in module-level state;
/// the connection is re-established whenever the configured URL changes.
#[derive(Default)]
pub struct StoreCache {
    cached: Mutex<Option<(String, Arc<dyn KvStore>)>>,
}

impl StoreCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the connection for `url`, reusing the cached one when the URL
    /// is unchanged.
    pub async fn get(&self, url: &str) -> StoreResult<Arc<dyn KvStore>> {
        let mut cached = self.cached.lock().await;
        if let Some((cached_url, store)) = cached.as_ref() {
            if cached_url == url {
                return Ok(store.clone());
            }
            info!(old = %cached_url, new = %url, "store URL changed, reconnecting");
        }
        let store = connect(url)?;
        *cached = Some((url.to_string(), store.clone()));
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_urls() {
        assert!(connect("memory:").is_ok());
        assert!(connect("sqlite::memory:").is_ok());
        assert!(connect("redis://localhost").is_err());
        assert!(connect("sqlite:").is_err());
    }

    #[tokio::test]
    async fn test_cache_reuses_connection() {
        let cache = StoreCache::new();

        let a = cache.get("memory:").await.unwrap();
        a.set("k", "v").await.unwrap();

        // Same URL: same store instance, the value is visible.
        let b = cache.get("memory:").await.unwrap();
        assert_eq!(b.get("k").await.unwrap().as_deref(), Some("v"));

        // Different URL: fresh connection.
        let c = cache.get("sqlite::memory:").await.unwrap();
        assert!(c.get("k").await.unwrap().is_none());
    }
}
