//! SQLite-backed store for durable single-node deployments.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};
use crate::store::{scan_prefix, KvStore, LockToken};

/// SQLite-backed key-value store.
///
/// String keys, hash keys, and lock state live in three tables behind one
/// connection. rusqlite is synchronous; every operation runs a single
/// statement batch under a brief mutex, which is atomic enough for the
/// engine's monotonic state machine.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS kv_hash (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );

            CREATE TABLE IF NOT EXISTS kv_hash_expiry (
                key TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS locks (
                name TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                held_until INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_kv_hash_key ON kv_hash(key);
            "#,
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Remove entries whose TTL has passed. Runs at the top of every
    /// operation so reads never observe expired state.
    fn purge(conn: &Connection, now: i64) -> StoreResult<()> {
        conn.execute(
            "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )?;
        conn.execute(
            "DELETE FROM kv_hash WHERE key IN
                 (SELECT key FROM kv_hash_expiry WHERE expires_at <= ?1)",
            params![now],
        )?;
        conn.execute(
            "DELETE FROM kv_hash_expiry WHERE expires_at <= ?1",
            params![now],
        )?;
        conn.execute("DELETE FROM locks WHERE held_until <= ?1", params![now])?;
        Ok(())
    }

    fn like_pattern(prefix: &str) -> String {
        let mut escaped = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, NULL)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = NULL",
            params![key, value],
        )?;
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        let strings = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        let fields = conn.execute("DELETE FROM kv_hash WHERE key = ?1", params![key])?;
        conn.execute("DELETE FROM kv_hash_expiry WHERE key = ?1", params![key])?;
        Ok(strings > 0 || fields > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        let found = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)
                 OR EXISTS(SELECT 1 FROM kv_hash WHERE key = ?1)",
            params![key],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(found)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_hash WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        conn.execute(
            "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = ?3",
            params![key, field, value],
        )?;
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
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        let mut stmt =
            conn.prepare("SELECT field, value FROM kv_hash WHERE key = ?1 ORDER BY field")?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let like = Self::like_pattern(scan_prefix(pattern));
        let conn = self.lock_conn()?;
        Self::purge(&conn, Utc::now().timestamp())?;
        let mut stmt = conn.prepare(
            r#"SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\'
                   UNION
                   SELECT DISTINCT key FROM kv_hash WHERE key LIKE ?1 ESCAPE '\'
                   ORDER BY key"#,
        )?;
        let rows = stmt.query_map(params![like], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Utc::now().timestamp();
        let deadline = now.saturating_add(ttl.as_secs() as i64);
        let conn = self.lock_conn()?;
        Self::purge(&conn, now)?;
        let strings = conn.execute(
            "UPDATE kv SET expires_at = ?2 WHERE key = ?1",
            params![key, deadline],
        )?;
        let hash_exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM kv_hash WHERE key = ?1)",
            params![key],
            |row| row.get::<_, bool>(0),
        )?;
        if hash_exists {
            conn.execute(
                "INSERT INTO kv_hash_expiry (key, expires_at) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET expires_at = ?2",
                params![key, deadline],
            )?;
        }
        Ok(strings > 0 || hash_exists)
    }

    async fn try_lock(&self, name: &str, max_hold: Duration) -> StoreResult<Option<LockToken>> {
        let now = Utc::now().timestamp_millis();
        let held_until = now.saturating_add(max_hold.as_millis() as i64);
        let conn = self.lock_conn()?;
        let holder: Option<i64> = conn
            .query_row(
                "SELECT held_until FROM locks WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if holder.is_some_and(|until| until > now) {
            return Ok(None);
        }
        let token = LockToken::new();
        conn.execute(
            "INSERT INTO locks (name, token, held_until) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET token = ?2, held_until = ?3",
            params![name, token.to_string(), held_until],
        )?;
        Ok(Some(token))
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> StoreResult<bool> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock_conn()?;
        let released = conn.execute(
            "DELETE FROM locks WHERE name = ?1 AND token = ?2 AND held_until > ?3",
            params![name, token.to_string(), now],
        )?;
        Ok(released > 0)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}
