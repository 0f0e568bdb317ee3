//! Bounded-wait acquisition for named advisory locks.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{KvStore, LockToken};

/// Interval between acquisition attempts.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Acquire a named lock, polling until `acquire_timeout` elapses.
///
/// The lock auto-releases after `max_hold` even if the holder dies, so a
/// crashed worker cannot wedge its successors. Returns
/// [`StoreError::LockTimeout`] when the bounded wait runs out.
pub async fn acquire_lock(
    store: &dyn KvStore,
    name: &str,
    acquire_timeout: Duration,
    max_hold: Duration,
) -> StoreResult<LockToken> {
    let started = Instant::now();
    loop {
        if let Some(token) = store.try_lock(name, max_hold).await? {
            return Ok(token);
        }

        let waited = started.elapsed();
        if waited >= acquire_timeout {
            debug!(lock = name, waited_ms = waited.as_millis() as u64, "lock acquisition timed out");
            return Err(StoreError::LockTimeout {
                name: name.to_string(),
                waited_ms: waited.as_millis() as u64,
            });
        }

        sleep(LOCK_POLL_INTERVAL.min(acquire_timeout - waited)).await;
    }
}
