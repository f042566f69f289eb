//! Coordination store shared by all workers: rate-limit state, locks, job queues and result slots.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use log::warn;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Interval between attempts while waiting for a lock
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store state poisoned by a panicking thread")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value, lock and queue operations the worker needs from its shared store
pub trait Store: Send + Sync {
    /// Current time on the store's clock, in seconds since the Unix epoch
    fn now(&self) -> StoreResult<f64>;

    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Set a key only if it does not exist yet; returns whether it was written
    fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Take the named lock for `token` if it is free or its holder expired
    fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> StoreResult<bool>;

    /// Release the named lock if `token` still holds it
    fn unlock(&self, name: &str, token: &str) -> StoreResult<()>;

    /// Append a payload to the tail of a queue
    fn push(&self, queue: &str, payload: &str) -> StoreResult<()>;

    /// Pop the head of a queue, waiting up to `timeout` for one to arrive
    fn pop(&self, queue: &str, timeout: Duration) -> StoreResult<Option<String>>;

    fn len(&self, queue: &str) -> StoreResult<usize>;
}

/// Held lock on a store; released when dropped, on every exit path
pub struct LockGuard<'a> {
    store: &'a dyn Store,
    name: String,
    token: String,
}

impl<'a> LockGuard<'a> {
    /// Try to take the lock, waiting at most `wait`; `None` when it stayed taken
    pub fn acquire(
        store: &'a dyn Store,
        name: &str,
        wait: Duration,
        ttl: Duration,
    ) -> StoreResult<Option<Self>> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;

        loop {
            if store.try_lock(name, &token, ttl)? {
                return Ok(Some(Self {
                    store,
                    name: name.to_string(),
                    token,
                }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(LOCK_RETRY_INTERVAL.min(deadline - now));
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.unlock(&self.name, &self.token) {
            warn!("Failed to release lock {}: {}", self.name, e);
        }
    }
}
