//! Cross-process rate limiting for the search provider.
//!
//! Simplified Generic Cell Rate Algorithm: the store holds the theoretical arrival
//! time (TAT) of the next permitted request under `rate_key`. A caller is granted a
//! slot when the TAT is not in the future on the store's clock, and then pushes the
//! TAT one `separation` ahead. The read-then-write runs under a store lock scoped to
//! the key; failing to get that lock counts as a denial, so the limiter can only
//! under-grant.

use anyhow::{Context, Result};
use log::debug;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::store::{LockGuard, Store};

/// Lifetime of the rate lock if its holder dies without releasing it
const LOCK_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Store key holding the TAT; the lock is `lock:<rate_key>`
    pub rate_key: String,
    /// Seconds between granted requests
    pub separation: f64,
    /// Longest wait for the rate lock before the attempt counts as denied
    pub lock_timeout: Duration,
    /// Back-off between attempts in [`RateLimiter::wait`]
    pub poll_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_key: "base-ratelimit".to_string(),
            // provider allows one request per second; the extra 0.1s absorbs polling jitter
            separation: 1.1,
            lock_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn Store>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock_name(&self) -> String {
        format!("lock:{}", self.config.rate_key)
    }

    /// Try to take the next request slot; `false` means the caller must back off
    pub fn acquire(&self) -> Result<bool> {
        let key = &self.config.rate_key;
        let now = self.store.now().context("Failed to read store clock")?;
        self.store
            .set_if_absent(key, "0")
            .with_context(|| format!("Failed to seed rate key {}", key))?;

        let lock_name = self.lock_name();
        let guard = LockGuard::acquire(
            self.store.as_ref(),
            &lock_name,
            self.config.lock_timeout,
            LOCK_TTL,
        )
        .with_context(|| format!("Failed to acquire {}", lock_name))?;
        let Some(_guard) = guard else {
            debug!("Rate lock {} unavailable, treating as limited", lock_name);
            return Ok(false);
        };

        let stored = self
            .store
            .get(key)
            .with_context(|| format!("Failed to read rate key {}", key))?;
        let stored: f64 = match stored {
            Some(value) => value
                .parse()
                .with_context(|| format!("Rate key {} holds a non-numeric value: {}", key, value))?,
            None => 0.0,
        };

        let tat = stored.max(now);
        if tat - now <= 0.0 {
            let next = tat.max(now) + self.config.separation;
            self.store
                .set(key, &next.to_string())
                .with_context(|| format!("Failed to update rate key {}", key))?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Block until a slot is granted
    pub fn wait(&self) -> Result<()> {
        while !self.acquire()? {
            debug!("Request is limited");
            thread::sleep(self.config.poll_interval);
        }
        Ok(())
    }
}
