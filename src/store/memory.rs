use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::{Store, StoreError, StoreResult};

enum Clock {
    System,
    Manual(Mutex<f64>),
}

#[derive(Default)]
struct State {
    values: HashMap<String, String>,
    /// name -> (token, expires_at)
    locks: HashMap<String, (String, f64)>,
    queues: HashMap<String, VecDeque<String>>,
}

/// In-process store for a single worker or for tests
pub struct MemoryStore {
    state: Mutex<State>,
    pushed: Condvar,
    clock: Clock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Clock::System)
    }

    /// A store whose clock only moves through [`MemoryStore::advance`]
    pub fn with_manual_clock(start: f64) -> Self {
        Self::with_clock(Clock::Manual(Mutex::new(start)))
    }

    fn with_clock(clock: Clock) -> Self {
        Self {
            state: Mutex::new(State::default()),
            pushed: Condvar::new(),
            clock,
        }
    }

    /// Move a manual clock forward; no-op on the system clock
    pub fn advance(&self, secs: f64) {
        if let Clock::Manual(time) = &self.clock {
            if let Ok(mut time) = time.lock() {
                *time += secs;
            }
        }
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn now(&self) -> StoreResult<f64> {
        match &self.clock {
            Clock::System => Ok(SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0)),
            Clock::Manual(time) => time.lock().map(|t| *t).map_err(|_| StoreError::Poisoned),
        }
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.state()?.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.state()?
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut state = self.state()?;
        if state.values.contains_key(key) {
            return Ok(false);
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.now()?;
        let mut state = self.state()?;
        if let Some((_, expires_at)) = state.locks.get(name) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        state
            .locks
            .insert(name.to_string(), (token.to_string(), now + ttl.as_secs_f64()));
        Ok(true)
    }

    fn unlock(&self, name: &str, token: &str) -> StoreResult<()> {
        let mut state = self.state()?;
        if state.locks.get(name).is_some_and(|(held, _)| held == token) {
            state.locks.remove(name);
        }
        Ok(())
    }

    fn push(&self, queue: &str, payload: &str) -> StoreResult<()> {
        self.state()?
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.pushed.notify_all();
        Ok(())
    }

    fn pop(&self, queue: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state()?;
        loop {
            if let Some(payload) = state.queues.get_mut(queue).and_then(|q| q.pop_front()) {
                return Ok(Some(payload));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .pushed
                .wait_timeout(state, deadline - now)
                .map_err(|_| StoreError::Poisoned)?
                .0;
        }
    }

    fn len(&self, queue: &str) -> StoreResult<usize> {
        Ok(self.state()?.queues.get(queue).map_or(0, VecDeque::len))
    }
}
