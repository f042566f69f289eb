//! SQLite-backed store shared by worker processes on one host.
//!
//! Every operation is a single SQL statement, so SQLite's own write lock makes it
//! atomic across processes. The store clock is SQLite's `julianday('now')`, which all
//! workers read through the same function.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::{Store, StoreError, StoreResult};

/// Seconds since the Unix epoch, with sub-second precision
const NOW_SQL: &str = "((julianday('now') - 2440587.5) * 86400.0)";

/// How long a statement waits on another process holding the database write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval of a blocking pop
const POP_POLL_INTERVAL: Duration = Duration::from_millis(50);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS locks (
        name TEXT PRIMARY KEY,
        token TEXT NOT NULL,
        expires_at REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        payload TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_queue_name ON queue (name, id);
";

/// SQLite coordination store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn try_pop(&self, queue: &str) -> StoreResult<Option<String>> {
        let payload = self
            .conn()?
            .query_row(
                "DELETE FROM queue
                 WHERE id = (SELECT id FROM queue WHERE name = ?1 ORDER BY id LIMIT 1)
                 RETURNING payload",
                params![queue],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }
}

impl Store for SqliteStore {
    fn now(&self) -> StoreResult<f64> {
        let now = self
            .conn()?
            .query_row(&format!("SELECT {}", NOW_SQL), [], |row| row.get(0))?;
        Ok(now)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let written = self.conn()?.execute(
            "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(written == 1)
    }

    fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let sql = format!(
            "INSERT INTO locks (name, token, expires_at) VALUES (?1, ?2, {now} + ?3)
             ON CONFLICT (name) DO UPDATE
                SET token = excluded.token, expires_at = excluded.expires_at
                WHERE locks.expires_at <= {now}",
            now = NOW_SQL
        );
        let taken = self
            .conn()?
            .execute(&sql, params![name, token, ttl.as_secs_f64()])?;
        Ok(taken == 1)
    }

    fn unlock(&self, name: &str, token: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "DELETE FROM locks WHERE name = ?1 AND token = ?2",
            params![name, token],
        )?;
        Ok(())
    }

    fn push(&self, queue: &str, payload: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO queue (name, payload) VALUES (?1, ?2)",
            params![queue, payload],
        )?;
        Ok(())
    }

    fn pop(&self, queue: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(payload) = self.try_pop(queue)? {
                return Ok(Some(payload));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POP_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn len(&self, queue: &str) -> StoreResult<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM queue WHERE name = ?1",
            params![queue],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
