//! Local store connection and key-value access

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::migrations;
use crate::error::{Error, Result};
use crate::util::unix_millis_now;

/// Default per-value size limit, in line with browser storage quotas.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 5 * 1024 * 1024;

/// Write limits applied by the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Largest serialized value accepted by `write`
    pub max_value_bytes: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

/// Durable key-value store holding the local working snapshot.
///
/// Values are JSON text. Reads never fail on malformed JSON: the caller's
/// default is returned and a warning is logged.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    limits: StoreLimits,
}

impl LocalStore {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, StoreLimits::default())
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, StoreLimits::default())
    }

    fn from_connection(conn: Connection, limits: StoreLimits) -> Result<Self> {
        Self::configure(&conn)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            limits,
        })
    }

    /// Replace the write limits
    #[must_use]
    pub const fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Configure `SQLite` for a single-writer local store
    fn configure(conn: &Connection) -> Result<()> {
        // In-memory databases reject WAL; that is fine.
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the raw JSON text stored under `key`.
    pub fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Read and decode `key`, returning `None` when absent or malformed.
    pub fn read_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.read_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                tracing::warn!("Ignoring malformed value for '{}': {}", key, error);
                Ok(None)
            }
        }
    }

    /// Read and decode `key`, falling back to `T::default()`.
    pub fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(self.read_opt(key)?.unwrap_or_default())
    }

    /// Encode and write `value` under `key`.
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.check_size(key, &raw)?;
        let conn = self.connection();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, raw, unix_millis_now()],
        )?;
        Ok(())
    }

    /// Write several keys atomically.
    pub fn write_all(&self, entries: &[(&str, serde_json::Value)]) -> Result<()> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let raw = serde_json::to_string(value)?;
            self.check_size(key, &raw)?;
            encoded.push((*key, raw));
        }

        let mut conn = self.connection();
        let tx = conn.transaction()?;
        let now = unix_millis_now();
        for (key, raw) in &encoded {
            tx.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, raw, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove `key` if present.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.connection();
        conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
        Ok(())
    }

    fn check_size(&self, key: &str, raw: &str) -> Result<()> {
        if raw.len() > self.limits.max_value_bytes {
            return Err(Error::QuotaExceeded {
                key: key.to_string(),
                size: raw.len(),
                limit: self.limits.max_value_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn read_missing_key_returns_default() {
        let store = LocalStore::open_in_memory().unwrap();
        let value: Sample = store.read("missing").unwrap();
        assert_eq!(value, Sample::default());
        assert!(store.read_opt::<Sample>("missing").unwrap().is_none());
    }

    #[test]
    fn write_then_read() {
        let store = LocalStore::open_in_memory().unwrap();
        let sample = Sample {
            name: "memo".to_string(),
            count: 3,
        };
        store.write("sample", &sample).unwrap();
        store.write("sample", &sample).unwrap();
        assert_eq!(store.read::<Sample>("sample").unwrap(), sample);
    }

    #[test]
    fn malformed_value_falls_back_to_default() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('broken', '{not json', 0)",
                [],
            )
            .unwrap();
        assert_eq!(store.read::<Sample>("broken").unwrap(), Sample::default());
    }

    #[test]
    fn oversized_write_is_rejected() {
        let store = LocalStore::open_in_memory().unwrap().with_limits(StoreLimits {
            max_value_bytes: 16,
        });
        let error = store.write("big", &"x".repeat(64)).unwrap_err();
        assert!(matches!(error, Error::QuotaExceeded { .. }));
        assert!(store.read_raw("big").unwrap().is_none());
    }

    #[test]
    fn write_all_is_atomic_on_quota_failure() {
        let store = LocalStore::open_in_memory().unwrap().with_limits(StoreLimits {
            max_value_bytes: 16,
        });
        let result = store.write_all(&[
            ("small", serde_json::json!(1)),
            ("big", serde_json::json!("x".repeat(64))),
        ]);
        assert!(result.is_err());
        assert!(store.read_raw("small").unwrap().is_none());
    }

    #[test]
    fn reopen_from_disk_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memo.db");
        {
            let store = LocalStore::open(&path).unwrap();
            store.write("count", &7_u32).unwrap();
        }
        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.read::<u32>("count").unwrap(), 7);
    }
}
