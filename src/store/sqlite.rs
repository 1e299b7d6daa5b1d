//! Durable backend: one SQLite file per logical store, holding a single
//! record set (table) of JSON-encoded values keyed by identifier.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Serialize, de::DeserializeOwned};

use super::types::{Store, StoreError, StoreResult};

pub struct SqliteStore<T> {
    conn: Mutex<Connection>,
    bucket: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqliteStore<T> {
    pub fn open(path: impl AsRef<Path>, bucket: &str) -> StoreResult<Self> {
        if bucket.is_empty()
            || !bucket
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::InvalidBucket(bucket.to_string()));
        }

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
            bucket
        ))?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
            bucket: bucket.to_string(),
            _marker: PhantomData,
        })
    }

    fn with_connection<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Connection) -> StoreResult<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        f(&conn)
    }
}

impl<T> Store<T> for SqliteStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn put(&self, key: &str, value: &T) -> StoreResult<()> {
        let buf = serde_json::to_string(value)?;
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.bucket
        );
        self.with_connection(|conn| {
            conn.execute(&sql, params![key, buf])?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StoreResult<Option<T>> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", self.bucket);
        let raw: Option<String> = self.with_connection(|conn| {
            Ok(conn
                .query_row(&sql, params![key], |row| row.get(0))
                .optional()?)
        })?;

        match raw {
            Some(buf) => Ok(Some(serde_json::from_str(&buf)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> StoreResult<Vec<T>> {
        let sql = format!("SELECT value FROM {} ORDER BY key", self.bucket);
        let rows: Vec<String> = self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.iter()
            .map(|buf| serde_json::from_str(buf).map_err(StoreError::from))
            .collect()
    }

    fn count(&self) -> StoreResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.bucket);
        let count: i64 = self.with_connection(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))?;
        Ok(count as usize)
    }
}
