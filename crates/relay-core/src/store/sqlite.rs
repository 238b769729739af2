use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CasOutcome, KvEntry, KvStore};
use crate::{errors::Error, Result};

/// SQLite-backed store: one `kv` table, one row per key.
#[derive(Clone)]
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                revision INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Store("sqlite connection poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| Error::Store(format!("sqlite task failed: {e}")))?
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT value, revision FROM kv WHERE key = ?1",
                    params![key],
                    |r| {
                        Ok(KvEntry {
                            value: r.get(0)?,
                            revision: r.get::<_, i64>(1)? as u64,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn compare_and_put(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<CasOutcome> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let (changed, revision) = match expected {
                None => (
                    conn.execute(
                        "INSERT OR IGNORE INTO kv (key, value, revision) VALUES (?1, ?2, 1)",
                        params![key, value],
                    )?,
                    1,
                ),
                Some(rev) => (
                    conn.execute(
                        "UPDATE kv SET value = ?2, revision = revision + 1
                         WHERE key = ?1 AND revision = ?3",
                        params![key, value, rev as i64],
                    )?,
                    rev + 1,
                ),
            };

            if changed == 0 {
                return Ok(CasOutcome::Conflict);
            }
            Ok(CasOutcome::Written { revision })
        })
        .await
    }
}
