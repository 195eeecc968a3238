//! SQLite-backed `Store` adapter.
//!
//! Grounded on the pack's `hi-youichi-loom` workspace, where `rusqlite`
//! (bundled) is the standard local-persistence choice across five member
//! crates. A single `kv` table holds the raw namespace+key+value triples.
//! Each write is one auto-committing statement, itself durable on return
//! per SQLite's default transaction behavior; the shared `Mutex<Connection>`
//! serializes callers, so "durable before return" (spec §4.A) holds under
//! concurrent callers without a separate `BEGIN IMMEDIATE`.

use super::{full_key, Store, StoreError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if integrity != "ok" {
            log::error!("store: integrity_check failed: {integrity}");
            return Err(StoreError::CorruptedPartition);
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                full_key TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                sub_key TEXT NOT NULL,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full = full_key(namespace, key)?;
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT value FROM kv WHERE full_key = ?1", params![full], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let full = full_key(namespace, key)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (full_key, namespace, sub_key, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(full_key) DO UPDATE SET value = excluded.value",
            params![full, namespace, key, value],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let full = full_key(namespace, key)?;
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE full_key = ?1", params![full])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn iterate(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT sub_key, value FROM kv WHERE namespace = ?1")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_and_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("cc", "model", b"claude").await.unwrap();
        assert_eq!(
            store.get("cc", "model").await.unwrap(),
            Some(b"claude".to_vec())
        );
        store.put("cc", "model", b"gpt").await.unwrap();
        assert_eq!(store.get("cc", "model").await.unwrap(), Some(b"gpt".to_vec()));
    }

    #[tokio::test]
    async fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put("tz", "posix", b"America/Los_Angeles").await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("tz", "posix").await.unwrap(),
            Some(b"America/Los_Angeles".to_vec())
        );
    }

    #[tokio::test]
    async fn iterate_scoped_to_namespace() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("cron", "1", b"a").await.unwrap();
        store.put("cron", "2", b"b").await.unwrap();
        store.put("u", "x", b"c").await.unwrap();
        let entries = store.iterate("cron").await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
