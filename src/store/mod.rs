//! Persistent namespaced key-value store (spec §4.A).
//!
//! The storage *engine* is an out-of-scope external collaborator — on real
//! hardware this would be the device's flash-backed NVS. `Store` is the
//! narrow contract the rest of the crate depends on; [`sqlite::SqliteStore`]
//! is the concrete adapter used for a buildable, testable artifact, and
//! [`memory::MemoryStore`] backs unit tests and safe-mode fallback.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

/// Namespaces enumerated in spec §4.A. Keys are always `<namespace prefix>_<rest>`.
pub mod namespace {
    pub const USER_MEMORY: &str = "u";
    pub const CHAT_CONFIG: &str = "tc";
    pub const LLM_CONFIG: &str = "cc";
    pub const SCHEDULER: &str = "cron";
    pub const TIMEZONE: &str = "tz";
    pub const BOOT: &str = "boot";
    pub const USER_TOOLS: &str = "ut";
}

/// Keys are limited to 15 bytes of ASCII (spec §4.A), counting the whole
/// `<namespace>_<key>` string as it is persisted.
pub const MAX_KEY_BYTES: usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("capacity exceeded")]
    CapacityExceeded,

    #[error("corrupted partition")]
    CorruptedPartition,

    #[error("key {0:?} exceeds {MAX_KEY_BYTES} bytes")]
    KeyTooLong(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Build the full on-disk key from a namespace and sub-key, validating the
/// 15-byte ASCII limit.
pub fn full_key(ns: &str, key: &str) -> Result<String, StoreError> {
    let full = format!("{ns}_{key}");
    if !full.is_ascii() || full.len() > MAX_KEY_BYTES {
        return Err(StoreError::KeyTooLong(full));
    }
    Ok(full)
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;
    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError>;
    /// List `(key, value)` pairs in a namespace, key returned without its
    /// namespace prefix.
    async fn iterate(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Convenience: fetch and decode a UTF-8 string value.
    async fn get_string(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        match self.get(namespace, key).await? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).map_err(|_| StoreError::CorruptedPartition)?,
            )),
            None => Ok(None),
        }
    }

    async fn put_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(namespace, key, value.as_bytes()).await
    }
}
