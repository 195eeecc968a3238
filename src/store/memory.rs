//! In-memory `Store`, used by unit tests and as the safe-mode fallback when
//! `StoreCorruption` has taken the real backend offline.

use super::{full_key, Store, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full = full_key(namespace, key)?;
        Ok(self.data.lock().unwrap().get(&full).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let full = full_key(namespace, key)?;
        self.data.lock().unwrap().insert(full, value.to_vec());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let full = full_key(namespace, key)?;
        self.data.lock().unwrap().remove(&full);
        Ok(())
    }

    async fn iterate(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let prefix = format!("{namespace}_");
        let data = self.data.lock().unwrap();
        Ok(data
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect())
    }
}
