//! `memory_put` / `memory_get` / `memory_list` / `memory_delete` built-ins
//! (spec §4.D), persisting into the `u_*` namespace.

use super::{require_str, ToolError, ToolHandler};
use crate::store::{namespace, Store};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct MemoryPutTool {
    store: Arc<dyn Store>,
}

impl MemoryPutTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for MemoryPutTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let key = require_str(input, "key")?;
        let value = require_str(input, "value")?;
        self.store.put_string(namespace::USER_MEMORY, key, value).await?;
        Ok(format!("stored {key}"))
    }
}

pub struct MemoryGetTool {
    store: Arc<dyn Store>,
}

impl MemoryGetTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for MemoryGetTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let key = require_str(input, "key")?;
        match self.store.get_string(namespace::USER_MEMORY, key).await? {
            Some(value) => Ok(value),
            None => Err(ToolError::Handler(format!("no value stored for {key}"))),
        }
    }
}

pub struct MemoryListTool {
    store: Arc<dyn Store>,
}

impl MemoryListTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for MemoryListTool {
    async fn handle(&self, _input: &Value) -> Result<String, ToolError> {
        let entries = self.store.iterate(namespace::USER_MEMORY).await?;
        let keys: Vec<String> = entries.into_iter().map(|(k, _)| k).collect();
        Ok(keys.join(","))
    }
}

pub struct MemoryDeleteTool {
    store: Arc<dyn Store>,
}

impl MemoryDeleteTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for MemoryDeleteTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let key = require_str(input, "key")?;
        self.store.delete(namespace::USER_MEMORY, key).await?;
        Ok(format!("deleted {key}"))
    }
}
