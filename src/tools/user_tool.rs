//! User-defined tool lifecycle (spec §3, §4.D).
//!
//! Persisted as `{name, description, action-text}` triplets under the
//! `ut_*` namespace, one JSON blob per slot (`ut_0`..`ut_15`) since tool
//! names may run to 32 bytes, past the store's 15-byte key limit.
//! Resolution of a user tool's action-text at call time (re-feeding it as a
//! user-level directive inside a fresh bounded sub-loop) is the agent
//! loop's responsibility, not this module's.

use super::{require_str, ToolError, ToolHandler};
use crate::store::{namespace, Store};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Maximum number of user-defined tools resident at once (K ≤ 16, spec §3).
pub const MAX_USER_TOOLS: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserTool {
    pub name: String,
    pub description: String,
    pub action: String,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

async fn load_slots(store: &Arc<dyn Store>) -> Result<Vec<(String, UserTool)>, ToolError> {
    let raw = store.iterate(namespace::USER_TOOLS).await?;
    let mut slots = Vec::new();
    for (key, bytes) in raw {
        if let Ok(tool) = serde_json::from_slice::<UserTool>(&bytes) {
            slots.push((key, tool));
        }
    }
    Ok(slots)
}

fn free_slot(slots: &[(String, UserTool)]) -> Option<String> {
    (0..MAX_USER_TOOLS)
        .map(|i| i.to_string())
        .find(|candidate| !slots.iter().any(|(k, _)| k == candidate))
}

pub async fn create_tool(
    store: &Arc<dyn Store>,
    name: &str,
    description: &str,
    action: &str,
    replace: bool,
) -> Result<(), ToolError> {
    if !valid_name(name) {
        return Err(ToolError::InvalidArgument {
            field: "name".to_string(),
            reason: "must be 1-32 chars of [A-Za-z0-9_]".to_string(),
        });
    }
    if action.len() > 256 {
        return Err(ToolError::InvalidArgument {
            field: "action".to_string(),
            reason: "must be at most 256 bytes".to_string(),
        });
    }

    let slots = load_slots(store).await?;
    if let Some((key, _)) = slots.iter().find(|(_, t)| t.name == name) {
        if !replace {
            return Err(ToolError::DuplicateName(name.to_string()));
        }
        let tool = UserTool {
            name: name.to_string(),
            description: description.to_string(),
            action: action.to_string(),
        };
        store
            .put(namespace::USER_TOOLS, key, &serde_json::to_vec(&tool).unwrap())
            .await?;
        return Ok(());
    }

    let slot = free_slot(&slots).ok_or_else(|| {
        ToolError::InvalidArgument {
            field: "name".to_string(),
            reason: format!("at most {MAX_USER_TOOLS} user tools may be registered"),
        }
    })?;
    let tool = UserTool {
        name: name.to_string(),
        description: description.to_string(),
        action: action.to_string(),
    };
    store
        .put(namespace::USER_TOOLS, &slot, &serde_json::to_vec(&tool).unwrap())
        .await?;
    Ok(())
}

pub async fn list_user_tools(store: &Arc<dyn Store>) -> Result<Vec<UserTool>, ToolError> {
    let mut slots = load_slots(store).await?;
    slots.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(slots.into_iter().map(|(_, t)| t).collect())
}

pub async fn delete_user_tool(store: &Arc<dyn Store>, name: &str) -> Result<(), ToolError> {
    let slots = load_slots(store).await?;
    match slots.iter().find(|(_, t)| t.name == name) {
        Some((key, _)) => {
            store.delete(namespace::USER_TOOLS, key).await?;
            Ok(())
        }
        None => Err(ToolError::Handler(format!("no such user tool: {name}"))),
    }
}

pub struct CreateToolTool {
    store: Arc<dyn Store>,
}

impl CreateToolTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for CreateToolTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let name = require_str(input, "name")?;
        let description = require_str(input, "description")?;
        let action = require_str(input, "action")?;
        let replace = input.get("replace").and_then(|v| v.as_bool()).unwrap_or(false);
        create_tool(&self.store, name, description, action, replace).await?;
        Ok(format!("tool {name} registered"))
    }
}

pub struct ListUserToolsTool {
    store: Arc<dyn Store>,
}

impl ListUserToolsTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for ListUserToolsTool {
    async fn handle(&self, _input: &Value) -> Result<String, ToolError> {
        let tools = list_user_tools(&self.store).await?;
        Ok(tools
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(","))
    }
}

pub struct DeleteUserToolTool {
    store: Arc<dyn Store>,
}

impl DeleteUserToolTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for DeleteUserToolTool {
    async fn handle(&self, input: &Value) -> Result<String, ToolError> {
        let name = require_str(input, "name")?;
        delete_user_tool(&self.store, name).await?;
        Ok(format!("tool {name} deleted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn creates_and_lists_tool() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        create_tool(&store, "greet", "says hi", "reply with a greeting", false)
            .await
            .unwrap();
        let tools = list_user_tools(&store).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "greet");
    }

    #[tokio::test]
    async fn duplicate_without_replace_fails() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        create_tool(&store, "greet", "a", "b", false).await.unwrap();
        let err = create_tool(&store, "greet", "a2", "b2", false).await.unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn duplicate_with_replace_overwrites() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        create_tool(&store, "greet", "a", "b", false).await.unwrap();
        create_tool(&store, "greet", "a2", "b2", true).await.unwrap();
        let tools = list_user_tools(&store).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "a2");
    }

    #[tokio::test]
    async fn caps_at_k_entries() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        for i in 0..MAX_USER_TOOLS {
            create_tool(&store, &format!("t{i}"), "d", "a", false).await.unwrap();
        }
        let err = create_tool(&store, "overflow", "d", "a", false).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn delete_removes_tool() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        create_tool(&store, "greet", "a", "b", false).await.unwrap();
        delete_user_tool(&store, "greet").await.unwrap();
        assert!(list_user_tools(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_name() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let err = create_tool(&store, "bad name!", "a", "b", false).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument { field, .. } if field == "name"));
    }
}
