//! Tool registry: built-in table plus a late-bound user-tool overlay
//! (spec §4.C).

use super::{user_tool, ToolError, ToolHandler, UserTool};
use crate::llm::ToolDef;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What a name resolved to: a built-in with a ready handler, or a
/// user-defined tool whose action-text the agent loop must resolve itself
/// (spec §3, §9).
pub enum Dispatch {
    Builtin(Arc<dyn ToolHandler>),
    UserTool(UserTool),
}

pub struct ToolRegistry {
    builtins: HashMap<String, (ToolSpec, Arc<dyn ToolHandler>)>,
    store: Arc<dyn Store>,
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            builtins: HashMap::new(),
            store,
        }
    }

    pub fn register_builtin(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) {
        self.builtins.insert(spec.name.clone(), (spec, handler));
    }

    /// Built-in tools may never be removed (spec §4.C).
    pub fn remove_builtin(&mut self, name: &str) -> Result<(), ToolError> {
        if self.builtins.contains_key(name) {
            return Err(ToolError::Immutable(name.to_string()));
        }
        Err(ToolError::UnknownTool(name.to_string()))
    }

    /// Build the tool manifest handed to the LLM transport per request.
    pub async fn describe_all(&self) -> Result<Vec<ToolDef>, ToolError> {
        let mut defs: Vec<ToolDef> = self
            .builtins
            .values()
            .map(|(spec, _)| ToolDef {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            })
            .collect();

        let user_tools = user_tool::list_user_tools(&self.store).await?;
        defs.extend(user_tools.into_iter().map(|t| ToolDef {
            name: t.name,
            description: t.description,
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "additionalProperties": true,
            }),
        }));
        Ok(defs)
    }

    /// Resolve a tool-call's name. Unknown names yield `ToolError::UnknownTool`,
    /// which the agent loop turns into an "Unknown tool: <name>" Tool turn
    /// rather than aborting (spec §4.F).
    pub async fn resolve(&self, name: &str) -> Result<Dispatch, ToolError> {
        if let Some((_, handler)) = self.builtins.get(name) {
            return Ok(Dispatch::Builtin(handler.clone()));
        }
        let user_tools = user_tool::list_user_tools(&self.store).await?;
        if let Some(tool) = user_tools.into_iter().find(|t| t.name == name) {
            return Ok(Dispatch::UserTool(tool));
        }
        Err(ToolError::UnknownTool(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn handle(&self, input: &Value) -> Result<String, ToolError> {
            Ok(input.to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut registry = ToolRegistry::new(store);
        registry.register_builtin(
            ToolSpec {
                name: "echo".to_string(),
                description: "echoes input".to_string(),
                parameters: json!({"type": "object"}),
            },
            Arc::new(EchoHandler),
        );
        registry
    }

    #[tokio::test]
    async fn resolves_builtin() {
        let registry = registry();
        match registry.resolve("echo").await.unwrap() {
            Dispatch::Builtin(_) => {}
            _ => panic!("expected builtin"),
        }
    }

    #[tokio::test]
    async fn unknown_name_is_an_error_not_a_panic() {
        let registry = registry();
        let err = registry.resolve("does_not_exist").await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn builtins_cannot_be_removed() {
        let mut registry = registry();
        let err = registry.remove_builtin("echo").unwrap_err();
        assert!(matches!(err, ToolError::Immutable(_)));
    }

    #[tokio::test]
    async fn describe_all_includes_user_tools() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        user_tool::create_tool(&store, "greet", "says hi", "reply warmly", false)
            .await
            .unwrap();
        let registry = ToolRegistry::new(store);
        let defs = registry.describe_all().await.unwrap();
        assert!(defs.iter().any(|d| d.name == "greet"));
    }
}
