//! Tool registry: definitions are rows loaded from the storage gateway
//! rather than compiled trait objects, but the lookup shape (`register`
//! loads the whole set, `get`/`list_specs` read it back) is the same
//! registry texture used before the switch to DB-backed definitions.

use std::collections::HashMap;
use std::sync::RwLock;

use agentrun_storage::{StorageError, StorageGateway, Tool};

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads the whole map from storage — the "replace-and-swap"
    /// invalidation the read-mostly cache relies on instead of per-row
    /// updates.
    pub async fn refresh(&self, storage: &StorageGateway) -> Result<(), StorageError> {
        let loaded = storage.list_enabled_tools().await?;
        let map = loaded.into_iter().map(|t| (t.name.clone(), t)).collect();
        *self.tools.write().expect("tool registry lock poisoned") = map;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().expect("tool registry lock poisoned").get(name).cloned()
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools.read().expect("tool registry lock poisoned").values().cloned().collect()
    }

    /// Whether `name` is both registered (enabled) and present.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().expect("tool registry lock poisoned").contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_storage::{HandlerType, JsonMap};
    use chrono::Utc;
    use uuid::Uuid;

    fn dummy_tool(name: &str) -> Tool {
        Tool {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: format!("dummy tool: {name}"),
            arg_schema: JsonMap::new(),
            handler_type: HandlerType::Sql,
            handler_config: JsonMap::new(),
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_registry_has_no_tools() {
        let registry = ToolRegistry::new();
        assert!(registry.list().is_empty());
        assert!(registry.get("anything").is_none());
    }

    #[test]
    fn contains_reflects_loaded_set() {
        let registry = ToolRegistry::new();
        {
            let mut tools = registry.tools.write().unwrap();
            tools.insert("alpha".to_string(), dummy_tool("alpha"));
        }
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("beta"));
    }

    #[test]
    fn get_returns_matching_definition() {
        let registry = ToolRegistry::new();
        {
            let mut tools = registry.tools.write().unwrap();
            tools.insert("finder".to_string(), dummy_tool("finder"));
        }
        let tool = registry.get("finder").unwrap();
        assert_eq!(tool.name, "finder");
        assert_eq!(tool.handler_type, HandlerType::Sql);
    }
}
