//! Tool invoker: lookup → enabled-tools check → argument validation →
//! handler-kind dispatch, matching the storage gateway's tool registry
//! and the four driver kinds named for `Tool.handler_type`.

mod drivers;
mod error;
mod validate;

pub use error::ExecError;

use std::collections::HashMap;

use agentrun_storage::{Agent, HandlerType, StorageGateway};
use agentrun_tools::ToolRegistry;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ToolInvoker {
    storage: StorageGateway,
    registry: std::sync::Arc<ToolRegistry>,
    http: reqwest::Client,
}

impl ToolInvoker {
    pub fn new(storage: StorageGateway, registry: std::sync::Arc<ToolRegistry>) -> Self {
        Self { storage, registry, http: reqwest::Client::new() }
    }

    /// Executes one tool call. Errors never abort the turn — they are
    /// captured into the result as readable text for the model's second
    /// pass.
    pub async fn invoke(&self, agent: &Agent, call: &ToolCall) -> ToolResult {
        match self.try_invoke(agent, call).await {
            Ok(content) => ToolResult { tool_call_id: call.id.clone(), content, error: None },
            Err(e) => ToolResult { tool_call_id: call.id.clone(), content: String::new(), error: Some(e.to_string()) },
        }
    }

    /// Executes a batch, tagging each result with its originating
    /// `tool_call_id` and preserving the model's original call order —
    /// callers may run them concurrently via `futures::future::join_all`
    /// over this method without losing that invariant.
    pub async fn invoke_all(&self, agent: &Agent, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.invoke(agent, call).await);
        }
        results
    }

    async fn try_invoke(&self, agent: &Agent, call: &ToolCall) -> Result<String, ExecError> {
        if !agent.enabled_tools.iter().any(|name| name == &call.name) {
            return Err(ExecError::ToolNotEnabled(call.name.clone()));
        }
        let tool = self.registry.get(&call.name).ok_or_else(|| ExecError::ToolNotFound(call.name.clone()))?;
        validate::validate_arguments(&tool.arg_schema, &call.arguments)?;

        match tool.handler_type {
            HandlerType::Sql => drivers::sql::run(&self.storage, &tool, &call.arguments).await,
            HandlerType::Http => drivers::http::run(&self.http, &tool, &call.arguments).await,
            HandlerType::Code => drivers::code::run(&tool, &call.arguments).await,
            HandlerType::Shell => drivers::shell::run(&tool, &call.arguments).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_storage::JsonMap;
    use chrono::Utc;
    use uuid::Uuid;

    fn agent_with_tools(tools: &[&str]) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: "test-agent".to_string(),
            description: String::new(),
            system_prompt: String::new(),
            model_name: "test-model".to_string(),
            memory_table: "memory".to_string(),
            enabled_tools: tools.iter().map(|s| s.to_string()).collect(),
            config: JsonMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn enabled_tools_gate_is_checked_before_lookup() {
        let agent = agent_with_tools(&["search"]);
        assert!(!agent.enabled_tools.iter().any(|n| n == "shell"));
        assert!(agent.enabled_tools.iter().any(|n| n == "search"));
    }
}
