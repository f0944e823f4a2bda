use std::collections::HashMap;
use std::time::Duration;

use agentrun_storage::Tool;
use serde_json::Value;
use tokio::process::Command;

use crate::error::ExecError;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Runs `handler_config.command` with `arguments["args"]`, each of which
/// must appear verbatim in `handler_config.allowed_args` — an unlisted
/// argument fails closed rather than being dropped silently.
pub async fn run(tool: &Tool, arguments: &HashMap<String, Value>) -> Result<String, ExecError> {
    let command = tool
        .handler_config
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::ToolError { tool: tool.name.clone(), detail: "missing handler_config.command".into() })?;

    let allowed: Vec<&str> = tool
        .handler_config
        .get("allowed_args")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let requested: Vec<String> = arguments
        .get("args")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(|a| a.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    for arg in &requested {
        if !allowed.contains(&arg.as_str()) {
            return Err(ExecError::Validation(format!("argument '{arg}' is not in this tool's allowed_args")));
        }
    }

    let timeout_secs = tool
        .handler_config
        .get("timeout_secs")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        Command::new(command).args(&requested).kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| ExecError::ToolTimeout { tool: tool.name.clone() })?
    .map_err(|e| ExecError::ToolError { tool: tool.name.clone(), detail: e.to_string() })?;

    if !output.status.success() {
        return Err(ExecError::ToolError {
            tool: tool.name.clone(),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_storage::{HandlerType, JsonMap};
    use chrono::Utc;
    use uuid::Uuid;

    fn tool_with_config(config: serde_json::Value) -> Tool {
        Tool {
            id: Uuid::new_v4(),
            name: "echo".to_string(),
            description: String::new(),
            arg_schema: JsonMap::new(),
            handler_type: HandlerType::Shell,
            handler_config: JsonMap::from_value(config),
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rejects_unlisted_argument() {
        let tool = tool_with_config(serde_json::json!({
            "command": "echo",
            "allowed_args": ["hello"],
        }));
        let mut args = HashMap::new();
        args.insert("args".to_string(), Value::from(vec!["rm -rf /"]));
        let result = run(&tool, &args).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn allows_listed_argument() {
        let tool = tool_with_config(serde_json::json!({
            "command": "echo",
            "allowed_args": ["hello"],
        }));
        let mut args = HashMap::new();
        args.insert("args".to_string(), Value::from(vec!["hello"]));
        let result = run(&tool, &args).await.unwrap();
        assert_eq!(result.trim(), "hello");
    }
}
