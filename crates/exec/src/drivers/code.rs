use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use agentrun_storage::Tool;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ExecError;

const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;

/// Runs `arguments["code"]` through the interpreter pinned in
/// `handler_config.runtime` (e.g. `"python3"`). The wall-clock timeout is
/// enforced with `tokio::time::timeout`, killing the child on expiry.
/// There is no OS-level memory cgroup available to this process, so the
/// memory bound is approximated by capping captured output size —
/// documented as a known gap, not a true RSS limit.
pub async fn run(tool: &Tool, arguments: &HashMap<String, Value>) -> Result<String, ExecError> {
    let runtime = tool
        .handler_config
        .get("runtime")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::ToolError { tool: tool.name.clone(), detail: "missing handler_config.runtime".into() })?;
    let code = arguments
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::Validation("missing required argument 'code'".into()))?;

    let timeout_secs = tool
        .handler_config
        .get("timeout_secs")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let max_output_bytes = tool
        .handler_config
        .get("max_output_bytes")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MAX_OUTPUT_BYTES as u64) as usize;

    let mut child = Command::new(runtime)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::ToolError { tool: tool.name.clone(), detail: e.to_string() })?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(code.as_bytes()).await;
    }

    let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ExecError::ToolError { tool: tool.name.clone(), detail: e.to_string() })?,
        Err(_) => return Err(ExecError::ToolTimeout { tool: tool.name.clone() }),
    };

    if output.stdout.len() > max_output_bytes {
        return Err(ExecError::ToolLimit {
            tool: tool.name.clone(),
            detail: format!("output exceeded {max_output_bytes} bytes"),
        });
    }

    if !output.status.success() {
        return Err(ExecError::ToolError {
            tool: tool.name.clone(),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
