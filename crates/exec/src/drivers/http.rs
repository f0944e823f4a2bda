use std::collections::HashMap;
use std::time::Duration;

use agentrun_storage::Tool;
use serde_json::Value;

use crate::error::ExecError;

const DEFAULT_MAX_BYTES: usize = 64 * 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Performs the HTTP request described by `handler_config` (`method`,
/// `url_template`, `headers`, `timeout_secs`), substituting
/// `{placeholder}` tokens in the URL template from `arguments`. The
/// response body is truncated to `handler_config.max_bytes`.
pub async fn run(
    client: &reqwest::Client,
    tool: &Tool,
    arguments: &HashMap<String, Value>,
) -> Result<String, ExecError> {
    let config = &tool.handler_config;
    let method = config
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_uppercase();
    let url_template = config
        .get("url_template")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::ToolError { tool: tool.name.clone(), detail: "missing handler_config.url_template".into() })?;
    let url = substitute(url_template, arguments);

    let max_bytes = config.get("max_bytes").and_then(Value::as_u64).unwrap_or(DEFAULT_MAX_BYTES as u64) as usize;
    let timeout_secs = config.get("timeout_secs").and_then(Value::as_u64).unwrap_or(DEFAULT_TIMEOUT_SECS);

    let method = method
        .parse::<reqwest::Method>()
        .map_err(|_| ExecError::ToolError { tool: tool.name.clone(), detail: format!("invalid HTTP method '{method}'") })?;
    let mut request = client.request(method, &url).timeout(Duration::from_secs(timeout_secs));

    if let Some(headers) = config.get("headers").and_then(Value::as_object) {
        for (key, value) in headers {
            if let Some(v) = value.as_str() {
                request = request.header(key, v);
            }
        }
    }

    let response = tokio::time::timeout(Duration::from_secs(timeout_secs), request.send())
        .await
        .map_err(|_| ExecError::ToolTimeout { tool: tool.name.clone() })?
        .map_err(|e| ExecError::ToolError { tool: tool.name.clone(), detail: e.to_string() })?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExecError::ToolError { tool: tool.name.clone(), detail: e.to_string() })?;
    let truncated = &bytes[..bytes.len().min(max_bytes)];
    Ok(String::from_utf8_lossy(truncated).into_owned())
}

fn substitute(template: &str, arguments: &HashMap<String, Value>) -> String {
    let mut result = template.to_string();
    for (key, value) in arguments {
        let placeholder = format!("{{{key}}}");
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        result = result.replace(&placeholder, &rendered);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_placeholders() {
        let mut args = HashMap::new();
        args.insert("city".to_string(), Value::String("Denver".into()));
        let result = substitute("https://api.example.com/weather/{city}", &args);
        assert_eq!(result, "https://api.example.com/weather/Denver");
    }

    #[test]
    fn substitute_leaves_unmatched_placeholders() {
        let args = HashMap::new();
        let result = substitute("https://api.example.com/{missing}", &args);
        assert_eq!(result, "https://api.example.com/{missing}");
    }
}
