//! Tool-call parsing: the wire contract between `PromptBuilder`'s
//! instruction block and this parser is a fenced ```json code block,
//! containing a `tool_calls` array, at the end of the assistant message.
//! The parser is liberal — anything that doesn't match yields an empty
//! list rather than an error, matching the orchestrator's step-5
//! contract ("malformed blocks yield empty list").

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: std::collections::HashMap<String, Value>,
}

pub fn parse_tool_calls(assistant_output: &str) -> Vec<ParsedToolCall> {
    let Some(block) = extract_fenced_json_block(assistant_output) else {
        return Vec::new();
    };
    let Ok(parsed) = serde_json::from_str::<Value>(&block) else {
        return Vec::new();
    };

    let calls = match parsed {
        Value::Array(items) => items,
        Value::Object(ref map) => match map.get("tool_calls") {
            Some(Value::Array(items)) => items.clone(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    calls
        .into_iter()
        .filter_map(|v| serde_json::from_value::<ParsedToolCall>(v).ok())
        .collect()
}

/// Finds the last fenced code block in the text. Accepts both
/// ` ```json ` and a bare ` ``` ` fence, and tolerates the `tool_calls`
/// key being the fence's entire content or a top-level array directly.
fn extract_fenced_json_block(text: &str) -> Option<String> {
    let positions: Vec<usize> = text.match_indices("```").map(|(i, _)| i).collect();
    if positions.len() < 2 {
        return None;
    }
    let open = positions[positions.len() - 2];
    let close = positions[positions.len() - 1];

    let after_open = &text[open + 3..];
    let lang_end = after_open.find('\n')?;
    let body_start = open + 3 + lang_end + 1;
    if body_start > close {
        return None;
    }
    Some(text[body_start..close].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_tool_calls_object() {
        let text = "I'll check that.\n```json\n{\"tool_calls\": [{\"id\": \"1\", \"name\": \"search\", \"arguments\": {\"q\": \"rust\"}}]}\n```";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
    }

    #[test]
    fn parses_bare_array() {
        let text = "```json\n[{\"id\": \"1\", \"name\": \"search\", \"arguments\": {}}]\n```";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn no_fenced_block_yields_empty() {
        assert!(parse_tool_calls("just a plain answer").is_empty());
    }

    #[test]
    fn malformed_json_yields_empty() {
        let text = "```json\n{not valid json\n```";
        assert!(parse_tool_calls(text).is_empty());
    }

    #[test]
    fn unrelated_fenced_block_yields_empty() {
        let text = "```json\n{\"other_key\": []}\n```";
        assert!(parse_tool_calls(text).is_empty());
    }

    #[test]
    fn uses_the_last_fenced_block_when_several_present() {
        let text = "```json\n{\"scratch\": true}\n```\nsome text\n```json\n[{\"id\": \"1\", \"name\": \"search\", \"arguments\": {}}]\n```";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
    }
}
