use std::collections::HashMap;

use agentrun_storage::JsonMap;
use serde_json::Value;

use crate::error::ExecError;

/// `arg_schema` is a JSON-Schema-like shape: `{"required": [...], "properties": {name: {"type": ...}}}`.
/// Validation here is intentionally shallow — presence of required keys and
/// a coarse type check — matching the level of detail the schema itself
/// carries; it is not a full JSON-Schema validator.
pub fn validate_arguments(arg_schema: &JsonMap, arguments: &HashMap<String, Value>) -> Result<(), ExecError> {
    let required = arg_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for name in &required {
        if !arguments.contains_key(*name) {
            return Err(ExecError::Validation(format!("missing required argument '{name}'")));
        }
    }

    let Some(properties) = arg_schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (name, value) in arguments {
        let Some(spec) = properties.get(name) else {
            continue;
        };
        let Some(expected_type) = spec.get("type").and_then(Value::as_str) else {
            continue;
        };
        if !matches_type(expected_type, value) {
            return Err(ExecError::Validation(format!(
                "argument '{name}' does not match expected type '{expected_type}'"
            )));
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(required: &[&str], properties: serde_json::Value) -> JsonMap {
        JsonMap::from_value(serde_json::json!({
            "required": required,
            "properties": properties,
        }))
    }

    #[test]
    fn missing_required_argument_fails() {
        let schema = schema(&["query"], serde_json::json!({"query": {"type": "string"}}));
        let args = HashMap::new();
        assert!(validate_arguments(&schema, &args).is_err());
    }

    #[test]
    fn type_mismatch_fails() {
        let schema = schema(&[], serde_json::json!({"limit": {"type": "integer"}}));
        let mut args = HashMap::new();
        args.insert("limit".to_string(), Value::String("oops".into()));
        assert!(validate_arguments(&schema, &args).is_err());
    }

    #[test]
    fn matching_arguments_pass() {
        let schema = schema(&["query"], serde_json::json!({"query": {"type": "string"}}));
        let mut args = HashMap::new();
        args.insert("query".to_string(), Value::String("hello".into()));
        assert!(validate_arguments(&schema, &args).is_ok());
    }

    #[test]
    fn empty_schema_accepts_anything() {
        let schema = JsonMap::new();
        let mut args = HashMap::new();
        args.insert("anything".to_string(), Value::Bool(true));
        assert!(validate_arguments(&schema, &args).is_ok());
    }
}
