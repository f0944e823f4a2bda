use std::collections::HashMap;

use agentrun_storage::{StorageGateway, Tool};
use serde_json::Value;
use sqlx::{Column, Row, ValueRef};

use crate::error::ExecError;

/// Executes `handler_config.template`, a parameterized query, binding
/// positional parameters from `arguments` in the order named by
/// `handler_config.params` (a list of argument names — the bind order a
/// free-form argument map can't express on its own).
pub async fn run(
    storage: &StorageGateway,
    tool: &Tool,
    arguments: &HashMap<String, Value>,
) -> Result<String, ExecError> {
    let template = tool
        .handler_config
        .get("template")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::ToolError { tool: tool.name.clone(), detail: "missing handler_config.template".into() })?;

    let param_names: Vec<String> = tool
        .handler_config
        .get("params")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let format = tool
        .handler_config
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("json");

    let mut query = sqlx::query(template);
    for name in &param_names {
        let value = arguments.get(name).cloned().unwrap_or(Value::Null);
        query = bind_json_value(query, value);
    }

    let rows = query
        .fetch_all(storage.pool())
        .await
        .map_err(|e| ExecError::ToolError { tool: tool.name.clone(), detail: e.to_string() })?;

    let records: Vec<serde_json::Map<String, Value>> = rows.iter().map(row_to_json).collect();

    match format {
        "csv" => Ok(render_csv(&records)),
        "markdown" => Ok(render_markdown(&records)),
        _ => serde_json::to_string(&records)
            .map_err(|e| ExecError::ToolError { tool: tool.name.clone(), detail: e.to_string() }),
    }
}

fn bind_json_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
        Value::Number(n) => query.bind(n.as_f64()),
        Value::String(s) => query.bind(s),
        other => query.bind(other.to_string()),
    }
}

/// Best-effort column decode: tries the scalar types a dynamic query is
/// likely to return, in order, falling back to `null`. `sqlx` has no
/// "decode as whatever this is" API, so a fully dynamic query result has
/// to guess.
fn row_to_json(row: &sqlx::postgres::PgRow) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name().to_string();
        let ordinal = column.ordinal();
        let is_null = row.try_get_raw(ordinal).map(|v| v.is_null()).unwrap_or(true);
        let value = if is_null {
            Value::Null
        } else {
            row.try_get::<i64, _>(ordinal)
                .map(Value::from)
                .or_else(|_| row.try_get::<f64, _>(ordinal).map(Value::from))
                .or_else(|_| row.try_get::<bool, _>(ordinal).map(Value::from))
                .or_else(|_| row.try_get::<String, _>(ordinal).map(Value::String))
                .unwrap_or(Value::Null)
        };
        map.insert(name, value);
    }
    map
}

fn render_csv(records: &[serde_json::Map<String, Value>]) -> String {
    let Some(first) = records.first() else { return String::new() };
    let headers: Vec<&String> = first.keys().collect();
    let mut out = headers.iter().map(|h| h.as_str()).collect::<Vec<_>>().join(",");
    for record in records {
        out.push('\n');
        let line: Vec<String> = headers.iter().map(|h| scalar_to_string(record.get(*h))).collect();
        out.push_str(&line.join(","));
    }
    out
}

fn render_markdown(records: &[serde_json::Map<String, Value>]) -> String {
    let Some(first) = records.first() else { return String::new() };
    let headers: Vec<&String> = first.keys().collect();
    let mut out = format!("| {} |\n", headers.iter().map(|h| h.as_str()).collect::<Vec<_>>().join(" | "));
    out.push_str(&format!("|{}\n", "---|".repeat(headers.len())));
    for record in records {
        let line: Vec<String> = headers.iter().map(|h| scalar_to_string(record.get(*h))).collect();
        out.push_str(&format!("| {} |\n", line.join(" | ")));
    }
    out
}

fn scalar_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
