use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use agentrun_storage::{Agent, JsonMap, NewAgent};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AgentBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    pub model_name: String,
    #[serde(default = "default_memory_table")]
    pub memory_table: String,
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    #[serde(default)]
    pub config: JsonMap,
}

fn default_memory_table() -> String {
    "memory_chunks".to_string()
}

impl From<AgentBody> for NewAgent {
    fn from(body: AgentBody) -> Self {
        NewAgent {
            name: body.name,
            description: body.description,
            system_prompt: body.system_prompt,
            model_name: body.model_name,
            memory_table: body.memory_table,
            enabled_tools: body.enabled_tools,
            config: body.config,
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<AgentBody>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let agent = state.storage.create_agent(body.into()).await?;
    state.tool_registry.refresh(&state.storage).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(state.storage.list_agents().await?))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.storage.get_agent(id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AgentBody>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state.storage.update_agent(id, body.into()).await?;
    state.tool_registry.refresh(&state.storage).await?;
    Ok(Json(agent))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.storage.delete_agent(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_table_defaults_when_omitted() {
        let body: AgentBody = serde_json::from_str(
            r#"{"name": "a", "system_prompt": "be helpful", "model_name": "llama3"}"#,
        )
        .unwrap();
        assert_eq!(body.memory_table, "memory_chunks");
        assert!(body.enabled_tools.is_empty());
    }

    #[test]
    fn memory_table_override_is_respected() {
        let body: AgentBody = serde_json::from_str(
            r#"{"name": "a", "system_prompt": "x", "model_name": "llama3", "memory_table": "custom_chunks"}"#,
        )
        .unwrap();
        assert_eq!(body.memory_table, "custom_chunks");
    }
}
