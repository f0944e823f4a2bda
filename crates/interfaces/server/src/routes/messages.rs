use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agentrun_storage::Message;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub content: String,
    pub tokens_used: agentrun_llm::TokenUsage,
    pub tool_calls: Vec<ToolCallView>,
    pub tool_results: Vec<ToolResultView>,
}

#[derive(Debug, Serialize)]
pub struct ToolCallView {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ToolResultView {
    pub tool_call_id: String,
    pub content: String,
    pub error: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<SendMessageBody>,
) -> Result<Json<TurnResponse>, ApiError> {
    let outcome = state.orchestrator.run_turn(session_id, &body.content).await?;
    Ok(Json(TurnResponse {
        content: outcome.content,
        tokens_used: outcome.tokens_used,
        tool_calls: outcome.tool_calls.into_iter().map(|c| ToolCallView { id: c.id, name: c.name }).collect(),
        tool_results: outcome
            .tool_results
            .into_iter()
            .map(|r| ToolResultView { tool_call_id: r.tool_call_id, content: r.content, error: r.error })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.storage.list_messages(session_id, page.limit, page.offset).await?))
}
