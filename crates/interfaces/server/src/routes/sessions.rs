use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use agentrun_storage::{JsonMap, Session};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub agent_id: Uuid,
    #[serde(default)]
    pub external_user_id: Option<String>,
    #[serde(default)]
    pub metadata: JsonMap,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.storage.create_session(body.agent_id, body.external_user_id, body.metadata).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.storage.get_session(id).await?))
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

pub async fn list_for_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<Session>>, ApiError> {
    Ok(Json(state.storage.list_sessions(agent_id, page.limit, page.offset).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_default_limit_is_50() {
        let page: PageParams = serde_qs_like_defaults();
        assert_eq!(page.limit, 50);
        assert_eq!(page.offset, 0);
    }

    fn serde_qs_like_defaults() -> PageParams {
        serde_json::from_str("{}").unwrap()
    }

    #[test]
    fn create_session_body_defaults_metadata_to_empty_map() {
        let body: CreateSessionBody = serde_json::from_str(&format!(r#"{{"agent_id": "{}"}}"#, Uuid::nil())).unwrap();
        assert!(body.external_user_id.is_none());
        assert!(body.metadata.is_empty());
    }
}
