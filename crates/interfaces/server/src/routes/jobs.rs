use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use agentrun_storage::{Job, JsonMap};

use crate::error::ApiError;
use crate::state::AppState;

/// Submits deferred work to run through the job queue instead of inline —
/// the `run_turn` job type is handled by dispatching to the same
/// [`agentrun_runtime::TurnOrchestrator`] the synchronous message endpoint
/// uses; other `job_type` values are accepted but fail until a handler is
/// registered for them.
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub job_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub payload: JsonMap,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

fn default_max_retries() -> i32 {
    3
}

pub async fn create(State(state): State<AppState>, Json(body): Json<CreateJobBody>) -> Result<(StatusCode, Json<Job>), ApiError> {
    let job = state
        .job_queue
        .enqueue(body.agent_id, body.session_id, &body.job_type, body.priority, body.payload, body.max_retries)
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.storage.get_job(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_retries_defaults_to_three() {
        let body: CreateJobBody = serde_json::from_str(r#"{"job_type": "run_turn"}"#).unwrap();
        assert_eq!(body.max_retries, 3);
        assert_eq!(body.priority, 0);
        assert!(body.agent_id.is_none());
    }
}
