use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use agentrun_storage::{ApiKey, JsonMap, NewApiKey};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IssueApiKeyBody {
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i32,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_rate_limit() -> i32 {
    60
}

#[derive(Debug, Serialize)]
pub struct IssuedApiKeyBody {
    /// Shown exactly once — callers must store it themselves.
    pub key: String,
    pub record: ApiKey,
}

pub async fn create(State(state): State<AppState>, Json(body): Json<IssueApiKeyBody>) -> Result<Json<IssuedApiKeyBody>, ApiError> {
    let issued = state
        .storage
        .create_api_key(NewApiKey {
            organization_id: body.organization_id,
            user_id: body.user_id,
            rate_limit_per_minute: body.rate_limit_per_minute,
            roles: body.roles,
            metadata: body.metadata,
            expires_at: body.expires_at,
        })
        .await?;
    Ok(Json(IssuedApiKeyBody { key: issued.plaintext, record: issued.record }))
}
