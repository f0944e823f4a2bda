use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub db: &'static str,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
    match sqlx::query("SELECT 1").execute(state.storage.pool()).await {
        Ok(_) => (StatusCode::OK, Json(HealthBody { status: "ok", db: "ok" })),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(HealthBody { status: "degraded", db: "unreachable" })),
    }
}

pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
