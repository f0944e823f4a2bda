pub mod agents;
pub mod api_keys;
pub mod health;
pub mod jobs;
pub mod messages;
pub mod sessions;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::middleware as app_middleware;
use crate::state::AppState;
use crate::ws;

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/agents", post(agents::create).get(agents::list))
        .route(
            "/api/v1/agents/{id}",
            get(agents::get_one).put(agents::update).delete(agents::delete),
        )
        .route("/api/v1/agents/{id}/sessions", get(sessions::list_for_agent))
        .route("/api/v1/sessions", post(sessions::create))
        .route("/api/v1/sessions/{id}", get(sessions::get_one))
        .route(
            "/api/v1/sessions/{id}/messages",
            post(messages::create).get(messages::list),
        )
        .route("/ws", get(ws::handle_upgrade))
        .route("/api/v1/jobs", post(jobs::create))
        .route("/api/v1/jobs/{id}", get(jobs::get_one))
        .route_layer(middleware::from_fn_with_state(state.clone(), app_middleware::require_api_key));

    Router::new()
        .merge(protected)
        .route("/api/v1/api-keys", post(api_keys::create))
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .with_state(state)
}
