use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use agentrun_runtime::{AppError, ErrorContext};

use crate::error::ApiError;
use crate::state::AppState;

/// Extracts `Authorization: Bearer <key>`, authenticates it, and checks
/// the per-key sliding-window rate limit before letting the request
/// through. The authenticated key's id is attached as a request extension
/// for downstream handlers that need it.
pub async fn require_api_key(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(ErrorContext::new("missing Authorization header")))?;

    let presented = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized(ErrorContext::new("Authorization header is not a Bearer token")))?;

    let key = state.authenticator.authenticate(presented).await?;

    if !state.rate_limiter.check(&key.id.to_string(), key.rate_limit_per_minute as u32) {
        return Err(ApiError::from(AppError::RateLimited(ErrorContext::new("rate limit exceeded"))));
    }

    request.extensions_mut().insert(key);
    Ok(next.run(request).await)
}
