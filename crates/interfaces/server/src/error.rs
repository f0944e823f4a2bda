use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use agentrun_runtime::AppError;

/// Wire shape for every non-2xx response: `{error, code, message, request_id}`.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: &'static str,
    pub code: u16,
    pub message: String,
    pub request_id: Uuid,
}

pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiErrorBody,
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiErrorBody {
            error: err.short_code(),
            code: err.status_code(),
            message: err.to_string(),
            request_id: Uuid::new_v4(),
        };
        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use agentrun_runtime::ErrorContext;

    use super::*;

    #[test]
    fn not_found_maps_to_404_with_matching_short_code() {
        let api_err = ApiError::from(AppError::NotFound(ErrorContext::new("agent x not found")));
        assert_eq!(api_err.status, StatusCode::NOT_FOUND);
        assert_eq!(api_err.body.error, "not_found");
        assert_eq!(api_err.body.code, 404);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let api_err = ApiError::from(AppError::RateLimited(ErrorContext::new("too many requests")));
        assert_eq!(api_err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api_err.body.error, "rate_limited");
    }

    #[test]
    fn each_response_gets_a_fresh_request_id() {
        let first = ApiError::from(AppError::Internal(ErrorContext::new("x")));
        let second = ApiError::from(AppError::Internal(ErrorContext::new("x")));
        assert_ne!(first.body.request_id, second.body.request_id);
    }
}
