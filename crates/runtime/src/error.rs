use serde::Serialize;
use uuid::Uuid;

/// Attached to every `AppError` so log lines are self-diagnosing without
/// needing to chase the call site: session/agent identity, the sizes and
/// token estimates in play, and whatever configuration is relevant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    pub session_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub agent_name: Option<String>,
    pub detail: String,
}

impl ErrorContext {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into(), ..Default::default() }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_agent(mut self, agent_id: Uuid, agent_name: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id);
        self.agent_name = Some(agent_name.into());
        self
    }
}

/// One variant per documented error kind (§7). Every subsystem's narrow
/// error type converts into one of these via `From` rather than being
/// wrapped as a string, so the HTTP edge can always recover a status code
/// and a machine-readable tag.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(ErrorContext),
    #[error("validation failed: {0}")]
    Validation(ErrorContext),
    #[error("unauthorized: {0}")]
    Unauthorized(ErrorContext),
    #[error("rate limited: {0}")]
    RateLimited(ErrorContext),
    #[error("conflict: {0}")]
    Conflict(ErrorContext),
    #[error("context assembly failed: {0}")]
    ContextError(ErrorContext),
    #[error("prompt construction failed: {0}")]
    PromptError(ErrorContext),
    #[error("llm call failed: {0}")]
    LlmError(ErrorContext),
    #[error("embedding failed: {0}")]
    EmbeddingError(ErrorContext),
    #[error("tool not enabled: {0}")]
    ToolNotEnabled(ErrorContext),
    #[error("tool error: {0}")]
    ToolError(ErrorContext),
    #[error("tool timed out: {0}")]
    ToolTimeout(ErrorContext),
    #[error("tool exceeded its resource bound: {0}")]
    ToolLimit(ErrorContext),
    #[error("persistence failed: {0}")]
    PersistError(ErrorContext),
    #[error("job queue is full: {0}")]
    QueueFull(ErrorContext),
    #[error("internal error: {0}")]
    Internal(ErrorContext),
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.detail)
    }
}

impl AppError {
    /// HTTP status for the edge handler; see spec §6/§7.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::RateLimited(_) => 429,
            AppError::Conflict(_) => 409,
            AppError::QueueFull(_) => 503,
            AppError::ContextError(_)
            | AppError::PromptError(_)
            | AppError::LlmError(_)
            | AppError::EmbeddingError(_)
            | AppError::ToolNotEnabled(_)
            | AppError::ToolError(_)
            | AppError::ToolTimeout(_)
            | AppError::ToolLimit(_)
            | AppError::PersistError(_)
            | AppError::Internal(_) => 500,
        }
    }

    /// Short machine-readable tag for the `error` field of the response
    /// body.
    pub fn short_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Conflict(_) => "conflict",
            AppError::ContextError(_) => "context_error",
            AppError::PromptError(_) => "prompt_error",
            AppError::LlmError(_) => "llm_error",
            AppError::EmbeddingError(_) => "embedding_error",
            AppError::ToolNotEnabled(_) => "tool_not_enabled",
            AppError::ToolError(_) => "tool_error",
            AppError::ToolTimeout(_) => "tool_timeout",
            AppError::ToolLimit(_) => "tool_limit",
            AppError::PersistError(_) => "persist_error",
            AppError::QueueFull(_) => "queue_full",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<agentrun_storage::StorageError> for AppError {
    fn from(err: agentrun_storage::StorageError) -> Self {
        match err {
            agentrun_storage::StorageError::NotFound { entity, id } => {
                AppError::NotFound(ErrorContext::new(format!("{entity} {id} not found")))
            }
            agentrun_storage::StorageError::Conflict { entity, detail } => {
                AppError::Conflict(ErrorContext::new(format!("{entity}: {detail}")))
            }
            other => AppError::PersistError(ErrorContext::new(other.to_string())),
        }
    }
}

impl From<agentrun_llm::LlmError> for AppError {
    fn from(err: agentrun_llm::LlmError) -> Self {
        match err {
            agentrun_llm::LlmError::Embedding { .. } => AppError::EmbeddingError(ErrorContext::new(err.to_string())),
            agentrun_llm::LlmError::Generation { .. } => AppError::LlmError(ErrorContext::new(err.to_string())),
        }
    }
}

impl From<agentrun_exec::ExecError> for AppError {
    fn from(err: agentrun_exec::ExecError) -> Self {
        match err {
            agentrun_exec::ExecError::ToolNotEnabled(_) => AppError::ToolNotEnabled(ErrorContext::new(err.to_string())),
            agentrun_exec::ExecError::ToolTimeout { .. } => AppError::ToolTimeout(ErrorContext::new(err.to_string())),
            agentrun_exec::ExecError::ToolLimit { .. } => AppError::ToolLimit(ErrorContext::new(err.to_string())),
            _ => AppError::ToolError(ErrorContext::new(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(AppError::NotFound(ErrorContext::new("x")).status_code(), 404);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        assert_eq!(AppError::RateLimited(ErrorContext::new("x")).status_code(), 429);
    }

    #[test]
    fn queue_full_maps_to_503() {
        assert_eq!(AppError::QueueFull(ErrorContext::new("x")).status_code(), 503);
    }

    #[test]
    fn internal_maps_to_500() {
        assert_eq!(AppError::Internal(ErrorContext::new("x")).status_code(), 500);
    }
}
