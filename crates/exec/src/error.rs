#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("tool '{0}' is not in this agent's enabled_tools")]
    ToolNotEnabled(String),

    #[error("tool '{0}' is not registered")]
    ToolNotFound(String),

    #[error("argument validation failed: {0}")]
    Validation(String),

    #[error("tool '{tool}' exceeded its wall-clock timeout")]
    ToolTimeout { tool: String },

    #[error("tool '{tool}' exceeded its resource bound: {detail}")]
    ToolLimit { tool: String, detail: String },

    #[error("tool '{tool}' failed: {detail}")]
    ToolError { tool: String, detail: String },
}
