use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Caller-supplied arguments failed validation; the message is shown verbatim.
    #[error("{0}")]
    InvalidArguments(String),

    /// Missing credential or setting; the message names what is missing.
    #[error("{0}")]
    NotConfigured(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Stable error code string, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => "TOOL_NOT_FOUND",
            ToolError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            ToolError::NotConfigured(_) => "NOT_CONFIGURED",
            ToolError::ExecutionFailed(_) => "EXECUTION_FAILED",
            ToolError::Timeout => "TIMEOUT",
            ToolError::Internal(_) => "INTERNAL",
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_caller_facing() {
        assert_eq!(
            ToolError::InvalidArguments("Empty text provided".into()).to_string(),
            "Empty text provided"
        );
        assert_eq!(
            ToolError::NotConfigured("OPENAI_API_KEY is not set".into()).to_string(),
            "OPENAI_API_KEY is not set"
        );
        assert_eq!(ToolError::Timeout.code(), "TIMEOUT");
    }
}
