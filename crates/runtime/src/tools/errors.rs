use thiserror::Error;

/// Why a tool definition failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DescriptorInvalid {
    #[error("tool declares no invocation handler")]
    MissingInvocationHandle,
    #[error("tool declares {0} invocation handlers, expected exactly one")]
    AmbiguousInvocationHandle(usize),
    #[error("parameter '{0}' is not a text parameter")]
    NonTextParameter(String),
    #[error("tool name is empty")]
    EmptyName,
    #[error("tool description is empty")]
    EmptyDescription,
    #[error("a parameter name is empty")]
    EmptyParameterName,
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),
}

/// Errors returned when registering a tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("tool '{tool}' is invalid: {reason}")]
    DescriptorInvalid {
        tool: String,
        reason: DescriptorInvalid,
    },
    #[error("a tool named '{0}' is already registered")]
    DuplicateToolName(String),
}

/// Errors raised by a tool's own logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("panicked: {0}")]
    Panicked(String),
}
