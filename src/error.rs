//! # Error Types
//!
//! Three layers of errors, from the outside in:
//! - [`ToolError`]: a capability call (search, summary, lookup) failed
//! - [`StepError`]: a workflow step's operation failed; recorded on the step, never fatal
//! - [`WorkflowError`]: the workflow as a whole could not be created or run

use thiserror::Error;

/// Errors raised by the search / summary / translation / lookup capabilities.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Provider server error: HTTP {0}")]
    ServerError(u16),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("{tool} failed: {message}")]
    Execution { tool: String, message: String },
}

impl ToolError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolError::RateLimited
                | ToolError::Timeout
                | ToolError::ServerError(_)
                | ToolError::Network(_)
        )
    }
}

/// Errors produced by a single step operation.
///
/// A failed step is surfaced in a result chunk and does not abort the workflow.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Missing input from step '{0}'")]
    MissingInput(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("{0}")]
    Failed(String),

    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Workflow-level errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Unknown workflow template: {0}")]
    UnknownTemplate(String),

    #[error("Agent {0} not found")]
    UnknownAgent(String),

    /// Pending steps remain but none is ready: a cycle or a dependency on a missing step id.
    #[error("Workflow deadlock detected - circular dependencies or missing steps (pending: {})", pending.join(", "))]
    Deadlock { pending: Vec<String> },

    /// Two steps share an id, so dependencies on it are ambiguous.
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Workflow state error: {0}")]
    State(String),
}
