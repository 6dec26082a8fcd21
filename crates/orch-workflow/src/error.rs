use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),
    #[error("session not found: {0}")]
    SessionMissing(String),
    #[error("model backend unavailable")]
    ModelUnavailable,
    #[error("model backend request failed: {0}")]
    ModelFailed(String),
    #[error("context update failed: {0}")]
    ContextFailed(String),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
