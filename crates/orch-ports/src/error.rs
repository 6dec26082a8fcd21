use thiserror::Error;

/// Errors that can occur within a frontend or model-backend adapter.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("no model adapter available")]
    NoModelAvailable,
}

pub type Result<T> = std::result::Result<T, PortError>;
