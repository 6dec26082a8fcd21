use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task data missing required field: {0}")]
    MissingField(&'static str),
    #[error("queue manager is shutting down")]
    ShuttingDown,
    #[error("queue is at capacity")]
    Full,
}

pub type Result<T> = std::result::Result<T, QueueError>;
