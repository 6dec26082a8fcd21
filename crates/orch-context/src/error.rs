use thiserror::Error;

/// Read errors on `get` fall back to
/// defaults (a warning, not a propagated error); this type exists for
/// `update`/mutator paths where write failures must surface to the caller
/// without crashing the store.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("i/o error for chat {chat_id}: {source}")]
    Io {
        chat_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed context file for chat {chat_id}: {source}")]
    Serde {
        chat_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no context file for chat {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ContextError>;
