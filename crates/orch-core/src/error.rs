use thiserror::Error;

/// Errors surfaced while loading or validating configuration.
///
/// A bad or missing config file is
/// never fatal on its own — `OrchConfig::load` falls back to defaults and
/// logs a warning; this type exists for the narrower case where the caller
/// wants to know *why* loading failed (e.g. to decide whether to retry).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
