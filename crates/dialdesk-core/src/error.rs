//! Error type shared by every DialDesk crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DialDeskError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DialDeskError {
    /// Transient failures are worth retrying in background refreshes.
    pub fn is_transient(&self) -> bool {
        matches!(self, DialDeskError::Store(_) | DialDeskError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, DialDeskError>;
