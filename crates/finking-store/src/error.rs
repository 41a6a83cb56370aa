//! Store error type.

use thiserror::Error;

/// Any failure of a document store call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected or could not complete the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A path violated the collection/document addressing rules.
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("store file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable(reason.into())
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}
