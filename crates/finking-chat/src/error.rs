//! Chat core error type.

use finking_core::types::SessionId;
use finking_store::StoreError;
use thiserror::Error;

/// Failure of a chat core operation.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The message was empty after trimming whitespace. Nothing happened.
    #[error("message is empty")]
    EmptyInput,

    /// A store call failed (after retries, for merge-writes).
    #[error("store call failed: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The session document does not exist.
    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),

    /// No session is active, or the message log is not open for it.
    #[error("no active session")]
    NoActiveSession,

    #[error("not signed in")]
    NotSignedIn,
}
