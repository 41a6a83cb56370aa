//! Bus event types — state changes flowing from the chat core to the view.
//!
//! Every event carries a full copy of the state it reports, so a view that
//! only renders the latest event of each kind is always consistent.

use crate::types::{ChatSessionSummary, Message, SessionId};

/// Where a message-log change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// Optimistic local append (or rollback) before the store confirmed it.
    Local,
    /// Snapshot pushed by the store subscription.
    Store,
}

/// An event published by the chat core.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// The session list was replaced by a new snapshot.
    SessionsChanged { sessions: Vec<ChatSessionSummary> },
    /// The active-session pointer moved.
    ActiveSessionChanged { session_id: Option<SessionId> },
    /// The active session's message log changed.
    MessagesChanged {
        session_id: SessionId,
        messages: Vec<Message>,
        origin: UpdateOrigin,
    },
    /// The store reported the session document absent.
    SessionNotFound { session_id: SessionId },
    /// A store call failed; the view should show a transient error.
    SyncError { message: String },
}

impl ChatEvent {
    /// Short event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::SessionsChanged { .. } => "sessions_changed",
            ChatEvent::ActiveSessionChanged { .. } => "active_session_changed",
            ChatEvent::MessagesChanged { .. } => "messages_changed",
            ChatEvent::SessionNotFound { .. } => "session_not_found",
            ChatEvent::SyncError { .. } => "sync_error",
        }
    }
}
