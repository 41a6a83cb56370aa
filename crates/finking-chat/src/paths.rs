//! Store layout for chat sessions: `artifacts/{appId}/users/{userId}/chats/{sessionId}`.

use finking_core::types::{SessionId, UserId};
use finking_store::{CollectionPath, DocumentPath, StoreError};

#[derive(Clone, Debug)]
pub struct ChatPaths {
    app_id: String,
}

impl ChatPaths {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }

    /// The user's session collection.
    pub fn sessions(&self, user: &UserId) -> Result<CollectionPath, StoreError> {
        CollectionPath::new([
            "artifacts",
            self.app_id.as_str(),
            "users",
            user.as_str(),
            "chats",
        ])
    }

    /// One session document.
    pub fn session(&self, user: &UserId, session: &SessionId) -> Result<DocumentPath, StoreError> {
        self.sessions(user)?.doc(session.as_str())
    }
}
