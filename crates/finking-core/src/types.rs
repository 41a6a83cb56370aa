//! Core types for Finking — the chat session data model.
//!
//! These types mirror the session documents kept in the document store:
//! `{ "title": ..., "createdAt": ..., "messages": [ { "text", "sender", "timestamp" } ] }`.
//! JSON on the wire uses **camelCase** keys; Rust uses snake_case.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────

/// Identity of the signed-in user. Scopes the session collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

/// Opaque session identifier, assigned by the store on creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => f.write_str("user"),
            Sender::Bot => f.write_str("bot"),
        }
    }
}

/// One entry of a session's message log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a user message stamped with the current time.
    pub fn user(text: impl Into<String>) -> Self {
        Message {
            text: text.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
        }
    }

    /// Create a bot message stamped with the current time.
    pub fn bot(text: impl Into<String>) -> Self {
        Message {
            text: text.into(),
            sender: Sender::Bot,
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

/// Stored body of a session document (everything except the id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    #[serde(default)]
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// A chat conversation thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl ChatSession {
    /// Assemble a session from its document id and stored body.
    ///
    /// A body without `createdAt` (not yet stamped by the store) falls back
    /// to the Unix epoch so it sorts last.
    pub fn from_body(id: SessionId, body: SessionBody) -> Self {
        ChatSession {
            id,
            title: body.title,
            created_at: body.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            messages: body.messages,
        }
    }

    /// Summary used by the session list.
    pub fn summary(&self) -> ChatSessionSummary {
        ChatSessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            message_count: self.messages.len(),
        }
    }
}

/// Session list entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionSummary {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

// ─────────────────────────────────────────────
// User mode
// ─────────────────────────────────────────────

/// Audience the client is tuned for. Passed explicitly to every consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserMode {
    #[default]
    Student,
    Professional,
}

impl UserMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            UserMode::Student => UserMode::Professional,
            UserMode::Professional => UserMode::Student,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UserMode::Student => "STUDENT",
            UserMode::Professional => "PROFESSIONAL",
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
