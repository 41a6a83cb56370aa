//! Finking Chat — the chat session sync core.
//!
//! This crate contains:
//! - **session_list**: the user's sessions and the active-session pointer
//! - **message_log**: the active session's messages and sending
//! - **chat_core**: composition of both plus subscription lifecycle
//! - **reply**: the bot reply generator

pub mod chat_core;
pub mod error;
pub mod message_log;
pub mod paths;
pub mod reply;
pub mod session_list;

pub use chat_core::ChatSyncCore;
pub use error::ChatError;
pub use message_log::{LogPhase, LogUpdate, MessageFeed, MessageLogController};
pub use paths::ChatPaths;
pub use reply::{ReplyGenerator, SimulatedReply};
pub use session_list::{ListUpdate, SessionFeed, SessionListController};
