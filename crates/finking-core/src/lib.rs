//! Finking core — shared types, event bus, configuration, and utilities.
//!
//! - **types**: sessions, messages, identifiers, user mode
//! - **bus**: `EventBus` carrying `ChatEvent`s from the chat core to the view
//! - **config**: JSON config with env overrides
//! - **auth**: one-shot auth readiness handshake

pub mod auth;
pub mod bus;
pub mod config;
pub mod types;
pub mod utils;

pub use bus::{ChatEvent, EventBus, UpdateOrigin};
pub use types::{ChatSession, ChatSessionSummary, Message, Sender, SessionBody, SessionId, UserId, UserMode};
