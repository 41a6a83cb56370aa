//! Event bus between the chat core and whatever renders it.

pub mod queue;
pub mod types;

pub use queue::EventBus;
pub use types::{ChatEvent, UpdateOrigin};
