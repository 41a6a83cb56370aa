//! Reply generation.
//!
//! The core asks a `ReplyGenerator` for the bot's answer right after the
//! user's message is persisted. Generation is synchronous and total: it
//! always produces some text.

/// Produces the bot reply for a user message.
pub trait ReplyGenerator: Send + Sync {
    fn generate(&self, text: &str) -> String;
}

/// Echoes the user's text back in a fixed template.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedReply;

impl ReplyGenerator for SimulatedReply {
    fn generate(&self, text: &str) -> String {
        format!("Hello! You said: \"{text}\". This is a simulated response.")
    }
}
