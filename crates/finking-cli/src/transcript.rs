//! Turns chat core events into terminal lines.
//!
//! Remembers which messages of the active session are already on screen, so
//! every message is printed once no matter how snapshots interleave. The
//! user's own messages are not echoed back when they arrive as optimistic
//! local updates.

use colored::Colorize;

use finking_core::bus::{ChatEvent, UpdateOrigin};
use finking_core::types::{Message, Sender, SessionId};

/// Shown when the active session's stored log is empty.
pub const GREETING: &str = "Hello! I am your financial assistant. How can I help you today?";

#[derive(Debug, Default)]
pub struct Transcript {
    session: Option<SessionId>,
    shown: Vec<Message>,
    greeted: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `event`, in order. Empty when nothing is visible.
    pub fn render(&mut self, event: &ChatEvent) -> Vec<String> {
        match event {
            ChatEvent::MessagesChanged {
                session_id,
                messages,
                origin,
            } => self.render_messages(session_id, messages, *origin),
            ChatEvent::ActiveSessionChanged {
                session_id: Some(id),
            } => {
                if self.session.as_ref() == Some(id) {
                    return Vec::new();
                }
                self.switch_to(Some(id.clone()));
                vec![format!("→ session {id}").dimmed().to_string()]
            }
            ChatEvent::ActiveSessionChanged { session_id: None } => {
                self.switch_to(None);
                vec!["→ no active session (/new to start one)".dimmed().to_string()]
            }
            ChatEvent::SessionNotFound { session_id } => {
                vec![format!("⚠ session {session_id} no longer exists").yellow().to_string()]
            }
            ChatEvent::SyncError { message } => {
                vec![format!("❌ {message}").red().to_string()]
            }
            ChatEvent::SessionsChanged { .. } => Vec::new(),
        }
    }

    fn switch_to(&mut self, session: Option<SessionId>) {
        self.session = session;
        self.shown.clear();
        self.greeted = false;
    }

    fn render_messages(
        &mut self,
        session: &SessionId,
        messages: &[Message],
        origin: UpdateOrigin,
    ) -> Vec<String> {
        if self.session.as_ref() != Some(session) {
            self.switch_to(Some(session.clone()));
        }

        if messages.is_empty() {
            if origin == UpdateOrigin::Store && self.shown.is_empty() && !self.greeted {
                self.greeted = true;
                return vec![format_greeting()];
            }
            return Vec::new();
        }

        let mut lines = Vec::new();
        for message in messages {
            if self.shown.contains(message) {
                continue;
            }
            self.shown.push(message.clone());
            if origin == UpdateOrigin::Local && message.sender == Sender::User {
                continue;
            }
            lines.push(format_message(message));
        }
        lines
    }
}

fn format_greeting() -> String {
    format!("{} {}", "👑 FinKing:".cyan().bold(), GREETING)
}

pub fn format_message(message: &Message) -> String {
    let time = message.timestamp.with_timezone(&chrono::Local).format("%H:%M");
    match message.sender {
        Sender::User => format!("{} {} {}", time.to_string().dimmed(), "You:".bold(), message.text),
        Sender::Bot => format!(
            "{} {} {}",
            time.to_string().dimmed(),
            "👑 FinKing:".cyan().bold(),
            message.text
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(session: &str, messages: Vec<Message>, origin: UpdateOrigin) -> ChatEvent {
        ChatEvent::MessagesChanged {
            session_id: SessionId::from(session),
            messages,
            origin,
        }
    }

    #[test]
    fn local_user_echo_suppressed_bot_shown_once() {
        colored::control::set_override(false);
        let mut transcript = Transcript::new();
        let user = Message::user("hello");
        let bot = Message::bot("hi there");

        assert!(transcript
            .render(&changed("s1", vec![user.clone()], UpdateOrigin::Local))
            .is_empty());

        let lines = transcript.render(&changed(
            "s1",
            vec![user.clone(), bot.clone()],
            UpdateOrigin::Local,
        ));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("hi there"));

        // The store confirming the same log prints nothing new.
        assert!(transcript
            .render(&changed("s1", vec![user, bot], UpdateOrigin::Store))
            .is_empty());
    }

    #[test]
    fn history_printed_on_switch() {
        colored::control::set_override(false);
        let mut transcript = Transcript::new();
        transcript.render(&changed("a", vec![Message::user("old")], UpdateOrigin::Store));

        let lines = transcript.render(&ChatEvent::ActiveSessionChanged {
            session_id: Some(SessionId::from("b")),
        });
        assert_eq!(lines.len(), 1);

        assert!(transcript
            .render(&changed("b", vec![], UpdateOrigin::Local))
            .is_empty());
        let lines = transcript.render(&changed(
            "b",
            vec![Message::user("q"), Message::bot("a")],
            UpdateOrigin::Store,
        ));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("You: q"));
    }

    #[test]
    fn message_after_rollback_is_printed() {
        colored::control::set_override(false);
        let mut transcript = Transcript::new();
        let kept = Message::bot("kept");
        transcript.render(&changed("s1", vec![kept.clone()], UpdateOrigin::Store));
        transcript.render(&changed(
            "s1",
            vec![kept.clone(), Message::user("lost")],
            UpdateOrigin::Local,
        ));

        assert!(transcript
            .render(&changed("s1", vec![kept.clone()], UpdateOrigin::Local))
            .is_empty());
        let lines = transcript.render(&changed(
            "s1",
            vec![kept, Message::bot("next")],
            UpdateOrigin::Store,
        ));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("next"));
    }

    #[test]
    fn errors_are_rendered() {
        colored::control::set_override(false);
        let mut transcript = Transcript::new();
        let lines = transcript.render(&ChatEvent::SyncError {
            message: "could not save message".into(),
        });
        assert_eq!(lines, vec!["❌ could not save message".to_string()]);
        assert!(transcript
            .render(&ChatEvent::SessionsChanged { sessions: vec![] })
            .is_empty());
    }

    #[test]
    fn stale_snapshot_does_not_reprint() {
        colored::control::set_override(false);
        let mut transcript = Transcript::new();
        let q1 = Message::user("q1");
        let a1 = Message::bot("a1");
        let q2 = Message::user("q2");
        let a2 = Message::bot("a2");

        let lines = transcript.render(&changed(
            "s1",
            vec![q1.clone(), a1.clone(), q2.clone(), a2.clone()],
            UpdateOrigin::Store,
        ));
        assert_eq!(lines.len(), 4);

        // An older snapshot lands late, then the full one again.
        assert!(transcript
            .render(&changed("s1", vec![q1.clone(), a1.clone()], UpdateOrigin::Store))
            .is_empty());
        assert!(transcript
            .render(&changed("s1", vec![q1, a1, q2, a2], UpdateOrigin::Store))
            .is_empty());
    }

    #[test]
    fn greeting_for_empty_stored_log() {
        colored::control::set_override(false);
        let mut transcript = Transcript::new();
        transcript.render(&ChatEvent::ActiveSessionChanged {
            session_id: Some(SessionId::from("s1")),
        });

        // The local clear on subscribe shows nothing.
        assert!(transcript
            .render(&changed("s1", vec![], UpdateOrigin::Local))
            .is_empty());
        let lines = transcript.render(&changed("s1", vec![], UpdateOrigin::Store));
        assert_eq!(lines, vec![format!("👑 FinKing: {GREETING}")]);
        assert!(transcript
            .render(&changed("s1", vec![], UpdateOrigin::Store))
            .is_empty());

        // A new session greets again.
        transcript.render(&ChatEvent::ActiveSessionChanged {
            session_id: Some(SessionId::from("s2")),
        });
        let lines = transcript.render(&changed("s2", vec![], UpdateOrigin::Store));
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn no_greeting_for_session_with_history() {
        colored::control::set_override(false);
        let mut transcript = Transcript::new();
        let lines = transcript.render(&changed(
            "s1",
            vec![Message::user("q"), Message::bot("a")],
            UpdateOrigin::Store,
        ));
        assert!(lines.iter().all(|l| !l.contains(GREETING)));
    }
}
