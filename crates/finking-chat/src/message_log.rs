//! Message log controller.
//!
//! Holds the active session's messages, fed by a document subscription, and
//! implements sending: optimistic local append, full-array merge-write, then
//! the generated bot reply appended and written the same way.
//!
//! Phases: `NoSession` → `Subscribed` (subscription open, nothing delivered
//! yet) → `Synced` (at least one snapshot applied). Switching sessions goes
//! back through `Subscribed`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use finking_core::bus::{ChatEvent, EventBus, UpdateOrigin};
use finking_core::config::RetryConfig;
use finking_core::types::{Message, SessionBody, SessionId, UserId};
use finking_store::{
    Document, DocumentPath, DocumentStore, StoreError, Subscription, SubscriptionHandle, Write,
};

use crate::error::ChatError;
use crate::paths::ChatPaths;
use crate::reply::ReplyGenerator;

/// Lifecycle of the message log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogPhase {
    #[default]
    NoSession,
    Subscribed,
    Synced,
}

#[derive(Default)]
struct LogState {
    user: Option<UserId>,
    session: Option<SessionId>,
    phase: LogPhase,
    messages: Vec<Message>,
    generation: u64,
    handle: Option<SubscriptionHandle>,
}

impl LogState {
    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
        self.generation += 1;
    }

    fn is_open_for(&self, session: &SessionId) -> bool {
        self.phase != LogPhase::NoSession && self.session.as_ref() == Some(session)
    }
}

fn lock(state: &Mutex<LogState>) -> MutexGuard<'_, LogState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────
// MessageLogController
// ─────────────────────────────────────────────

/// Keeps the active session's message log in sync and sends messages.
pub struct MessageLogController {
    store: Arc<dyn DocumentStore>,
    paths: ChatPaths,
    replies: Arc<dyn ReplyGenerator>,
    retry: RetryConfig,
    events: Arc<EventBus>,
    state: Arc<Mutex<LogState>>,
}

impl MessageLogController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        paths: ChatPaths,
        replies: Arc<dyn ReplyGenerator>,
        retry: RetryConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            paths,
            replies,
            retry,
            events,
            state: Arc::new(Mutex::new(LogState::default())),
        }
    }

    /// Open the log of `session`, cancelling the previous subscription first.
    ///
    /// The cached log is cleared right away; the returned feed fills it.
    pub async fn subscribe(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Result<MessageFeed, ChatError> {
        let path = self.paths.session(user, session)?;
        let generation = {
            let mut state = lock(&self.state);
            state.stop();
            state.user = Some(user.clone());
            state.session = Some(session.clone());
            state.phase = LogPhase::Subscribed;
            state.messages.clear();
            state.generation
        };
        self.events
            .publish(ChatEvent::MessagesChanged {
                session_id: session.clone(),
                messages: Vec::new(),
                origin: UpdateOrigin::Local,
            })
            .await;

        let sub = match self.store.subscribe_document(&path).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(session = %session, error = %e, "failed to open message log");
                let mut state = lock(&self.state);
                if state.generation == generation {
                    state.session = None;
                    state.phase = LogPhase::NoSession;
                }
                return Err(e.into());
            }
        };

        {
            let mut state = lock(&self.state);
            if state.generation == generation {
                state.handle = Some(sub.handle());
            } else {
                sub.cancel();
            }
        }

        info!(session = %session, "message log opened");
        Ok(MessageFeed {
            sub,
            session: session.clone(),
            generation,
            state: self.state.clone(),
            events: self.events.clone(),
            finished: false,
        })
    }

    /// Send `text` in `session` and persist the bot's reply after it.
    ///
    /// The user message shows up in the local log before any store write.
    /// If a write still fails after retries, the message it carried is
    /// removed from the local log again, a `SyncError` event is published,
    /// and the error is returned.
    pub async fn send_message(&self, session: &SessionId, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let user_message = Message::user(text);
        let (user, updated) = {
            let mut state = lock(&self.state);
            if !state.is_open_for(session) {
                return Err(ChatError::NoActiveSession);
            }
            let user = state.user.clone().ok_or(ChatError::NotSignedIn)?;
            state.messages.push(user_message.clone());
            (user, state.messages.clone())
        };
        self.publish_local(session, updated.clone()).await;

        let path = self.paths.session(&user, session)?;
        if let Err(e) = self.write_messages(&path, &updated).await {
            self.roll_back(session, &user_message, &e).await;
            return Err(e.into());
        }

        let bot_message = Message::bot(self.replies.generate(text));
        let mut finished = updated;
        finished.push(bot_message.clone());

        let still_active = {
            let mut state = lock(&self.state);
            let active = state.is_open_for(session);
            if active {
                state.messages = finished.clone();
            }
            active
        };
        if still_active {
            self.publish_local(session, finished.clone()).await;
        } else {
            debug!(session = %session, "session switched during send, persisting reply only");
        }

        if let Err(e) = self.write_messages(&path, &finished).await {
            self.roll_back(session, &bot_message, &e).await;
            return Err(e.into());
        }

        debug!(session = %session, messages = finished.len(), "message exchange persisted");
        Ok(())
    }

    /// Merge-write the full message array, retrying transient failures.
    async fn write_messages(
        &self,
        path: &DocumentPath,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            let write = Write::new().set_serialized("messages", &messages)?;
            match self.store.merge_write(path, write).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        document = %path,
                        attempt,
                        error = %e,
                        "merge-write failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(document = %path, attempts = attempt, error = %e, "merge-write failed");
                    return Err(e);
                }
            }
        }
    }

    async fn roll_back(&self, session: &SessionId, message: &Message, cause: &StoreError) {
        let rolled_back = {
            let mut state = lock(&self.state);
            if !state.is_open_for(session) {
                None
            } else if let Some(pos) = state.messages.iter().rposition(|m| m == message) {
                state.messages.remove(pos);
                Some(state.messages.clone())
            } else {
                None
            }
        };

        if let Some(messages) = rolled_back {
            self.publish_local(session, messages).await;
        }
        self.events
            .publish(ChatEvent::SyncError {
                message: format!("could not save message: {cause}"),
            })
            .await;
    }

    async fn publish_local(&self, session: &SessionId, messages: Vec<Message>) {
        self.events
            .publish(ChatEvent::MessagesChanged {
                session_id: session.clone(),
                messages,
                origin: UpdateOrigin::Local,
            })
            .await;
    }

    /// Close the log. Safe to call repeatedly.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        state.stop();
        state.session = None;
        state.phase = LogPhase::NoSession;
        state.messages.clear();
    }

    pub fn session(&self) -> Option<SessionId> {
        lock(&self.state).session.clone()
    }

    pub fn phase(&self) -> LogPhase {
        lock(&self.state).phase
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    /// Whether the log is open (subscribed or synced) for `session`.
    pub fn is_open_for(&self, session: &SessionId) -> bool {
        lock(&self.state).is_open_for(session)
    }
}

// ─────────────────────────────────────────────
// MessageFeed
// ─────────────────────────────────────────────

/// What a document snapshot did to the log.
#[derive(Clone, Debug, PartialEq)]
pub enum LogUpdate {
    /// The log was replaced by the store's copy.
    Synced { message_count: usize },
    /// The session document does not exist. The feed ends after this.
    NotFound(SessionId),
}

/// Applies document snapshots to the controller's log.
pub struct MessageFeed {
    sub: Subscription<Option<Document>>,
    session: SessionId,
    generation: u64,
    state: Arc<Mutex<LogState>>,
    events: Arc<EventBus>,
    finished: bool,
}

impl MessageFeed {
    /// Wait for the next snapshot and apply it.
    ///
    /// Returns `None` once cancelled, superseded by another `subscribe`, or
    /// after reporting `NotFound`.
    pub async fn next(&mut self) -> Option<LogUpdate> {
        loop {
            if self.finished {
                return None;
            }
            let snapshot = self.sub.next().await?;

            let Some(doc) = snapshot else {
                return self.not_found().await;
            };

            let body = match doc.decode::<SessionBody>() {
                Ok(body) => body,
                Err(e) => {
                    warn!(session = %self.session, error = %e, "ignoring malformed session snapshot");
                    continue;
                }
            };

            {
                let mut state = lock(&self.state);
                if state.generation != self.generation {
                    debug!(session = %self.session, "dropping stale message snapshot");
                    return None;
                }
                state.messages = body.messages.clone();
                state.phase = LogPhase::Synced;
            }

            let message_count = body.messages.len();
            debug!(session = %self.session, messages = message_count, "message log synced");
            self.events
                .publish(ChatEvent::MessagesChanged {
                    session_id: self.session.clone(),
                    messages: body.messages,
                    origin: UpdateOrigin::Store,
                })
                .await;
            return Some(LogUpdate::Synced { message_count });
        }
    }

    async fn not_found(&mut self) -> Option<LogUpdate> {
        self.finished = true;
        {
            let mut state = lock(&self.state);
            if state.generation != self.generation {
                return None;
            }
            state.stop();
            state.session = None;
            state.phase = LogPhase::NoSession;
            state.messages.clear();
        }

        warn!(session = %self.session, "session document not found");
        self.events
            .publish(ChatEvent::SessionNotFound {
                session_id: self.session.clone(),
            })
            .await;
        Some(LogUpdate::NotFound(self.session.clone()))
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.sub.handle()
    }
}
