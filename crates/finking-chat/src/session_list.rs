//! Session list controller.
//!
//! Keeps the signed-in user's sessions (newest first) and the active-session
//! pointer. The list is fed by a collection subscription; every snapshot
//! replaces the cached list wholesale.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tracing::{debug, info, warn};

use finking_core::bus::{ChatEvent, EventBus};
use finking_core::types::{ChatSession, ChatSessionSummary, SessionBody, SessionId, UserId};
use finking_core::utils::new_chat_title_today;
use finking_store::{Document, DocumentStore, OrderBy, Subscription, SubscriptionHandle, Write};

use crate::error::ChatError;
use crate::paths::ChatPaths;

#[derive(Default)]
struct ListState {
    user: Option<UserId>,
    sessions: Vec<ChatSession>,
    active: Option<SessionId>,
    /// Bumped on every subscribe/cancel; feeds from older generations are stale.
    generation: u64,
    handle: Option<SubscriptionHandle>,
}

impl ListState {
    fn summaries(&self) -> Vec<ChatSessionSummary> {
        self.sessions.iter().map(ChatSession::summary).collect()
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
        self.generation += 1;
    }
}

fn lock(state: &Mutex<ListState>) -> MutexGuard<'_, ListState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode_sessions(docs: Vec<Document>) -> Vec<ChatSession> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode::<SessionBody>() {
            Ok(body) => Some(ChatSession::from_body(
                SessionId::new(doc.id.into_string()),
                body,
            )),
            Err(e) => {
                warn!(document = %doc.path, error = %e, "skipping malformed session");
                None
            }
        })
        .collect()
}

// ─────────────────────────────────────────────
// SessionListController
// ─────────────────────────────────────────────

/// Lists a user's sessions and tracks which one is active.
pub struct SessionListController {
    store: Arc<dyn DocumentStore>,
    paths: ChatPaths,
    events: Arc<EventBus>,
    state: Arc<Mutex<ListState>>,
}

impl SessionListController {
    pub fn new(store: Arc<dyn DocumentStore>, paths: ChatPaths, events: Arc<EventBus>) -> Self {
        Self {
            store,
            paths,
            events,
            state: Arc::new(Mutex::new(ListState::default())),
        }
    }

    /// Start listening to `user`'s sessions, replacing any previous subscription.
    ///
    /// The returned feed must be polled for the cache to follow the store.
    pub async fn subscribe(&self, user: &UserId) -> Result<SessionFeed, ChatError> {
        let path = self.paths.sessions(user)?;
        let generation = {
            let mut state = lock(&self.state);
            state.stop();
            if state.user.as_ref() != Some(user) {
                state.sessions.clear();
                state.active = None;
            }
            state.user = Some(user.clone());
            state.generation
        };

        let sub = self
            .store
            .subscribe_collection(&path, OrderBy::desc("createdAt"))
            .await?;

        {
            let mut state = lock(&self.state);
            if state.generation == generation {
                state.handle = Some(sub.handle());
            } else {
                // Cancelled or resubscribed while we were waiting on the store.
                sub.cancel();
            }
        }

        info!(user = %user, collection = %path, "listening to sessions");
        Ok(SessionFeed {
            sub,
            generation,
            state: self.state.clone(),
            events: self.events.clone(),
        })
    }

    /// Create a new, empty session for `user` and make it active at once,
    /// without waiting for the list to show it.
    pub async fn create_session(&self, user: &UserId) -> Result<SessionId, ChatError> {
        let path = self.paths.sessions(user)?;
        let title = new_chat_title_today();
        let write = Write::new()
            .set("title", title.clone())
            .set("messages", json!([]))
            .server_timestamp("createdAt");

        let id = match self.store.create_document(&path, write).await {
            Ok(id) => SessionId::new(id.into_string()),
            Err(e) => {
                warn!(user = %user, error = %e, "failed to create session");
                self.events
                    .publish(ChatEvent::SyncError {
                        message: format!("could not create session: {e}"),
                    })
                    .await;
                return Err(e.into());
            }
        };

        let applied = {
            let mut state = lock(&self.state);
            let applied = state.user.as_ref() == Some(user);
            if applied {
                state.active = Some(id.clone());
            }
            applied
        };

        info!(session = %id, title = %title, "created session");
        if applied {
            self.events
                .publish(ChatEvent::ActiveSessionChanged {
                    session_id: Some(id.clone()),
                })
                .await;
        }
        Ok(id)
    }

    /// Point the active session at `session`. Returns `false` if it already was.
    pub async fn select_session(&self, session: &SessionId) -> bool {
        {
            let mut state = lock(&self.state);
            if state.active.as_ref() == Some(session) {
                return false;
            }
            state.active = Some(session.clone());
        }

        debug!(session = %session, "session selected");
        self.events
            .publish(ChatEvent::ActiveSessionChanged {
                session_id: Some(session.clone()),
            })
            .await;
        true
    }

    /// The active session's document is gone. If it is still the active one,
    /// move the pointer to the newest other cached session (or none).
    pub async fn fallback_after_missing(&self, missing: &SessionId) -> Option<SessionId> {
        let next = {
            let mut state = lock(&self.state);
            if state.active.as_ref() != Some(missing) {
                return None;
            }
            let next = state
                .sessions
                .iter()
                .find(|s| &s.id != missing)
                .map(|s| s.id.clone());
            state.active = next.clone();
            next
        };

        info!(missing = %missing, next = ?next, "active session removed");
        self.events
            .publish(ChatEvent::ActiveSessionChanged {
                session_id: next.clone(),
            })
            .await;
        next
    }

    /// Stop listening. Safe to call repeatedly.
    pub fn cancel(&self) {
        lock(&self.state).stop();
    }

    /// Stop listening and forget the user, the list, and the active pointer.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.stop();
        state.user = None;
        state.sessions.clear();
        state.active = None;
    }

    pub fn user(&self) -> Option<UserId> {
        lock(&self.state).user.clone()
    }

    pub fn active(&self) -> Option<SessionId> {
        lock(&self.state).active.clone()
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        lock(&self.state).sessions.clone()
    }

    pub fn summaries(&self) -> Vec<ChatSessionSummary> {
        lock(&self.state).summaries()
    }

    /// Whether `session` is in the cached list.
    pub fn contains(&self, session: &SessionId) -> bool {
        lock(&self.state).sessions.iter().any(|s| &s.id == session)
    }

    pub fn is_listening(&self) -> bool {
        lock(&self.state).handle.is_some()
    }
}

// ─────────────────────────────────────────────
// SessionFeed
// ─────────────────────────────────────────────

/// What a list snapshot changed.
#[derive(Clone, Debug, PartialEq)]
pub struct ListUpdate {
    pub session_count: usize,
    /// Set when the snapshot made its newest session active by default.
    pub default_selected: Option<SessionId>,
}

/// Applies list snapshots to the controller's cache.
pub struct SessionFeed {
    sub: Subscription<Vec<Document>>,
    generation: u64,
    state: Arc<Mutex<ListState>>,
    events: Arc<EventBus>,
}

impl SessionFeed {
    /// Wait for the next snapshot and apply it.
    ///
    /// Returns `None` once the subscription is cancelled or superseded.
    pub async fn next(&mut self) -> Option<ListUpdate> {
        let docs = self.sub.next().await?;
        let sessions = decode_sessions(docs);

        let (summaries, update) = {
            let mut state = lock(&self.state);
            if state.generation != self.generation {
                debug!(generation = self.generation, "dropping stale session snapshot");
                return None;
            }
            state.sessions = sessions;

            let mut default_selected = None;
            if state.active.is_none() {
                if let Some(newest) = state.sessions.first() {
                    default_selected = Some(newest.id.clone());
                }
                state.active = default_selected.clone();
            }

            let update = ListUpdate {
                session_count: state.sessions.len(),
                default_selected,
            };
            (state.summaries(), update)
        };

        debug!(sessions = update.session_count, "session list updated");
        self.events
            .publish(ChatEvent::SessionsChanged {
                sessions: summaries,
            })
            .await;
        if let Some(id) = &update.default_selected {
            info!(session = %id, "defaulting to newest session");
            self.events
                .publish(ChatEvent::ActiveSessionChanged {
                    session_id: Some(id.clone()),
                })
                .await;
        }
        Some(update)
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.sub.handle()
    }
}
