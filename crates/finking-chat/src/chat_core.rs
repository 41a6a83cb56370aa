//! Chat sync core — composes the session list and the message log and owns
//! their subscription lifecycle.
//!
//! Each controller feed is drained by a spawned pump task. The pumps hold a
//! `Weak` reference back to the core, so dropping the core stops everything.
//! Lifecycle changes (sign-in, session switches) are serialized by an async
//! lock; sends are not.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use finking_core::bus::{ChatEvent, EventBus};
use finking_core::config::Config;
use finking_core::types::{ChatSessionSummary, Message, SessionId, UserId};
use finking_store::DocumentStore;

use crate::error::ChatError;
use crate::message_log::{LogPhase, LogUpdate, MessageFeed, MessageLogController};
use crate::paths::ChatPaths;
use crate::reply::ReplyGenerator;
use crate::session_list::{SessionFeed, SessionListController};

#[derive(Default)]
struct Pumps {
    list: Option<JoinHandle<()>>,
    log: Option<JoinHandle<()>>,
}

impl Pumps {
    fn abort_all(&mut self) {
        for handle in [self.list.take(), self.log.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

fn lock(pumps: &Mutex<Pumps>) -> MutexGuard<'_, Pumps> {
    pumps.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CoreInner {
    store_name: String,
    sessions: SessionListController,
    log: MessageLogController,
    events: Arc<EventBus>,
    lifecycle: tokio::sync::Mutex<()>,
    pumps: Mutex<Pumps>,
}

impl CoreInner {
    /// Abort pumps and close both subscriptions.
    fn stop_all(&self) {
        lock(&self.pumps).abort_all();
        self.log.cancel();
        self.sessions.reset();
    }

    async fn activate(self: &Arc<Self>, session: &SessionId) -> Result<(), ChatError> {
        let _guard = self.lifecycle.lock().await;
        self.open_log(session).await
    }

    /// Point the message log at `session`. Caller holds the lifecycle lock.
    async fn open_log(self: &Arc<Self>, session: &SessionId) -> Result<(), ChatError> {
        let user = self.sessions.user().ok_or(ChatError::NotSignedIn)?;
        if self.sessions.active().as_ref() != Some(session) {
            debug!(session = %session, "activation superseded");
            return Ok(());
        }
        if self.log.is_open_for(session) {
            return Ok(());
        }

        let old = lock(&self.pumps).log.take();
        if let Some(old) = old {
            old.abort();
        }

        let feed = self.log.subscribe(&user, session).await?;
        let pump = tokio::spawn(run_log_pump(Arc::downgrade(self), feed));
        lock(&self.pumps).log = Some(pump);
        Ok(())
    }

    async fn recover_missing(self: &Arc<Self>, missing: SessionId) {
        let _guard = self.lifecycle.lock().await;
        let Some(next) = self.sessions.fallback_after_missing(&missing).await else {
            return;
        };
        if let Err(e) = self.open_log(&next).await {
            warn!(session = %next, error = %e, "failed to open fallback session");
            self.report(&e).await;
        }
    }

    async fn report(&self, error: &ChatError) {
        self.events
            .publish(ChatEvent::SyncError {
                message: error.to_string(),
            })
            .await;
    }
}

async fn run_list_pump(core: Weak<CoreInner>, mut feed: SessionFeed) {
    while let Some(update) = feed.next().await {
        let Some(id) = update.default_selected else {
            continue;
        };
        let Some(core) = core.upgrade() else {
            break;
        };
        if let Err(e) = core.activate(&id).await {
            warn!(session = %id, error = %e, "failed to open default session");
            core.report(&e).await;
        }
    }
    debug!("session list pump stopped");
}

async fn run_log_pump(core: Weak<CoreInner>, mut feed: MessageFeed) {
    while let Some(update) = feed.next().await {
        if let LogUpdate::NotFound(missing) = update {
            if let Some(core) = core.upgrade() {
                spawn_recovery(core, missing);
            }
            break;
        }
    }
    debug!(session = %feed.session(), "message log pump stopped");
}

/// Fallback runs in its own task: it replaces the log pump that found the
/// session missing.
fn spawn_recovery(core: Arc<CoreInner>, missing: SessionId) {
    tokio::spawn(async move { core.recover_missing(missing).await });
}

// ─────────────────────────────────────────────
// ChatSyncCore
// ─────────────────────────────────────────────

/// The chat session sync core.
///
/// State changes are published on [`ChatSyncCore::events`]; getters return
/// snapshots of the current caches.
pub struct ChatSyncCore {
    inner: Arc<CoreInner>,
}

impl ChatSyncCore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        replies: Arc<dyn ReplyGenerator>,
        config: &Config,
    ) -> Self {
        let events = Arc::new(EventBus::new(config.sync.event_buffer));
        let paths = ChatPaths::new(config.app_id.clone());
        let store_name = store.display_name().to_string();

        let sessions = SessionListController::new(store.clone(), paths.clone(), events.clone());
        let log = MessageLogController::new(
            store,
            paths,
            replies,
            config.sync.write_retry.clone(),
            events.clone(),
        );

        Self {
            inner: Arc::new(CoreInner {
                store_name,
                sessions,
                log,
                events,
                lifecycle: tokio::sync::Mutex::new(()),
                pumps: Mutex::new(Pumps::default()),
            }),
        }
    }

    /// The bus carrying this core's state changes.
    pub fn events(&self) -> Arc<EventBus> {
        self.inner.events.clone()
    }

    /// Start syncing `user`'s sessions. Signing in as someone else first
    /// cancels every subscription and clears all cached state.
    pub async fn sign_in(&self, user: UserId) -> Result<(), ChatError> {
        let _guard = self.inner.lifecycle.lock().await;
        if self.inner.sessions.user().as_ref() == Some(&user) && self.inner.sessions.is_listening()
        {
            return Ok(());
        }

        self.inner.stop_all();
        let feed = match self.inner.sessions.subscribe(&user).await {
            Ok(feed) => feed,
            Err(e) => {
                self.inner.sessions.reset();
                return Err(e);
            }
        };
        let pump = tokio::spawn(run_list_pump(Arc::downgrade(&self.inner), feed));
        lock(&self.inner.pumps).list = Some(pump);

        info!(user = %user, store = %self.inner.store_name, "signed in");
        Ok(())
    }

    /// Cancel everything and go back to the signed-out state.
    pub async fn sign_out(&self) {
        let _guard = self.inner.lifecycle.lock().await;
        let was_signed_in = self.inner.sessions.user().is_some();
        self.inner.stop_all();
        if !was_signed_in {
            return;
        }

        info!("signed out");
        self.inner
            .events
            .publish(ChatEvent::SessionsChanged {
                sessions: Vec::new(),
            })
            .await;
        self.inner
            .events
            .publish(ChatEvent::ActiveSessionChanged { session_id: None })
            .await;
    }

    /// Create a new session and switch to it.
    pub async fn create_session(&self) -> Result<SessionId, ChatError> {
        let user = self.inner.sessions.user().ok_or(ChatError::NotSignedIn)?;
        let id = self.inner.sessions.create_session(&user).await?;
        self.inner.activate(&id).await?;
        Ok(id)
    }

    /// Switch the active session. The old message subscription is cancelled
    /// before the new one opens. Only sessions in the current list (or the
    /// active one) can be selected.
    pub async fn select_session(&self, session: &SessionId) -> Result<(), ChatError> {
        let _guard = self.inner.lifecycle.lock().await;
        if self.inner.sessions.user().is_none() {
            return Err(ChatError::NotSignedIn);
        }
        let known = self.inner.sessions.active().as_ref() == Some(session)
            || self.inner.sessions.contains(session);
        if !known {
            return Err(ChatError::SessionNotFound(session.clone()));
        }
        self.inner.sessions.select_session(session).await;
        self.inner.open_log(session).await
    }

    /// Send a message in the active session.
    pub async fn send_message(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        let session = self
            .inner
            .sessions
            .active()
            .ok_or(ChatError::NoActiveSession)?;
        self.inner.log.send_message(&session, text).await
    }

    pub fn user(&self) -> Option<UserId> {
        self.inner.sessions.user()
    }

    pub fn sessions(&self) -> Vec<ChatSessionSummary> {
        self.inner.sessions.summaries()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.inner.sessions.active()
    }

    /// The active session's message log.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.log.messages()
    }

    pub fn log_phase(&self) -> LogPhase {
        self.inner.log.phase()
    }

    /// Cancel both subscriptions and stop the pumps. Idempotent.
    pub fn teardown(&self) {
        self.inner.stop_all();
        debug!("chat core torn down");
    }
}

impl Drop for ChatSyncCore {
    fn drop(&mut self) {
        self.inner.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use finking_core::config::RetryConfig;
    use finking_core::types::{SessionBody, Sender};
    use finking_store::{MemoryStore, Write};
    use serde_json::json;

    use crate::reply::SimulatedReply;

    fn config() -> Config {
        let mut config = Config::default();
        config.app_id = "app".to_string();
        config.sync.event_buffer = 1024;
        config.sync.write_retry = RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        config
    }

    fn setup() -> (ChatSyncCore, MemoryStore) {
        let store = MemoryStore::new();
        let core = ChatSyncCore::new(Arc::new(store.clone()), Arc::new(SimulatedReply), &config());
        (core, store)
    }

    fn doc_path(user: &str, session: &str) -> finking_store::DocumentPath {
        ChatPaths::new("app")
            .session(&UserId::from(user), &SessionId::from(session))
            .unwrap()
    }

    async fn seed(store: &MemoryStore, user: &str, id: &str, created_at: &str) {
        store
            .merge_write(
                &doc_path(user, id),
                Write::new()
                    .set("title", id)
                    .set("createdAt", created_at)
                    .set("messages", json!([])),
            )
            .await
            .unwrap();
    }

    fn stored_messages(store: &MemoryStore, user: &str, session: &str) -> Vec<Message> {
        store
            .get(&doc_path(user, session))
            .and_then(|doc| doc.decode::<SessionBody>().ok())
            .map(|body| body.messages)
            .unwrap_or_default()
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn synced_on(core: &ChatSyncCore, session: &SessionId) {
        eventually(|| {
            core.active_session().as_ref() == Some(session) && core.log_phase() == LogPhase::Synced
        })
        .await;
    }

    #[tokio::test]
    async fn test_sign_in_defaults_to_newest_session() {
        let (core, store) = setup();
        seed(&store, "u1", "a", "2024-07-01T10:00:00Z").await;
        seed(&store, "u1", "c", "2024-07-03T10:00:00Z").await;
        seed(&store, "u1", "b", "2024-07-02T10:00:00Z").await;

        core.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&core, &SessionId::from("c")).await;

        let titles: Vec<_> = core.sessions().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let (core, store) = setup();
        core.sign_in(UserId::from("u1")).await.unwrap();
        let id = core.create_session().await.unwrap();
        synced_on(&core, &id).await;

        core.send_message("hello").await.unwrap();

        let stored = stored_messages(&store, "u1", id.as_str());
        assert_eq!(stored.len(), 2);
        assert_eq!((stored[0].sender, stored[0].text.as_str()), (Sender::User, "hello"));
        assert_eq!(stored[1].sender, Sender::Bot);
        assert_eq!(stored[1].text, SimulatedReply.generate("hello"));
        eventually(|| core.messages() == stored).await;

        // A fresh core over the same store sees the same log.
        drop(core);
        let other = ChatSyncCore::new(Arc::new(store.clone()), Arc::new(SimulatedReply), &config());
        other.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&other, &id).await;
        assert_eq!(other.messages(), stored);
    }

    #[tokio::test]
    async fn test_log_survives_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("store.json");

        let (id, sent) = {
            let store = MemoryStore::open(&file).unwrap();
            let core = ChatSyncCore::new(Arc::new(store), Arc::new(SimulatedReply), &config());
            core.sign_in(UserId::from("u1")).await.unwrap();
            let id = core.create_session().await.unwrap();
            synced_on(&core, &id).await;
            core.send_message("persist me").await.unwrap();
            eventually(|| core.messages().len() == 2).await;
            (id, core.messages())
        };

        let store = MemoryStore::open(&file).unwrap();
        let core = ChatSyncCore::new(Arc::new(store), Arc::new(SimulatedReply), &config());
        core.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&core, &id).await;
        assert_eq!(core.messages(), sent);
    }

    #[tokio::test]
    async fn test_blank_send_never_writes() {
        let (core, store) = setup();
        core.sign_in(UserId::from("u1")).await.unwrap();
        let id = core.create_session().await.unwrap();
        synced_on(&core, &id).await;
        let writes = store.write_count();

        let result = core.send_message("  \t ").await;
        assert!(matches!(result, Err(ChatError::EmptyInput)));
        assert_eq!(store.write_count(), writes);
        assert!(core.messages().is_empty());
    }

    #[tokio::test]
    async fn test_switch_isolates_logs() {
        let (core, store) = setup();
        seed(&store, "u1", "a", "2024-07-01T10:00:00Z").await;
        seed(&store, "u1", "b", "2024-07-02T10:00:00Z").await;
        core.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&core, &SessionId::from("b")).await;

        let a = SessionId::from("a");
        core.select_session(&a).await.unwrap();
        synced_on(&core, &a).await;

        store
            .merge_write(
                &doc_path("u1", "b"),
                Write::new()
                    .set_serialized("messages", &vec![Message::user("to b")])
                    .unwrap(),
            )
            .await
            .unwrap();
        store
            .merge_write(
                &doc_path("u1", "a"),
                Write::new()
                    .set_serialized("messages", &vec![Message::user("to a")])
                    .unwrap(),
            )
            .await
            .unwrap();

        eventually(|| !core.messages().is_empty()).await;
        let texts: Vec<_> = core.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["to a"]);
        // Exactly one live document subscription plus the list.
        assert_eq!(store.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_create_session_from_empty_store() {
        let (core, store) = setup();
        core.sign_in(UserId::from("u1")).await.unwrap();
        eventually(|| store.subscriber_count() == 1).await;
        assert_eq!(core.active_session(), None);

        let id = core.create_session().await.unwrap();
        assert_eq!(core.active_session(), Some(id.clone()));

        eventually(|| core.sessions().len() == 1).await;
        assert_eq!(core.sessions()[0].id, id);
        synced_on(&core, &id).await;
    }

    #[tokio::test]
    async fn test_deleted_active_session_falls_back() {
        let (core, store) = setup();
        seed(&store, "u1", "a", "2024-07-01T10:00:00Z").await;
        seed(&store, "u1", "b", "2024-07-02T10:00:00Z").await;
        let events = core.events();
        core.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&core, &SessionId::from("b")).await;

        store.delete_document(&doc_path("u1", "b"));

        let not_found = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.consume().await {
                    Some(ChatEvent::SessionNotFound { session_id }) => return session_id,
                    Some(_) => continue,
                    None => panic!("bus closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(not_found, SessionId::from("b"));

        synced_on(&core, &SessionId::from("a")).await;
        eventually(|| core.sessions().len() == 1).await;
    }

    #[tokio::test]
    async fn test_sign_in_as_other_user_resets() {
        let (core, store) = setup();
        seed(&store, "u1", "mine", "2024-07-01T10:00:00Z").await;
        seed(&store, "u2", "theirs", "2024-07-02T10:00:00Z").await;

        core.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&core, &SessionId::from("mine")).await;

        core.sign_in(UserId::from("u2")).await.unwrap();
        synced_on(&core, &SessionId::from("theirs")).await;
        let ids: Vec<_> = core.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SessionId::from("theirs")]);
        assert_eq!(store.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_cancels_everything() {
        let (core, store) = setup();
        seed(&store, "u1", "a", "2024-07-01T10:00:00Z").await;
        core.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&core, &SessionId::from("a")).await;

        core.sign_out().await;
        assert_eq!(store.subscriber_count(), 0);
        assert_eq!(core.user(), None);
        assert_eq!(core.active_session(), None);
        assert_eq!(core.log_phase(), LogPhase::NoSession);

        assert!(matches!(core.send_message("hi").await, Err(ChatError::NoActiveSession)));
        assert!(matches!(core.create_session().await, Err(ChatError::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let (core, store) = setup();
        seed(&store, "u1", "a", "2024-07-01T10:00:00Z").await;
        core.sign_in(UserId::from("u1")).await.unwrap();
        synced_on(&core, &SessionId::from("a")).await;

        core.teardown();
        core.teardown();
        assert_eq!(store.subscriber_count(), 0);
        drop(core);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_fails_when_store_offline() {
        let (core, store) = setup();
        store.set_available(false);
        let result = core.sign_in(UserId::from("u1")).await;
        assert!(matches!(result, Err(ChatError::StoreUnavailable(_))));
        assert_eq!(core.user(), None);

        store.set_available(true);
        core.sign_in(UserId::from("u1")).await.unwrap();
        assert_eq!(core.user(), Some(UserId::from("u1")));
    }

    #[tokio::test]
    async fn test_failed_send_publishes_sync_error() {
        let (core, store) = setup();
        core.sign_in(UserId::from("u1")).await.unwrap();
        let id = core.create_session().await.unwrap();
        synced_on(&core, &id).await;
        let events = core.events();
        while events.try_consume().await.is_some() {}

        store.fail_next_writes(2);
        let result = core.send_message("hi").await;
        assert!(matches!(result, Err(ChatError::StoreUnavailable(_))));
        assert!(core.messages().is_empty());

        let mut kinds = Vec::new();
        while let Some(ev) = events.try_consume().await {
            kinds.push(ev.kind());
        }
        assert!(kinds.contains(&"sync_error"));
    }

    #[tokio::test]
    async fn test_select_unknown_session_rejected() {
        let (core, store) = setup();
        seed(&store, "u1", "a", "2024-07-01T10:00:00Z").await;
        core.sign_in(UserId::from("u1")).await.unwrap();
        let a = SessionId::from("a");
        synced_on(&core, &a).await;

        let result = core.select_session(&SessionId::from("ghost")).await;
        assert!(matches!(result, Err(ChatError::SessionNotFound(id)) if id.as_str() == "ghost"));
        assert_eq!(core.active_session(), Some(a.clone()));
        assert_eq!(core.log_phase(), LogPhase::Synced);

        // Re-selecting the active session is fine.
        core.select_session(&a).await.unwrap();
    }

    #[tokio::test]
    async fn test_sends_never_wait_on_unread_events() {
        let store = MemoryStore::new();
        let mut config = config();
        config.sync.event_buffer = 4;
        let core = ChatSyncCore::new(Arc::new(store.clone()), Arc::new(SimulatedReply), &config);
        core.sign_in(UserId::from("u1")).await.unwrap();
        let id = core.create_session().await.unwrap();
        synced_on(&core, &id).await;

        // Nobody consumes the bus.
        tokio::time::timeout(Duration::from_secs(2), async {
            for i in 0..40 {
                core.send_message(&format!("msg {i}")).await.unwrap();
            }
        })
        .await
        .expect("send_message blocked on a full event bus");

        assert_eq!(stored_messages(&store, "u1", id.as_str()).len(), 80);
        core.select_session(&id).await.unwrap();
        eventually(|| core.messages().len() == 80).await;
    }
}
