//! Async event bus — carries chat core state changes to the view.
//!
//! Uses a tokio::sync::mpsc bounded channel. Publishing never waits on the
//! consumer: when the buffer is full the event is dropped. Every event
//! carries full state, so the next one brings the view up to date.

use super::types::ChatEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// The event bus connecting the chat core → view.
///
/// - Controllers publish `ChatEvent`s as their caches change
/// - The view consumes them and re-renders
pub struct EventBus {
    tx: mpsc::Sender<ChatEvent>,
    rx: tokio::sync::Mutex<mpsc::Receiver<ChatEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        EventBus {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Publish an event. Never blocks or fails the publisher: a full or
    /// closed bus drops the event.
    pub async fn publish(&self, event: ChatEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = event.kind(), "event bus full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                debug!(event = event.kind(), "event bus closed, dropping event");
            }
        }
    }

    /// Consume the next event (waits until available).
    /// Returns None if the bus has been closed.
    pub async fn consume(&self) -> Option<ChatEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub async fn try_consume(&self) -> Option<ChatEvent> {
        let mut rx = self.rx.lock().await;
        rx.try_recv().ok()
    }
}
