//! Push subscriptions.
//!
//! A `Subscription<T>` yields every snapshot the store pushes until it is
//! cancelled. Cancellation goes through a cloneable `SubscriptionHandle`, so
//! the task reading snapshots and the component that owns the lifecycle can
//! be different. Cancelling is idempotent: the store is told at most once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

type CancelFn = dyn Fn(u64) + Send + Sync;

/// Cancels a subscription. Cheap to clone.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    on_cancel: Arc<CancelFn>,
}

impl SubscriptionHandle {
    /// `on_cancel` runs exactly once, on the first `cancel()`.
    pub fn new(id: u64, on_cancel: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
            on_cancel: Arc::new(on_cancel),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop delivery. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            (self.on_cancel)(self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Stream of snapshots from one store subscription.
///
/// Dropping the subscription cancels it.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, handle: SubscriptionHandle) -> Self {
        Self { rx, handle }
    }

    /// Next snapshot, or `None` once cancelled or the store went away.
    ///
    /// A snapshot already queued when `cancel()` ran is not delivered.
    pub async fn next(&mut self) -> Option<T> {
        if self.handle.is_cancelled() {
            return None;
        }
        let item = self.rx.recv().await?;
        if self.handle.is_cancelled() {
            return None;
        }
        Some(item)
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
