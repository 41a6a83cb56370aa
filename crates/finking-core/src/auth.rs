//! Auth readiness handshake.
//!
//! The identity provider reports the signed-in user exactly once at startup;
//! the client awaits that report at a single point before opening any
//! subscriptions. Built on `tokio::sync::oneshot`, so resolving twice is a
//! type error rather than a runtime flag check.

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::types::UserId;

/// The identity provider went away without reporting a user.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("identity provider dropped before auth state was known")]
pub struct AuthAbandoned;

/// Create the two halves of the handshake.
pub fn handshake() -> (AuthResolver, AuthReady) {
    let (tx, rx) = oneshot::channel();
    (AuthResolver { tx }, AuthReady { rx })
}

/// Held by the identity provider.
pub struct AuthResolver {
    tx: oneshot::Sender<Option<UserId>>,
}

impl AuthResolver {
    /// Report the initial auth state. `None` means signed out.
    pub fn resolve(self, user: Option<UserId>) {
        debug!(signed_in = user.is_some(), "auth state resolved");
        // The waiting side may already be gone; nothing to do then.
        let _ = self.tx.send(user);
    }
}

/// Held by the single startup point that waits for auth.
pub struct AuthReady {
    rx: oneshot::Receiver<Option<UserId>>,
}

impl AuthReady {
    /// Wait until the identity provider has reported.
    pub async fn wait(self) -> Result<Option<UserId>, AuthAbandoned> {
        self.rx.await.map_err(|_| AuthAbandoned)
    }
}
