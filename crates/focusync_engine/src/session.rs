//! Session provider abstraction.

use focusync_model::SessionState;
use tokio::sync::watch;

/// Publishes the host's authentication state.
pub trait SessionProvider: Send + Sync {
    /// Returns a receiver holding the current state and notified on changes.
    fn subscribe(&self) -> watch::Receiver<SessionState>;
}

/// A watch-backed [`SessionProvider`] the host drives directly.
#[derive(Debug)]
pub struct SessionHub {
    tx: watch::Sender<SessionState>,
}

impl SessionHub {
    /// Creates a hub in the signed-out state.
    pub fn new() -> Self {
        Self::with_state(SessionState::SignedOut)
    }

    /// Creates a hub with an initial state.
    pub fn with_state(state: SessionState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx }
    }

    /// Publishes a new state.
    pub fn set(&self, state: SessionState) {
        self.tx.send_replace(state);
    }

    /// Publishes an authenticated state.
    pub fn sign_in(&self, owner: impl Into<String>, credential: impl Into<String>) {
        self.set(SessionState::authenticated(owner, credential));
    }

    /// Publishes the signed-out state.
    pub fn sign_out(&self) {
        self.set(SessionState::SignedOut);
    }

    /// Switches to guest mode.
    pub fn guest(&self, reason: impl Into<String>) {
        self.set(SessionState::guest(reason));
    }

    /// Returns the current state.
    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for SessionHub {
    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}
