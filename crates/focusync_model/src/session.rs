//! Authentication states observed by the sync engine.

use crate::ids::{Credential, OwnerId};

/// The current authentication state, as published by the host's session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Nobody is signed in.
    SignedOut,
    /// The app is used without an account. Data stays on-device.
    Guest {
        /// Why the app is in guest mode (for logging only).
        reason: String,
    },
    /// A user is signed in.
    Authenticated {
        /// The signed-in account.
        owner: OwnerId,
        /// Credential used for remote calls.
        credential: Credential,
    },
}

impl SessionState {
    /// Creates an authenticated state.
    pub fn authenticated(owner: impl Into<String>, credential: impl Into<String>) -> Self {
        SessionState::Authenticated {
            owner: OwnerId::new(owner),
            credential: Credential::new(credential),
        }
    }

    /// Creates a guest state.
    pub fn guest(reason: impl Into<String>) -> Self {
        SessionState::Guest {
            reason: reason.into(),
        }
    }

    /// Returns the owner if authenticated.
    pub fn owner(&self) -> Option<&OwnerId> {
        match self {
            SessionState::Authenticated { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::SignedOut => "signed_out",
            SessionState::Guest { .. } => "guest",
            SessionState::Authenticated { .. } => "authenticated",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::SignedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_only_when_authenticated() {
        assert_eq!(SessionState::SignedOut.owner(), None);
        assert_eq!(SessionState::guest("offline").owner(), None);
        let state = SessionState::authenticated("alice", "token");
        assert_eq!(state.owner(), Some(&OwnerId::new("alice")));
        assert_eq!(state.label(), "authenticated");
    }
}
