//! Session trait: the read-only view of the authentication collaborator.
//!
//! Token acquisition and refresh are owned by the surrounding application;
//! the connectivity core only observes whether a token and user identity
//! exist right now. It never mutates session state.

use std::sync::RwLock;

use crate::types::UserId;

/// Read-only session information supplied by the auth collaborator.
pub trait Session: Send + Sync {
    /// The current bearer token, if a session is active.
    fn bearer_token(&self) -> Option<String>;

    /// The current user identity, if known.
    fn user_id(&self) -> Option<UserId>;
}

/// A shared, lock-backed [`Session`] implementation.
///
/// The auth layer writes into it; the connectivity core reads from it
/// through the `Session` trait.
#[derive(Debug, Default)]
pub struct SharedSession {
    inner: RwLock<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<UserId>,
}

impl SharedSession {
    /// Create an empty session holder (no active session).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session holder that already carries an active session.
    pub fn with_session(token: impl Into<String>, user: UserId) -> Self {
        let session = Self::new();
        session.set_session(token, user);
        session
    }

    /// Record a fresh token and user identity.
    pub fn set_session(&self, token: impl Into<String>, user: UserId) {
        let mut state = self.inner.write().expect("session lock poisoned");
        state.token = Some(token.into());
        state.user = Some(user);
    }

    /// Clear the session (logout or token expiry).
    pub fn clear(&self) {
        let mut state = self.inner.write().expect("session lock poisoned");
        state.token = None;
        state.user = None;
    }
}

impl Session for SharedSession {
    fn bearer_token(&self) -> Option<String> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .token
            .clone()
    }

    fn user_id(&self) -> Option<UserId> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .user
            .clone()
    }
}
