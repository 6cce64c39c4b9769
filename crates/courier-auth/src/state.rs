use parking_lot::{Mutex, MutexGuard};

/// Where a session stands in the challenge-response handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Idle,
    ChallengeIssued {
        auth_key: String,
        challenge: String,
    },
    Authenticated {
        auth_key: String,
        signature: String,
    },
}

/// Per-session handshake state. Transitions are serialized by the inner lock.
#[derive(Debug, Default)]
pub struct SessionAuth {
    state: Mutex<AuthState>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.lock(), AuthState::Authenticated { .. })
    }

    /// Key the session authenticated with, once the handshake completed.
    pub fn auth_key(&self) -> Option<String> {
        match &*self.state.lock() {
            AuthState::Authenticated { auth_key, .. } => Some(auth_key.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.lock().clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock()
    }
}
