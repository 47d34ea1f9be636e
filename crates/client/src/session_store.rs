//! Authoritative session state for the client.

use std::sync::{Arc, Mutex};

use pubtrack_auth::{SessionState, validate_session};
use pubtrack_backend::AuthProvider;
use pubtrack_core::Clock;
use pubtrack_events::{AuthTransition, ListenerHandle, Listeners};

/// Holds the current [`SessionState`] and tells subscribers when it changes.
///
/// The state starts `Unknown`, is bootstrapped once by [`initialize`], and
/// afterwards only moves through [`apply`], which the auth event bus calls.
///
/// [`initialize`]: SessionStore::initialize
/// [`apply`]: SessionStore::apply
pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    listeners: Listeners<SessionState>,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn AuthProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            state: Mutex::new(SessionState::Unknown),
            listeners: Listeners::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Ask the provider for a persisted session and settle the state.
    ///
    /// Any failure settles to `Unauthenticated`. A transition applied while
    /// the lookup was in flight wins over the bootstrap result.
    pub async fn initialize(&self) -> SessionState {
        let resolved = match self.provider.get_current_session().await {
            Ok(Some(session)) => match validate_session(&session, self.clock.now()) {
                Ok(()) => SessionState::Authenticated(session),
                Err(err) => {
                    tracing::info!("persisted session rejected: {err}");
                    SessionState::Unauthenticated
                }
            },
            Ok(None) => SessionState::Unauthenticated,
            Err(err) => {
                tracing::warn!("session lookup failed: {err}");
                SessionState::Unauthenticated
            }
        };

        let changed = {
            let Ok(mut state) = self.state.lock() else {
                return SessionState::Unauthenticated;
            };
            if state.is_unknown() {
                *state = resolved;
                Some(state.clone())
            } else {
                None
            }
        };

        match changed {
            Some(state) => {
                self.listeners.notify(&state);
                state
            }
            None => self.state(),
        }
    }

    /// Apply a normalized transition. Returns whether the state changed.
    pub fn apply(&self, transition: &AuthTransition) -> bool {
        let next = match transition {
            AuthTransition::Authenticated(session) => SessionState::Authenticated(session.clone()),
            AuthTransition::Unauthenticated => SessionState::Unauthenticated,
        };

        {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };
            if *state == next {
                return false;
            }
            *state = next.clone();
        }

        tracing::debug!(authenticated = next.is_authenticated(), "session state changed");
        self.listeners.notify(&next);
        true
    }

    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Drop all subscribers and forget the session.
    pub fn dispose(&self) {
        self.listeners.clear();
        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Unknown;
        }
    }
}

impl core::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
