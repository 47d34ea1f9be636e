//! Single funnel for provider auth notifications.

use std::sync::{Arc, Mutex};

use pubtrack_backend::AuthProvider;
use pubtrack_core::Clock;
use pubtrack_events::{AuthChange, AuthTransition, ListenerHandle, Listeners, normalize};

/// Normalizes provider notifications into [`AuthTransition`]s and delivers
/// them, in provider order, to callbacks in registration order.
pub struct AuthEventBus {
    clock: Arc<dyn Clock>,
    listeners: Listeners<AuthTransition>,
    attachment: Mutex<Option<ListenerHandle>>,
}

impl AuthEventBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            listeners: Listeners::new(),
            attachment: Mutex::new(None),
        }
    }

    /// Subscribe to `provider`, replacing any previous attachment.
    ///
    /// The provider only holds a weak reference, so dropping the bus ends
    /// delivery even if the provider outlives it.
    pub fn attach(self: &Arc<Self>, provider: &dyn AuthProvider) {
        let bus = Arc::downgrade(self);
        let handle = provider.on_auth_state_change(Box::new(move |change: &AuthChange| {
            if let Some(bus) = bus.upgrade() {
                bus.dispatch(change);
            }
        }));

        let previous = match self.attachment.lock() {
            Ok(mut slot) => slot.replace(handle),
            Err(_) => {
                tracing::warn!("auth bus attachment lock poisoned; provider listener dropped");
                return;
            }
        };
        drop(previous);
    }

    /// Release the provider subscription.
    pub fn detach(&self) {
        let previous = self.attachment.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = previous {
            handle.unsubscribe();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Normalize one provider notification and deliver the result.
    pub fn dispatch(&self, change: &AuthChange) -> Option<AuthTransition> {
        let transition = normalize(change, self.clock.now());
        match &transition {
            Some(transition) => self.publish(transition.clone()),
            None => tracing::debug!(kind = ?change.kind, "auth change produced no transition"),
        }
        transition
    }

    /// Deliver an already-normalized transition.
    pub fn publish(&self, transition: AuthTransition) {
        tracing::debug!(authenticated = transition.is_authenticated(), "auth transition");
        self.listeners.notify(&transition);
    }

    pub fn on_transition<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&AuthTransition) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }
}

impl core::fmt::Debug for AuthEventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthEventBus")
            .field("attached", &self.is_attached())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
