//! Role resolution for the signed-in subject.
//!
//! One lookup per subject is in flight at a time; concurrent callers share
//! it. Every subject change bumps an epoch, and a lookup only lands if the
//! epoch and subject it started under are still current.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use thiserror::Error;

use pubtrack_auth::{Role, RoleState};
use pubtrack_backend::{BackendError, DataStore, Query};
use pubtrack_core::SubjectId;
use pubtrack_events::{AuthTransition, ListenerHandle, Listeners};
use pubtrack_faculty::PROFILES_TABLE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleLookupError {
    #[error("role lookup failed: {0}")]
    Backend(String),

    #[error("role lookup timed out")]
    Timeout,
}

pub type RoleLookup = Result<Option<Role>, RoleLookupError>;

type SharedLookup = Shared<BoxFuture<'static, RoleLookup>>;

struct InFlight {
    subject: SubjectId,
    epoch: u64,
    lookup: SharedLookup,
}

#[derive(Default)]
struct Inner {
    current: Option<SubjectId>,
    epoch: u64,
    state: RoleState,
    cache: Option<(SubjectId, Option<Role>)>,
    in_flight: Option<InFlight>,
}

pub struct RoleResolver {
    store: Arc<dyn DataStore>,
    timeout: Duration,
    inner: Mutex<Inner>,
    listeners: Listeners<RoleState>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn DataStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            inner: Mutex::new(Inner::default()),
            listeners: Listeners::new(),
        }
    }

    pub fn state(&self) -> RoleState {
        self.inner.lock().map(|i| i.state.clone()).unwrap_or_default()
    }

    /// The subject the state belongs to, read together with the state.
    pub fn snapshot(&self) -> (Option<SubjectId>, RoleState) {
        self.inner
            .lock()
            .map(|i| (i.current, i.state.clone()))
            .unwrap_or_default()
    }

    pub fn current_subject(&self) -> Option<SubjectId> {
        self.inner.lock().ok().and_then(|i| i.current)
    }

    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&RoleState) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Fetch the role stored for `subject`.
    ///
    /// Answers from the cache when it holds `subject`, otherwise joins the
    /// in-flight lookup for `subject` or starts one. The published state
    /// only changes when `subject` is still the current subject.
    pub async fn resolve_role(&self, subject: SubjectId) -> RoleLookup {
        let (lookup, epoch) = {
            let Ok(mut inner) = self.inner.lock() else {
                return Err(RoleLookupError::Backend("role resolver lock poisoned".to_string()));
            };
            if let Some((cached, role)) = &inner.cache {
                if *cached == subject {
                    return Ok(role.clone());
                }
            }
            match &inner.in_flight {
                Some(flight) if flight.subject == subject => (flight.lookup.clone(), flight.epoch),
                _ => {
                    let lookup = self.start_lookup(subject);
                    let epoch = inner.epoch;
                    inner.in_flight = Some(InFlight {
                        subject,
                        epoch,
                        lookup: lookup.clone(),
                    });
                    (lookup, epoch)
                }
            }
        };

        let result = lookup.await;
        self.complete(subject, epoch, &result);
        result
    }

    /// React to a normalized auth transition.
    ///
    /// Sign-out clears everything. A new subject invalidates whatever was
    /// resolved or in flight for the previous one and starts a lookup on the
    /// current tokio runtime.
    pub fn on_transition(self: &Arc<Self>, transition: &AuthTransition) {
        match transition {
            AuthTransition::Unauthenticated => {
                let changed = {
                    let Ok(mut inner) = self.inner.lock() else {
                        return;
                    };
                    inner.epoch += 1;
                    inner.current = None;
                    inner.in_flight = None;
                    inner.cache = None;
                    replace_state(&mut inner, RoleState::Unknown)
                };
                self.publish(changed);
            }
            AuthTransition::Authenticated(session) => {
                let subject = session.subject;
                {
                    let Ok(mut inner) = self.inner.lock() else {
                        return;
                    };
                    if inner.current == Some(subject) {
                        if !matches!(inner.state, RoleState::Unknown | RoleState::Failed) {
                            return;
                        }
                    } else {
                        inner.epoch += 1;
                        inner.current = Some(subject);
                        inner.in_flight = None;
                        if inner.cache.as_ref().is_some_and(|(cached, _)| *cached != subject) {
                            inner.cache = None;
                        }
                    }
                }
                self.refresh();
            }
        }
    }

    /// Retry resolution when the current subject has no answer yet and
    /// nothing is in flight.
    pub fn ensure_current(self: &Arc<Self>) {
        let idle = self
            .inner
            .lock()
            .map(|i| i.current.is_some() && matches!(i.state, RoleState::Unknown | RoleState::Failed))
            .unwrap_or(false);
        if idle {
            self.refresh();
        }
    }

    pub fn dispose(&self) {
        self.listeners.clear();
        if let Ok(mut inner) = self.inner.lock() {
            let epoch = inner.epoch + 1;
            *inner = Inner {
                epoch,
                ..Inner::default()
            };
        }
    }

    fn refresh(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime available; role lookup not started");
            return;
        };

        let (subject, changed, fetch) = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            let Some(subject) = inner.current else {
                return;
            };
            let cached = inner
                .cache
                .as_ref()
                .filter(|(cached, _)| *cached == subject)
                .map(|(_, role)| role.clone());
            match cached {
                Some(role) => (subject, replace_state(&mut inner, settled(role)), false),
                None => (subject, replace_state(&mut inner, RoleState::Loading), true),
            }
        };
        self.publish(changed);

        if fetch {
            let resolver = Arc::clone(self);
            handle.spawn(async move {
                // Outcome is published through `complete`.
                let _ = resolver.resolve_role(subject).await;
            });
        }
    }

    fn start_lookup(&self, subject: SubjectId) -> SharedLookup {
        let store = Arc::clone(&self.store);
        let timeout = self.timeout;
        async move {
            let query = Query::new().eq("id", subject.to_string());
            match tokio::time::timeout(timeout, store.fetch_row(PROFILES_TABLE, &query)).await {
                Err(_) => Err(RoleLookupError::Timeout),
                Ok(Ok(row)) => Ok(row.get("role").and_then(Value::as_str).and_then(Role::from_column)),
                Ok(Err(BackendError::NotFound)) => Ok(None),
                Ok(Err(err)) => Err(RoleLookupError::Backend(err.to_string())),
            }
        }
        .boxed()
        .shared()
    }

    fn complete(&self, subject: SubjectId, epoch: u64, result: &RoleLookup) {
        let changed = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if inner
                .in_flight
                .as_ref()
                .is_some_and(|f| f.subject == subject && f.epoch == epoch)
            {
                inner.in_flight = None;
            }
            if inner.epoch != epoch || inner.current != Some(subject) {
                tracing::debug!(%subject, "discarding stale role lookup");
                return;
            }
            match result {
                Ok(role) => {
                    inner.cache = Some((subject, role.clone()));
                    replace_state(&mut inner, settled(role.clone()))
                }
                Err(err) => {
                    tracing::warn!("role resolution failed: {err}");
                    replace_state(&mut inner, RoleState::Failed)
                }
            }
        };
        self.publish(changed);
    }

    fn publish(&self, changed: Option<RoleState>) {
        if let Some(state) = changed {
            self.listeners.notify(&state);
        }
    }
}

fn settled(role: Option<Role>) -> RoleState {
    match role {
        Some(role) => RoleState::Resolved(role),
        None => RoleState::Absent,
    }
}

fn replace_state(inner: &mut Inner, next: RoleState) -> Option<RoleState> {
    if inner.state == next {
        return None;
    }
    inner.state = next.clone();
    Some(next)
}

impl core::fmt::Debug for RoleResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RoleResolver")
            .field("state", &self.state())
            .field("subject", &self.current_subject())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubtrack_auth::Session;
    use pubtrack_backend::{InMemoryBackend, Row};
    use serde_json::json;

    fn profile(subject: SubjectId, role: &str) -> Row {
        json!({ "id": subject.to_string(), "role": role })
            .as_object()
            .unwrap()
            .clone()
    }

    fn signed_in(subject: SubjectId) -> AuthTransition {
        AuthTransition::Authenticated(Session {
            subject,
            email: None,
            email_verified: true,
            access_token: "t".to_string(),
            expires_at: None,
        })
    }

    fn resolver(backend: &Arc<InMemoryBackend>) -> Arc<RoleResolver> {
        Arc::new(RoleResolver::new(backend.clone(), Duration::from_secs(5)))
    }

    async fn wait_for(resolver: &RoleResolver, expected: RoleState) {
        for _ in 0..200 {
            if resolver.state() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("role state stuck at {:?}, expected {expected:?}", resolver.state());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_lookup() {
        let backend = Arc::new(InMemoryBackend::new());
        let subject = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(subject, "hod")]);
        backend.set_fetch_delay(Some(Duration::from_millis(30)));
        let resolver = resolver(&backend);

        let (a, b, c) = tokio::join!(
            resolver.resolve_role(subject),
            resolver.resolve_role(subject),
            resolver.resolve_role(subject),
        );

        assert_eq!(a, Ok(Some(Role::HOD)));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(backend.fetch_count(), 1);
    }

    #[tokio::test]
    async fn cached_answer_skips_the_store() {
        let backend = Arc::new(InMemoryBackend::new());
        let subject = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(subject, "faculty")]);
        let resolver = resolver(&backend);

        resolver.on_transition(&signed_in(subject));
        wait_for(&resolver, RoleState::Resolved(Role::FACULTY)).await;
        assert_eq!(resolver.resolve_role(subject).await, Ok(Some(Role::FACULTY)));
        assert_eq!(backend.fetch_count(), 1);
    }

    #[tokio::test]
    async fn later_subject_wins_over_slow_earlier_lookup() {
        let backend = Arc::new(InMemoryBackend::new());
        let first = SubjectId::new();
        let second = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(first, "hod"), profile(second, "faculty")]);
        backend.set_fetch_delay(Some(Duration::from_millis(40)));
        let resolver = resolver(&backend);

        resolver.on_transition(&signed_in(first));
        resolver.on_transition(&signed_in(second));
        assert_eq!(resolver.state(), RoleState::Loading);

        wait_for(&resolver, RoleState::Resolved(Role::FACULTY)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(resolver.state(), RoleState::Resolved(Role::FACULTY));
        assert_eq!(resolver.current_subject(), Some(second));
    }

    #[tokio::test]
    async fn sign_out_discards_in_flight_lookup() {
        let backend = Arc::new(InMemoryBackend::new());
        let subject = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(subject, "hod")]);
        backend.set_fetch_delay(Some(Duration::from_millis(30)));
        let resolver = resolver(&backend);

        resolver.on_transition(&signed_in(subject));
        resolver.on_transition(&AuthTransition::Unauthenticated);
        assert_eq!(resolver.state(), RoleState::Unknown);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(resolver.state(), RoleState::Unknown);
        assert_eq!(resolver.current_subject(), None);
    }

    #[tokio::test]
    async fn sign_out_clears_a_resolved_role() {
        let backend = Arc::new(InMemoryBackend::new());
        let subject = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(subject, "faculty-coordinator")]);
        let resolver = resolver(&backend);

        resolver.on_transition(&signed_in(subject));
        wait_for(&resolver, RoleState::Resolved(Role::FACULTY_COORDINATOR)).await;

        resolver.on_transition(&AuthTransition::Unauthenticated);
        assert_eq!(resolver.state(), RoleState::Unknown);
    }

    #[tokio::test]
    async fn missing_profile_or_blank_role_is_absent() {
        let backend = Arc::new(InMemoryBackend::new());
        let blank = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(blank, "  ")]);
        let resolver = resolver(&backend);

        assert_eq!(resolver.resolve_role(blank).await, Ok(None));
        assert_eq!(resolver.resolve_role(SubjectId::new()).await, Ok(None));

        resolver.on_transition(&signed_in(SubjectId::new()));
        wait_for(&resolver, RoleState::Absent).await;
    }

    #[tokio::test]
    async fn failure_is_retried_on_demand() {
        let backend = Arc::new(InMemoryBackend::new());
        let subject = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(subject, "hod")]);
        backend.fail_next_fetch(BackendError::Network("connection reset".into()));
        let resolver = resolver(&backend);

        resolver.on_transition(&signed_in(subject));
        wait_for(&resolver, RoleState::Failed).await;

        resolver.ensure_current();
        wait_for(&resolver, RoleState::Resolved(Role::HOD)).await;
        assert_eq!(backend.fetch_count(), 2);
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let backend = Arc::new(InMemoryBackend::new());
        let subject = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(subject, "hod")]);
        backend.set_fetch_delay(Some(Duration::from_millis(200)));
        let resolver = Arc::new(RoleResolver::new(backend.clone(), Duration::from_millis(20)));

        resolver.on_transition(&signed_in(subject));
        assert_eq!(resolver.resolve_role(subject).await, Err(RoleLookupError::Timeout));
        assert_eq!(resolver.state(), RoleState::Failed);
    }

    #[tokio::test]
    async fn token_refresh_for_same_subject_does_not_refetch() {
        let backend = Arc::new(InMemoryBackend::new());
        let subject = SubjectId::new();
        backend.seed_rows(PROFILES_TABLE, [profile(subject, "faculty")]);
        let resolver = resolver(&backend);

        resolver.on_transition(&signed_in(subject));
        wait_for(&resolver, RoleState::Resolved(Role::FACULTY)).await;
        resolver.on_transition(&signed_in(subject));
        assert_eq!(resolver.state(), RoleState::Resolved(Role::FACULTY));
        assert_eq!(backend.fetch_count(), 1);
    }
}
