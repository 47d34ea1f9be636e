//! Application controller: wires the backend, the auth stores and the
//! route guard, and keeps the current screen in line with auth state.

use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use thiserror::Error;

use pubtrack_auth::{
    AuthorizationDecision, GuardState, Location, LocationError, NavEntry, RecoveryLinkError, RouteGuard,
    RouteTable, SessionState, View, filter_navigation,
};
use pubtrack_backend::{AuthProvider, DataStore, ObjectStorage, RestBackend};
use pubtrack_core::{Clock, SystemClock};
use pubtrack_events::{AuthTransition, ListenerHandle, Listeners};
use pubtrack_faculty::{FacultyService, ProfileService};
use pubtrack_publications::PublicationService;

use crate::account::{AccountService, FormError};
use crate::auth_bus::AuthEventBus;
use crate::auth_context::{AuthContext, AuthSnapshot};
use crate::config::ClientConfig;
use crate::role_resolver::RoleResolver;
use crate::session_store::SessionStore;

/// Redirect hops followed for one navigation before giving up.
pub const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Location(#[from] LocationError),

    /// The configured sign-in path is not a public-only route.
    #[error("sign-in path {0} is not a public-only route")]
    SignInNotRoutable(String),

    /// The configured landing path is not an authenticated route open to every role.
    #[error("landing path {0} is not an authenticated route open to every role")]
    LandingNotRoutable(String),
}

/// The three backend contracts, possibly served by one object.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub data: Arc<dyn DataStore>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: AuthProvider + DataStore + ObjectStorage + 'static,
    {
        Self {
            auth: backend.clone(),
            data: backend.clone(),
            storage: backend,
        }
    }

    pub fn rest(config: &ClientConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let rest = RestBackend::new(config.backend_url.clone(), config.anon_key.clone())?.with_clock(clock);
        Ok(Self::from_shared(Arc::new(rest)))
    }
}

/// What the view layer should render right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Screen {
    /// Final location after redirects.
    pub location: String,
    /// Location preserved for the post-sign-in return.
    pub from: Option<String>,
    pub state: GuardState,
    pub decision: AuthorizationDecision,
    /// Set only when the decision is `Allow`.
    pub view: Option<View>,
    pub message: Option<&'static str>,
}

impl Screen {
    pub fn is_pending(&self) -> bool {
        self.decision == AuthorizationDecision::Pending
    }
}

struct Current {
    location: Location,
    screen: Option<Screen>,
}

pub struct App {
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    backend: Backend,
    guard: RouteGuard,
    sessions: Arc<SessionStore>,
    roles: Arc<RoleResolver>,
    bus: Arc<AuthEventBus>,
    auth: AuthContext,
    account: AccountService,
    publications: PublicationService,
    profiles: ProfileService,
    faculty: FacultyService,
    current: Mutex<Current>,
    screens: Listeners<Screen>,
    subscriptions: Mutex<Vec<ListenerHandle>>,
}

impl App {
    /// Build and wire an app. Nothing talks to the backend until [`App::start`].
    ///
    /// The guard redirects to the configured sign-in and landing paths, so
    /// both must resolve in the route table: sign-in to a public-only route,
    /// landing to an authenticated route without a role requirement.
    pub fn new(config: ClientConfig, backend: Backend, clock: Arc<dyn Clock>) -> Result<Arc<Self>, AppError> {
        let landing = Location::parse(&config.landing_path)?;
        let sign_in = Location::parse(&config.sign_in_path)?;

        let guard = RouteGuard::new(RouteTable::standard(), config.guard_config());
        match guard.table().find(sign_in.path()) {
            Some(route) if route.public_only => {}
            _ => return Err(AppError::SignInNotRoutable(config.sign_in_path.clone())),
        }
        match guard.table().find(landing.path()) {
            Some(route) if route.requires_auth && !route.public_only && !route.needs_role() => {}
            _ => return Err(AppError::LandingNotRoutable(config.landing_path.clone())),
        }

        let sessions = Arc::new(SessionStore::new(backend.auth.clone(), clock.clone()));
        let roles = Arc::new(RoleResolver::new(backend.data.clone(), config.role_lookup_timeout));
        let bus = Arc::new(AuthEventBus::new(clock.clone()));

        let publications = PublicationService::new(backend.data.clone(), backend.storage.clone(), clock.clone())
            .with_bucket(config.document_bucket.clone());
        let profiles = ProfileService::new(backend.data.clone(), publications.clone(), clock.clone());
        let faculty = FacultyService::new(backend.data.clone(), publications.clone(), clock.clone());
        let account = AccountService::new(backend.auth.clone(), clock.clone(), config.site_url.clone());

        let app = Arc::new(Self {
            auth: AuthContext::new(sessions.clone(), roles.clone()),
            config,
            clock,
            backend,
            guard,
            sessions,
            roles,
            bus,
            account,
            publications,
            profiles,
            faculty,
            current: Mutex::new(Current {
                location: landing,
                screen: None,
            }),
            screens: Listeners::new(),
            subscriptions: Mutex::new(Vec::new()),
        });
        app.wire();
        Ok(app)
    }

    /// Configuration from the environment, tracing, and the REST backend.
    pub fn from_env() -> anyhow::Result<Arc<Self>> {
        let config = ClientConfig::from_env()?;
        pubtrack_observability::init_with(&config.log);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend = Backend::rest(&config, clock.clone())?;
        Ok(Self::new(config, backend, clock)?)
    }

    // Session store first, role resolver second: the role lookup for a new
    // subject always starts after the session reflects that subject.
    fn wire(self: &Arc<Self>) {
        let sessions = self.sessions.clone();
        let apply_session = self.bus.on_transition(move |transition| {
            sessions.apply(transition);
        });
        let roles = self.roles.clone();
        let track_role = self.bus.on_transition(move |transition| roles.on_transition(transition));

        let weak: Weak<Self> = Arc::downgrade(self);
        let on_session = self.sessions.subscribe(move |_| {
            if let Some(app) = weak.upgrade() {
                app.reconcile();
            }
        });
        let weak: Weak<Self> = Arc::downgrade(self);
        let on_role = self.roles.subscribe(move |_| {
            if let Some(app) = weak.upgrade() {
                app.reconcile();
            }
        });

        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.extend([apply_session, track_role, on_session, on_role]);
        }
    }

    /// Attach to the provider, settle the persisted session and render
    /// `initial`.
    pub async fn start(self: &Arc<Self>, initial: &str) -> Result<Screen, LocationError> {
        let location = Location::parse(initial)?;
        self.set_location(location);

        self.bus.attach(self.backend.auth.as_ref());
        let state = self.sessions.initialize().await;
        match state {
            SessionState::Authenticated(session) => self.roles.on_transition(&AuthTransition::Authenticated(session)),
            _ => self.roles.on_transition(&AuthTransition::Unauthenticated),
        }

        tracing::info!(authenticated = self.auth.use_auth().is_authenticated(), "client started");
        Ok(self.reconcile())
    }

    /// Move to `target` (path plus optional query) and render it.
    pub fn navigate(&self, target: &str) -> Result<Screen, LocationError> {
        let location = Location::parse(target)?;
        self.set_location(location);
        self.roles.ensure_current();
        Ok(self.reconcile())
    }

    /// Re-run the guard for the current location, following redirects.
    pub fn reconcile(&self) -> Screen {
        let auth = self.auth.use_auth();
        let now = self.clock.now();
        let mut location = self.location();

        let mut hops = 0;
        let verdict = loop {
            let verdict = self.guard.evaluate(&auth.session, &auth.role, &location, now);
            let AuthorizationDecision::Redirect(redirect) = &verdict.decision else {
                break verdict;
            };
            if hops == MAX_REDIRECTS {
                tracing::warn!(path = location.path(), "redirect limit reached");
                break verdict;
            }
            let next = match Location::parse(&redirect.to) {
                Ok(next) => next,
                Err(err) => {
                    tracing::warn!("invalid redirect target: {err}");
                    break verdict;
                }
            };
            tracing::debug!(from = location.path(), to = next.path(), state = ?verdict.state, "redirect");
            location = match &redirect.from {
                Some(from) => next.with_from(from.clone()),
                None => next,
            };
            hops += 1;
        };

        let view = match verdict.decision {
            AuthorizationDecision::Allow => self.guard.table().find(location.path()).and_then(|r| r.view),
            _ => None,
        };
        let message = match verdict.decision {
            AuthorizationDecision::ExpiredRecoveryLink => Some(RecoveryLinkError::Expired.user_message()),
            _ => None,
        };
        let screen = Screen {
            location: location.href(),
            from: location.from().map(str::to_string),
            state: verdict.state,
            decision: verdict.decision,
            view,
            message,
        };

        if let Ok(mut current) = self.current.lock() {
            current.location = location;
            current.screen = Some(screen.clone());
        }
        self.screens.notify(&screen);
        screen
    }

    /// Called with every screen [`App::reconcile`] renders, including the
    /// ones triggered by background session and role changes.
    #[must_use = "dropping the handle unsubscribes immediately"]
    pub fn on_screen<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&Screen) + Send + Sync + 'static,
    {
        self.screens.subscribe(callback)
    }

    pub fn location(&self) -> Location {
        match self.current.lock() {
            Ok(current) => current.location.clone(),
            Err(poisoned) => poisoned.into_inner().location.clone(),
        }
    }

    /// Last rendered screen, if any.
    pub fn screen(&self) -> Option<Screen> {
        self.current.lock().ok().and_then(|c| c.screen.clone())
    }

    /// Menu entries visible to the current visitor.
    pub fn navigation(&self) -> Vec<NavEntry> {
        let auth = self.auth.use_auth();
        filter_navigation(self.guard.table().entries(), auth.access())
    }

    pub fn use_auth(&self) -> AuthSnapshot {
        self.auth.use_auth()
    }

    pub fn auth_context(&self) -> &AuthContext {
        &self.auth
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn account(&self) -> &AccountService {
        &self.account
    }

    pub fn publications(&self) -> &PublicationService {
        &self.publications
    }

    pub fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    pub fn faculty(&self) -> &FacultyService {
        &self.faculty
    }

    /// Sign in and render wherever the guard sends the user next.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Screen, FormError> {
        self.account.sign_in(email, password).await?;
        Ok(self.reconcile())
    }

    pub async fn sign_out(&self) -> Result<Screen, FormError> {
        self.account.sign_out().await?;
        Ok(self.reconcile())
    }

    /// Change the password. From a recovery link this ends the session and
    /// lands on sign-in; otherwise the user returns to the landing page.
    pub async fn update_password(&self, password: &str) -> Result<Screen, FormError> {
        let from_recovery = self
            .screen()
            .is_some_and(|screen| screen.state == GuardState::RecoveryBypass);
        self.account.update_password(password, from_recovery).await?;

        let target = if from_recovery {
            self.config.sign_in_path.clone()
        } else {
            self.config.landing_path.clone()
        };
        self.navigate(&target)
            .map_err(|err| FormError::new(err.to_string()))
    }

    /// Detach from the provider and drop every listener.
    pub fn shutdown(&self) {
        self.bus.detach();
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.clear();
        }
        self.screens.clear();
        self.sessions.dispose();
        self.roles.dispose();
        tracing::info!("client shut down");
    }

    fn set_location(&self, location: Location) {
        if let Ok(mut current) = self.current.lock() {
            current.location = location;
        }
    }
}

impl core::fmt::Debug for App {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("App")
            .field("location", &self.location().href())
            .field("sessions", &self.sessions)
            .field("roles", &self.roles)
            .field("bus", &self.bus)
            .finish()
    }
}
