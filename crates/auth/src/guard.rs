//! Route guard: the per-navigation access decision.
//!
//! The guard is a pure function of {session, role, route table, location,
//! now}. It holds no memoized state, so it must be re-run on every session
//! transition, role resolution and location change.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::access::{AccessContext, is_route_accessible};
use crate::location::Location;
use crate::recovery::{default_recovery_window, is_recovery_request, validate_recovery_link};
use crate::roles::RoleState;
use crate::route::{RouteDescriptor, RouteTable};
use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub sign_in_path: String,
    /// Default authenticated landing page.
    pub landing_path: String,
    pub recovery_window: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sign_in_path: "/login".to_string(),
            landing_path: "/dashboard".to_string(),
            recovery_window: default_recovery_window(),
        }
    }
}

/// Which rule decided a navigation.
///
/// Variants are listed in tie-break order: when several conditions hold,
/// the earliest wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    /// A valid recovery link opened the recovery route.
    RecoveryBypass,
    /// A recovery link outside its window.
    RecoveryExpired,
    /// Session or (when needed) role not resolved yet.
    Unknown,
    DeniedUnauthenticated,
    DeniedAlreadyAuthenticated,
    DeniedWrongRole,
    /// Authenticated visitor on a path with no descriptor.
    NoSuchRoute,
    Allowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: String,
    /// Location to return to after the redirect target is satisfied.
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AuthorizationDecision {
    Allow,
    /// Render a loading affordance; issue no redirect.
    Pending,
    Redirect(Redirect),
    /// Render the expired-link message; issue no redirect.
    ExpiredRecoveryLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardVerdict {
    pub state: GuardState,
    pub decision: AuthorizationDecision,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    table: RouteTable,
    config: GuardConfig,
}

impl RouteGuard {
    pub fn new(table: RouteTable, config: GuardConfig) -> Self {
        Self { table, config }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Decide access to `location` using the route table.
    pub fn evaluate(
        &self,
        session: &SessionState,
        role: &RoleState,
        location: &Location,
        now: DateTime<Utc>,
    ) -> GuardVerdict {
        let route = self.table.find(location.path());
        self.evaluate_descriptor(route, session, role, location, now)
    }

    /// Decide access for an explicit descriptor (`None` = unknown route).
    pub fn evaluate_descriptor(
        &self,
        route: Option<&RouteDescriptor>,
        session: &SessionState,
        role: &RoleState,
        location: &Location,
        now: DateTime<Utc>,
    ) -> GuardVerdict {
        let state = self.classify(route, session, role, location, now);
        let decision = self.decide(state, route, location);
        GuardVerdict { state, decision }
    }

    fn classify(
        &self,
        route: Option<&RouteDescriptor>,
        session: &SessionState,
        role: &RoleState,
        location: &Location,
        now: DateTime<Utc>,
    ) -> GuardState {
        if let Some(route) = route {
            if route.recovery_flow && is_recovery_request(location) {
                return match validate_recovery_link(location, self.config.recovery_window, now) {
                    Ok(_) => GuardState::RecoveryBypass,
                    Err(_) => GuardState::RecoveryExpired,
                };
            }
        }

        match session {
            SessionState::Unknown => GuardState::Unknown,
            SessionState::Unauthenticated => {
                // Unknown routes behave as `requires_auth = true`; a role
                // requirement implies an identity.
                let needs_identity = route.is_none_or(|r| r.requires_auth || r.needs_role());
                if needs_identity {
                    GuardState::DeniedUnauthenticated
                } else {
                    GuardState::Allowed
                }
            }
            SessionState::Authenticated(_) => {
                let Some(route) = route else {
                    return GuardState::NoSuchRoute;
                };
                if route.needs_role() && !role.is_settled() {
                    return GuardState::Unknown;
                }
                if route.public_only {
                    return GuardState::DeniedAlreadyAuthenticated;
                }
                if !is_route_accessible(route, AccessContext::authenticated(role.role())) {
                    return GuardState::DeniedWrongRole;
                }
                GuardState::Allowed
            }
        }
    }

    fn decide(
        &self,
        state: GuardState,
        route: Option<&RouteDescriptor>,
        location: &Location,
    ) -> AuthorizationDecision {
        match state {
            GuardState::RecoveryBypass => AuthorizationDecision::Allow,
            GuardState::RecoveryExpired => AuthorizationDecision::ExpiredRecoveryLink,
            GuardState::Unknown => AuthorizationDecision::Pending,
            GuardState::DeniedUnauthenticated => AuthorizationDecision::Redirect(Redirect {
                to: self.config.sign_in_path.clone(),
                from: Some(location.href()),
            }),
            GuardState::DeniedAlreadyAuthenticated => {
                let to = location
                    .from()
                    .filter(|from| self.is_return_target(from))
                    .map(str::to_string)
                    .unwrap_or_else(|| self.config.landing_path.clone());
                AuthorizationDecision::Redirect(Redirect { to, from: None })
            }
            GuardState::DeniedWrongRole | GuardState::NoSuchRoute => {
                AuthorizationDecision::Redirect(Redirect {
                    to: self.config.landing_path.clone(),
                    from: None,
                })
            }
            GuardState::Allowed => match route.and_then(|r| r.redirect.as_ref()) {
                Some(target) => AuthorizationDecision::Redirect(Redirect {
                    to: target.clone(),
                    from: None,
                }),
                None => AuthorizationDecision::Allow,
            },
        }
    }

    /// A preserved location is only worth returning to if it is not itself
    /// a public-only page (which would bounce straight back).
    fn is_return_target(&self, from: &str) -> bool {
        let Ok(loc) = Location::parse(from) else {
            return false;
        };
        if loc.path() == self.config.sign_in_path {
            return false;
        }
        !self.table.find(loc.path()).is_some_and(|r| r.public_only)
    }
}
