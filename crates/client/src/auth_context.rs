//! Read-only auth surface for views.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pubtrack_auth::{
    AccessContext, GuardVerdict, Location, Role, RoleState, RouteDescriptor, RouteGuard, SessionState,
};
use pubtrack_core::SubjectId;

use crate::role_resolver::RoleResolver;
use crate::session_store::SessionStore;

/// Session and role as one consistent value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    #[serde(skip)]
    pub session: SessionState,
    #[serde(skip)]
    pub role: RoleState,
    pub is_authenticated: bool,
    pub role_name: Option<String>,
}

impl AuthSnapshot {
    /// Combine a session with the role resolved for `role_subject`.
    ///
    /// The role only counts when it belongs to the session's subject; a role
    /// still held for a previous subject reads as `Unknown`.
    pub fn new(session: SessionState, role_subject: Option<SubjectId>, role: RoleState) -> Self {
        let role = match session.subject() {
            Some(subject) if role_subject == Some(subject) => role,
            _ => RoleState::Unknown,
        };
        Self {
            is_authenticated: session.is_authenticated(),
            role_name: role.role().map(|r| r.as_str().to_string()),
            session,
            role,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    /// Session not settled yet, or signed in with the role still unsettled.
    pub fn is_loading(&self) -> bool {
        self.session.is_unknown() || (self.is_authenticated && !self.role.is_settled())
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.role()
    }

    pub fn subject(&self) -> Option<SubjectId> {
        self.session.subject()
    }

    pub fn email(&self) -> Option<&str> {
        self.session.session().and_then(|s| s.email.as_deref())
    }

    pub fn access(&self) -> AccessContext<'_> {
        AccessContext::from_states(&self.session, &self.role)
    }
}

/// Hands out [`AuthSnapshot`]s built from the live stores.
#[derive(Debug, Clone)]
pub struct AuthContext {
    sessions: Arc<SessionStore>,
    roles: Arc<RoleResolver>,
}

impl AuthContext {
    pub fn new(sessions: Arc<SessionStore>, roles: Arc<RoleResolver>) -> Self {
        Self { sessions, roles }
    }

    pub fn use_auth(&self) -> AuthSnapshot {
        let session = self.sessions.state();
        let (role_subject, role) = self.roles.snapshot();
        AuthSnapshot::new(session, role_subject, role)
    }
}

/// Inline guard for a single view, for content that is not in the route table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtectedRoute {
    pub requires_auth: bool,
    pub required_role: Option<Role>,
}

impl ProtectedRoute {
    pub fn authenticated() -> Self {
        Self {
            requires_auth: true,
            required_role: None,
        }
    }

    pub fn for_role(role: Role) -> Self {
        Self {
            requires_auth: true,
            required_role: Some(role),
        }
    }

    fn descriptor(&self, location: &Location) -> RouteDescriptor {
        let mut descriptor = RouteDescriptor::title("protected", "Protected").at(location.path());
        if self.requires_auth {
            descriptor = descriptor.requires_auth();
        }
        if let Some(role) = &self.required_role {
            descriptor = descriptor.role(role.clone());
        }
        descriptor
    }

    /// Same decision the route guard would make for a route declared with
    /// these requirements at `location`.
    pub fn check(
        &self,
        guard: &RouteGuard,
        auth: &AuthSnapshot,
        location: &Location,
        now: DateTime<Utc>,
    ) -> GuardVerdict {
        let descriptor = self.descriptor(location);
        guard.evaluate_descriptor(Some(&descriptor), &auth.session, &auth.role, location, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubtrack_auth::{AuthorizationDecision, GuardConfig, GuardState, RouteTable, Session};

    fn authenticated() -> SessionState {
        SessionState::Authenticated(Session {
            subject: SubjectId::new(),
            email: Some("hod@uni.edu".to_string()),
            email_verified: true,
            access_token: "t".to_string(),
            expires_at: None,
        })
    }

    /// A signed-in snapshot whose role was resolved for the same subject.
    fn signed_in(role: RoleState) -> AuthSnapshot {
        let session = authenticated();
        let subject = session.subject();
        AuthSnapshot::new(session, subject, role)
    }

    fn guard() -> RouteGuard {
        RouteGuard::new(RouteTable::standard(), GuardConfig::default())
    }

    #[test]
    fn snapshot_hides_role_without_session() {
        let snapshot = AuthSnapshot::new(
            SessionState::Unauthenticated,
            Some(SubjectId::new()),
            RoleState::Resolved(Role::HOD),
        );
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.role(), None);
        assert!(!snapshot.is_loading());
    }

    #[test]
    fn role_of_another_subject_is_not_reported() {
        let previous = SubjectId::new();
        let snapshot = AuthSnapshot::new(authenticated(), Some(previous), RoleState::Resolved(Role::HOD));

        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.role(), None);
        assert_eq!(snapshot.role, RoleState::Unknown);
        assert!(snapshot.is_loading());
        assert_eq!(
            ProtectedRoute::for_role(Role::HOD)
                .check(&guard(), &snapshot, &Location::parse("/hod/dashboard").unwrap(), Utc::now())
                .decision,
            AuthorizationDecision::Pending
        );
    }

    #[test]
    fn snapshot_is_loading_until_role_settles() {
        assert!(AuthSnapshot::new(SessionState::Unknown, None, RoleState::Unknown).is_loading());
        assert!(signed_in(RoleState::Loading).is_loading());
        assert!(signed_in(RoleState::Failed).is_loading());

        let settled = signed_in(RoleState::Resolved(Role::HOD));
        assert!(!settled.is_loading());
        assert_eq!(settled.role(), Some(&Role::HOD));
        assert_eq!(settled.email(), Some("hod@uni.edu"));
    }

    #[test]
    fn protected_route_matches_guard_semantics() {
        let guard = guard();
        let now = Utc::now();
        let location = Location::parse("/reports/annual").unwrap();
        let hod_only = ProtectedRoute::for_role(Role::HOD);

        let anonymous = AuthSnapshot::new(SessionState::Unauthenticated, None, RoleState::Unknown);
        let verdict = hod_only.check(&guard, &anonymous, &location, now);
        assert_eq!(verdict.state, GuardState::DeniedUnauthenticated);

        let pending = signed_in(RoleState::Loading);
        assert_eq!(
            hod_only.check(&guard, &pending, &location, now).decision,
            AuthorizationDecision::Pending
        );

        let faculty = signed_in(RoleState::Resolved(Role::FACULTY));
        assert_eq!(
            hod_only.check(&guard, &faculty, &location, now).state,
            GuardState::DeniedWrongRole
        );

        let hod = signed_in(RoleState::Resolved(Role::HOD));
        assert_eq!(
            hod_only.check(&guard, &hod, &location, now).decision,
            AuthorizationDecision::Allow
        );
    }

    #[test]
    fn open_protected_route_admits_anyone() {
        let verdict = ProtectedRoute::default().check(
            &guard(),
            &AuthSnapshot::new(SessionState::Unauthenticated, None, RoleState::Unknown),
            &Location::parse("/about").unwrap(),
            Utc::now(),
        );
        assert_eq!(verdict.decision, AuthorizationDecision::Allow);
    }
}
