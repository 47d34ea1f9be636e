//! Provider auth notifications and their normalized form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pubtrack_auth::Session;
use pubtrack_core::SubjectId;

/// What the identity provider reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// Raw provider notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChange {
    pub kind: AuthChangeKind,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(kind: AuthChangeKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthChangeKind::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthChangeKind::SignedOut, None)
    }
}

/// The only two things the rest of the client cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthTransition {
    Authenticated(Session),
    Unauthenticated,
}

impl AuthTransition {
    pub fn subject(&self) -> Option<SubjectId> {
        match self {
            AuthTransition::Authenticated(session) => Some(session.subject),
            AuthTransition::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthTransition::Authenticated(_))
    }
}

/// Map a provider notification to a transition, if it implies one.
///
/// Token refreshes without a session and password-recovery notices never
/// change authentication state.
pub fn normalize(change: &AuthChange, now: DateTime<Utc>) -> Option<AuthTransition> {
    let valid = change.session.as_ref().filter(|s| s.is_valid(now)).cloned();

    match change.kind {
        AuthChangeKind::SignedOut => Some(AuthTransition::Unauthenticated),
        AuthChangeKind::InitialSession | AuthChangeKind::SignedIn | AuthChangeKind::UserUpdated => {
            Some(valid.map_or(AuthTransition::Unauthenticated, AuthTransition::Authenticated))
        }
        AuthChangeKind::TokenRefreshed => match (&change.session, valid) {
            (_, Some(session)) => Some(AuthTransition::Authenticated(session)),
            (None, None) => None,
            (Some(_), None) => Some(AuthTransition::Unauthenticated),
        },
        AuthChangeKind::PasswordRecovery => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(verified: bool) -> Session {
        Session {
            subject: SubjectId::new(),
            email: Some("f@example.edu".to_string()),
            email_verified: verified,
            access_token: "t".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        }
    }

    #[test]
    fn sign_out_is_unauthenticated() {
        assert_eq!(
            normalize(&AuthChange::signed_out(), Utc::now()),
            Some(AuthTransition::Unauthenticated)
        );
    }

    #[test]
    fn sign_in_with_valid_session_authenticates() {
        let s = session(true);
        let t = normalize(&AuthChange::signed_in(s.clone()), Utc::now());
        assert_eq!(t, Some(AuthTransition::Authenticated(s)));
    }

    #[test]
    fn unverified_sign_in_is_unauthenticated() {
        let t = normalize(&AuthChange::signed_in(session(false)), Utc::now());
        assert_eq!(t, Some(AuthTransition::Unauthenticated));
    }

    #[test]
    fn initial_session_without_session_is_unauthenticated() {
        let change = AuthChange::new(AuthChangeKind::InitialSession, None);
        assert_eq!(normalize(&change, Utc::now()), Some(AuthTransition::Unauthenticated));
    }

    #[test]
    fn refresh_without_session_is_ignored() {
        let change = AuthChange::new(AuthChangeKind::TokenRefreshed, None);
        assert_eq!(normalize(&change, Utc::now()), None);
    }

    #[test]
    fn refresh_with_session_re_authenticates() {
        let s = session(true);
        let change = AuthChange::new(AuthChangeKind::TokenRefreshed, Some(s.clone()));
        assert_eq!(normalize(&change, Utc::now()), Some(AuthTransition::Authenticated(s)));
    }

    #[test]
    fn password_recovery_is_ignored() {
        let change = AuthChange::new(AuthChangeKind::PasswordRecovery, Some(session(true)));
        assert_eq!(normalize(&change, Utc::now()), None);
    }

    #[test]
    fn expired_session_on_user_update_is_unauthenticated() {
        let s = session(true);
        let later = s.expires_at.unwrap() + Duration::seconds(1);
        let change = AuthChange::new(AuthChangeKind::UserUpdated, Some(s));
        assert_eq!(normalize(&change, later), Some(AuthTransition::Unauthenticated));
    }

    #[test]
    fn kind_uses_provider_wire_names() {
        let json = serde_json::to_string(&AuthChangeKind::TokenRefreshed).unwrap();
        assert_eq!(json, "\"TOKEN_REFRESHED\"");
    }
}
