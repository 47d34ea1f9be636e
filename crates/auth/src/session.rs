use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pubtrack_core::SubjectId;

/// A live, provider-issued proof of identity.
///
/// This is the minimal set of fields the client needs once the provider has
/// issued (or restored) a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Subject / user identifier.
    pub subject: SubjectId,

    pub email: Option<String>,

    /// Whether the provider has confirmed the user's email address.
    pub email_verified: bool,

    /// Bearer token for backend calls.
    pub access_token: String,

    /// Expiration timestamp, when the provider reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        validate_session(self, now).is_ok()
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("subject", &self.subject)
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    #[error("email address has not been verified")]
    EmailNotVerified,

    #[error("session has expired")]
    Expired,
}

/// Decide whether a session may be treated as authenticated.
///
/// An unverified identity is never authenticated, even with a live token.
pub fn validate_session(session: &Session, now: DateTime<Utc>) -> Result<(), SessionValidationError> {
    if !session.email_verified {
        return Err(SessionValidationError::EmailNotVerified);
    }
    if let Some(expires_at) = session.expires_at {
        if now >= expires_at {
            return Err(SessionValidationError::Expired);
        }
    }
    Ok(())
}

/// Authentication state as seen by the guard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Bootstrap has not finished. Never collapsed into `Unauthenticated`.
    #[default]
    Unknown,
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SessionState::Unknown)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn subject(&self) -> Option<SubjectId> {
        self.session().map(|s| s.subject)
    }
}
