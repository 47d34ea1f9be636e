//! Sign-in, sign-out and password flows.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use pubtrack_auth::{Session, recovery_redirect_url, validate_session};
use pubtrack_backend::{AuthProvider, BackendError, UserUpdate};
use pubtrack_core::Clock;

pub const RESET_PASSWORD_PATH: &str = "/reset-password";
pub const MIN_PASSWORD_LEN: usize = 6;

pub const RESET_LINK_SENT: &str = "Password reset link sent. Check your inbox.";
pub const RESET_LINK_FAILED: &str = "Error sending reset email";
pub const PASSWORD_UPDATED: &str = "Password updated successfully.";
pub const PASSWORD_UPDATE_FAILED: &str = "Error updating password";

/// A blocking form failure with the message shown inline.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct FormError {
    pub message: String,
}

impl FormError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    provider: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    site_url: Url,
}

impl AccountService {
    pub fn new(provider: Arc<dyn AuthProvider>, clock: Arc<dyn Clock>, site_url: Url) -> Self {
        Self {
            provider,
            clock,
            site_url,
        }
    }

    /// Password sign-in. Accounts with an unverified email are signed
    /// straight back out.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, FormError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(FormError::new("Email and password are required."));
        }

        let session = self
            .provider
            .sign_in_with_password(email, password)
            .await
            .map_err(|err| match err {
                BackendError::InvalidCredentials => FormError::new("Invalid login credentials"),
                other => {
                    tracing::warn!("sign-in failed: {other}");
                    FormError::new(other.to_string())
                }
            })?;

        if let Err(err) = validate_session(&session, self.clock.now()) {
            tracing::info!(subject = %session.subject, "sign-in rejected: {err}");
            if let Err(err) = self.provider.sign_out().await {
                tracing::warn!("sign-out after rejected sign-in failed: {err}");
            }
            return Err(FormError::new(
                "Please verify your email address before signing in.",
            ));
        }

        tracing::info!(subject = %session.subject, "signed in");
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<(), FormError> {
        self.provider.sign_out().await.map_err(|err| {
            tracing::warn!("sign-out failed: {err}");
            FormError::new("Error signing out")
        })
    }

    /// Mail a recovery link pointing at the reset page, stamped with the
    /// current time. Returns the notice to show.
    pub async fn request_password_reset(&self, email: &str) -> Result<&'static str, FormError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(FormError::new("Email is required"));
        }

        let redirect = recovery_redirect_url(&self.site_url, RESET_PASSWORD_PATH, self.clock.now())
            .map_err(|err| {
                tracing::error!("cannot build recovery link: {err}");
                FormError::new(RESET_LINK_FAILED)
            })?;

        self.provider
            .reset_password_for_email(email, &redirect)
            .await
            .map_err(|err| {
                tracing::warn!("password reset request failed: {err}");
                FormError::new(RESET_LINK_FAILED)
            })?;

        Ok(RESET_LINK_SENT)
    }

    /// Change the signed-in user's password. After a recovery-link update
    /// the recovery session is ended so the user signs in afresh.
    pub async fn update_password(&self, password: &str, from_recovery: bool) -> Result<&'static str, FormError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(FormError::new(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        self.provider
            .update_user(UserUpdate::password(password))
            .await
            .map_err(|err| {
                tracing::warn!("password update failed: {err}");
                FormError::new(PASSWORD_UPDATE_FAILED)
            })?;

        if from_recovery {
            if let Err(err) = self.provider.sign_out().await {
                tracing::warn!("sign-out after password recovery failed: {err}");
            }
        }
        Ok(PASSWORD_UPDATED)
    }
}

impl core::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccountService")
            .field("site_url", &self.site_url.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pubtrack_backend::InMemoryBackend;
    use pubtrack_core::FixedClock;

    fn setup() -> (Arc<InMemoryBackend>, AccountService) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let site = Url::parse("https://pubtrack.example.edu/").unwrap();
        let account = AccountService::new(backend.clone(), clock, site);
        (backend, account)
    }

    #[tokio::test]
    async fn sign_in_requires_both_fields() {
        let (_, account) = setup();
        let err = account.sign_in("  ", "secret1").await.unwrap_err();
        assert_eq!(err.message, "Email and password are required.");
        assert!(account.sign_in("a@uni.edu", "").await.is_err());
    }

    #[tokio::test]
    async fn wrong_password_is_an_inline_error() {
        let (backend, account) = setup();
        backend.register_account("prof@uni.edu", "secret1", true);
        let err = account.sign_in("prof@uni.edu", "nope").await.unwrap_err();
        assert_eq!(err.message, "Invalid login credentials");
    }

    #[tokio::test]
    async fn unverified_account_is_signed_back_out() {
        let (backend, account) = setup();
        backend.register_account("new@uni.edu", "secret1", false);

        let err = account.sign_in("new@uni.edu", "secret1").await.unwrap_err();
        assert!(err.message.contains("verify your email"));
        assert_eq!(backend.get_current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn verified_sign_in_returns_session() {
        let (backend, account) = setup();
        let subject = backend.register_account("prof@uni.edu", "secret1", true);
        let session = account.sign_in(" prof@uni.edu ", "secret1").await.unwrap();
        assert_eq!(session.subject, subject);
    }

    #[tokio::test]
    async fn reset_link_carries_recovery_marker_and_timestamp() {
        let (backend, account) = setup();
        let notice = account.request_password_reset("prof@uni.edu").await.unwrap();
        assert_eq!(notice, RESET_LINK_SENT);

        let requests = backend.reset_requests();
        assert_eq!(requests.len(), 1);
        let link = &requests[0].redirect_to;
        assert_eq!(link.path(), RESET_PASSWORD_PATH);
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap().timestamp_millis().to_string();
        assert_eq!(
            link.query(),
            Some(format!("type=recovery&ts={ts}").as_str())
        );
    }

    #[tokio::test]
    async fn reset_requires_email() {
        let (backend, account) = setup();
        assert!(account.request_password_reset("").await.is_err());
        assert!(backend.reset_requests().is_empty());
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_calling_provider() {
        let (_, account) = setup();
        let err = account.update_password("12345", false).await.unwrap_err();
        assert_eq!(err.message, "Password must be at least 6 characters");
    }

    #[tokio::test]
    async fn update_without_session_fails() {
        let (_, account) = setup();
        let err = account.update_password("longenough", false).await.unwrap_err();
        assert_eq!(err.message, PASSWORD_UPDATE_FAILED);
    }

    #[tokio::test]
    async fn recovery_update_signs_out() {
        let (backend, account) = setup();
        backend.register_account("prof@uni.edu", "secret1", true);
        backend.restore_session("prof@uni.edu");

        account.update_password("brand-new", true).await.unwrap();
        assert_eq!(backend.get_current_session().await.unwrap(), None);
        assert!(account.sign_in("prof@uni.edu", "brand-new").await.is_ok());
    }

    #[tokio::test]
    async fn regular_update_keeps_session() {
        let (backend, account) = setup();
        backend.register_account("prof@uni.edu", "secret1", true);
        backend.restore_session("prof@uni.edu");

        assert_eq!(account.update_password("brand-new", false).await, Ok(PASSWORD_UPDATED));
        assert!(backend.get_current_session().await.unwrap().is_some());
    }
}
