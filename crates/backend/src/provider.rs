//! Identity provider contract.

use async_trait::async_trait;
use url::Url;

use pubtrack_auth::Session;
use pubtrack_events::{AuthChange, ListenerHandle};

use crate::error::BackendResult;

pub type AuthChangeCallback = Box<dyn Fn(&AuthChange) + Send + Sync>;

/// Attributes of the signed-in user that may be changed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

impl core::fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserUpdate")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Hosted identity provider.
///
/// Every state change (sign-in, sign-out, refresh, user update, recovery)
/// is also announced through `on_auth_state_change`, in the order it
/// happened.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The persisted session, if any. Does not emit a change.
    async fn get_current_session(&self) -> BackendResult<Option<Session>>;

    /// Register for change notifications until the handle is dropped.
    fn on_auth_state_change(&self, callback: AuthChangeCallback) -> ListenerHandle;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session>;

    async fn sign_out(&self) -> BackendResult<()>;

    /// Ask the provider to mail a recovery link that lands on `redirect_to`.
    async fn reset_password_for_email(&self, email: &str, redirect_to: &Url) -> BackendResult<()>;

    async fn update_user(&self, update: UserUpdate) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let update = UserUpdate::password("hunter22");
        let rendered = format!("{update:?}");
        assert!(!rendered.contains("hunter22"));
        assert!(rendered.contains("redacted"));
    }
}
