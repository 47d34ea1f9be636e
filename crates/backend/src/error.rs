use thiserror::Error;

/// Failures surfaced by any backend implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("not found")]
    NotFound,

    #[error("invalid login credentials")]
    InvalidCredentials,

    /// Missing, expired, or insufficient credentials for the call.
    #[error("unauthorized")]
    Unauthorized,

    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl BackendError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Worth retrying later: connectivity problems and server-side failures.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Network(_) => true,
            BackendError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
