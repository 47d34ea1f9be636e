use thiserror::Error;

use pubtrack_backend::BackendError;
use pubtrack_core::DomainError;

/// Failure of an application service call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ServiceError {
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Domain(err) => err.user_message(),
            ServiceError::Backend(BackendError::NotFound) => "Record not found".to_string(),
            ServiceError::Backend(err) => err.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
