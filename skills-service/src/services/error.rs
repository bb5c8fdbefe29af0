use service_core::error::AppError;
use thiserror::Error;

/// Failures of the hosted auth/profile/journal backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The backend refused the caller's input; the message is the
    /// backend's own and is safe to show.
    #[error("{0}")]
    Rejected(String),

    /// The backend refused a request the service made on its own behalf,
    /// such as a table read with a bad key.
    #[error("Store refused request: {0}")]
    Refused(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected store response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

impl StoreError {
    /// Reclassify a rejection as the service's own fault.
    pub fn refused(self) -> Self {
        match self {
            StoreError::Rejected(message) => StoreError::Refused(message),
            other => other,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCredentials => AppError::unauthorized("Invalid credentials"),
            StoreError::Rejected(message) => AppError::bad_request(message),
            StoreError::Refused(_)
            | StoreError::Unavailable(_)
            | StoreError::InvalidResponse(_) => AppError::Upstream {
                message: "Account service unavailable. Please try again.".to_string(),
                detail: Some(err.to_string()),
            },
        }
    }
}
