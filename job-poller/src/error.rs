use common::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollerError {
    #[error("{0}")]
    Validation(String),

    /// Non-2xx answer from the generation service.
    #[error("Server responded with {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Generation failed: {0}")]
    JobFailed(String),

    #[error("Generation timeout after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("Session cancelled")]
    Cancelled,

    #[error("Invalid session transition: {0}")]
    InvalidTransition(String),

    /// Shared-library failure other than input validation.
    #[error("{0}")]
    Internal(String),
}

impl From<AppError> for PollerError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
