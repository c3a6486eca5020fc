use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Provider error ({}): {message}", status_label(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Download error: {0}")]
    Download(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "transport".to_string(), |code| code.to_string())
}

impl AppError {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }
}

impl From<object_store::Error> for AppError {
    fn from(err: object_store::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
