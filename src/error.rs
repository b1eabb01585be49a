use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found")]
    NotFound,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<crypto_core::CryptoError> for AppError {
    fn from(e: crypto_core::CryptoError) -> Self {
        AppError::Encryption(e.to_string())
    }
}

impl AppError {
    pub fn transport(message: impl Into<String>) -> Self {
        AppError::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Returns whether a caller may retry the request (network failures and 5xx)
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Transport { status: None, .. } => true,
            AppError::Transport {
                status: Some(code), ..
            } => *code >= 500,
            _ => false,
        }
    }

    /// Returns the HTTP status the error corresponds to, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::Validation(_) => Some(400),
            AppError::NotFound => Some(404),
            AppError::Transport { status, .. } => *status,
            AppError::Encryption(_) | AppError::Config(_) => None,
        }
    }
}
