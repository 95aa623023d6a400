//! Error types for Amber

use thiserror::Error;

/// Result type alias for Amber operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Amber
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The ID token is malformed or lacks a required claim.
    #[error("Token decode error: {0}")]
    TokenDecode(String),

    /// Bad credentials, a rejected refresh grant or an unexpected provider answer.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Authentication error: token endpoint answered with status {status}")]
    TokenEndpoint { status: u16 },

    /// Missing identity id or an incomplete credential set.
    #[error("Identity exchange error: {0}")]
    IdentityExchange(String),

    /// Failure reported by the object store. The provider error code wins over
    /// the generic description when the store supplied one.
    #[error("Storage error: {}", code.as_deref().unwrap_or(message))]
    Storage {
        code: Option<String>,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Storage failure without a provider code.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            code: None,
            message: message.into(),
        }
    }

    /// True for failures that should send the user back to sign-in.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::TokenEndpoint { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
