use thiserror::Error;

use crate::validation::ValidationErrors;

/// Fixed message shown for every connectivity failure.
pub const OFFLINE_MESSAGE: &str = "You are offline. Please check your internet connection";

/// Fallback used when the server fails without a `message` body.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum BlogClientError {
    // HTTP ошибки
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{}", OFFLINE_MESSAGE)]
    Offline,

    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or(GENERIC_MESSAGE))]
    Server { status: u16, message: Option<String> },

    // Бизнес-логика ошибки
    #[error("Resource not found")]
    NotFound,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("JWT token not found in response")]
    MissingCredentials,

    // Ошибки хранилища сессии
    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),

    // Ошибки сериализации/десериализации
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BlogClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlogClientError::NotFound)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BlogClientError::Unauthorized(_))
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, BlogClientError::Offline)
    }

    /// Message suitable for a transient notification.
    ///
    /// Server messages pass through verbatim; anything the server did not
    /// explain is replaced by `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            BlogClientError::Offline => OFFLINE_MESSAGE.to_string(),
            BlogClientError::Server {
                message: Some(message),
                ..
            } => message.clone(),
            BlogClientError::Unauthorized(message) if !message.is_empty() => message.clone(),
            BlogClientError::Validation(errors) => errors.to_string(),
            BlogClientError::MissingCredentials => self.to_string(),
            _ => fallback.to_string(),
        }
    }
}

impl From<serde_json::Error> for BlogClientError {
    fn from(err: serde_json::Error) -> Self {
        BlogClientError::Serialization(err.to_string())
    }
}

impl From<ValidationErrors> for BlogClientError {
    fn from(errors: ValidationErrors) -> Self {
        BlogClientError::Validation(errors)
    }
}
