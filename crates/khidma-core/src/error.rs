//! Error types for Khidma

use thiserror::Error;

/// Result type alias using Khidma's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Khidma error types
#[derive(Error, Debug)]
pub enum Error {
    // Auth errors (E001-E099)
    #[error("Not authenticated. Sign in before calling this operation.")]
    NotAuthenticated,

    #[error("Not authorized: user '{0}' is not a participant of this conversation.")]
    NotAuthorized(String),

    // Entity errors (E100-E199)
    #[error("User '{0}' not found.")]
    UserNotFound(String),

    #[error("Service '{0}' not found.")]
    ServiceNotFound(String),

    #[error("Conversation '{0}' not found.")]
    ConversationNotFound(String),

    #[error("Message '{0}' not found.")]
    MessageNotFound(String),

    // Validation errors (E200-E299)
    #[error("Message content is empty after trimming.")]
    EmptyMessage,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Conflict errors (E300-E399)
    #[error("A conversation for this (service, client, provider) already exists.")]
    DuplicateConversation,

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "E001",
            Self::NotAuthorized(_) => "E002",
            Self::UserNotFound(_) => "E100",
            Self::ServiceNotFound(_) => "E101",
            Self::ConversationNotFound(_) => "E102",
            Self::MessageNotFound(_) => "E103",
            Self::EmptyMessage => "E200",
            Self::InvalidInput(_) => "E201",
            Self::DuplicateConversation => "E300",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Whether the error is a client-side validation failure that never
    /// reached the database
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyMessage | Self::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::NotAuthenticated.code(), "E001");
        assert_eq!(Error::EmptyMessage.code(), "E200");
        assert_eq!(Error::DuplicateConversation.code(), "E300");
        assert_eq!(Error::ConfigError("x".into()).code(), "E600");
    }

    #[test]
    fn test_validation_classification() {
        assert!(Error::EmptyMessage.is_validation());
        assert!(Error::InvalidInput("bad".into()).is_validation());
        assert!(!Error::NotAuthenticated.is_validation());
    }
}
