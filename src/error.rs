//! Error types for the brand onboarding backend.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Errors raised while processing one conversation turn.
///
/// Every variant is recoverable: the WebSocket loop turns it into an
/// `error` frame and keeps the connection open.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Missing sessionId")]
    MissingSessionId,

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("No session started on this connection")]
    NotStarted,

    #[error("Empty message")]
    EmptyMessage,

    #[error("Malformed client message: {0}")]
    MalformedMessage(String),

    #[error("Content generator failed: {0}")]
    GeneratorTransportFailure(#[from] LlmError),

    #[error("Invalid generator output: {0}")]
    InvalidGeneratorOutput(String),

    #[error("Store failure: {0}")]
    Store(#[from] DatabaseError),
}

impl ConversationError {
    /// Text sent to the client in the `error` frame.
    ///
    /// Store and transport details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::MissingSessionId => "Missing sessionId".to_string(),
            Self::SessionNotFound(_) => "Invalid session".to_string(),
            Self::NotStarted => "Session not started. Send a start message first.".to_string(),
            Self::EmptyMessage => "Message must not be empty".to_string(),
            Self::MalformedMessage(_) => "Malformed message".to_string(),
            Self::GeneratorTransportFailure(_) => {
                "The assistant is unavailable right now. Please try again.".to_string()
            }
            Self::InvalidGeneratorOutput(_) => "AI response is invalid. Try again.".to_string(),
            Self::Store(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}
