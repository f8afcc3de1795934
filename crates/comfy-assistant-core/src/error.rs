//! Error types for the assistant core.

use comfy_assistant_history::HistoryError;
use comfy_assistant_media::MediaError;
use comfy_assistant_protocol::ServiceId;
use comfy_assistant_services::ServiceError;
use thiserror::Error;

/// Errors returned by assistant operations.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Caller supplied an invalid value.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Prompt id is unknown to the library.
    #[error("prompt not found: {0}")]
    PromptNotFound(String),
    /// The backend answered with nothing.
    #[error("{0} returned an empty reply")]
    EmptyReply(ServiceId),
    /// History store error.
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    /// Backend error.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Local tool error.
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A blocking history task panicked or was cancelled.
    #[error("history task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AssistantError {
    /// Whether the error was caused by the request rather than the system.
    pub fn is_input_error(&self) -> bool {
        match self {
            AssistantError::InvalidInput(_) => true,
            AssistantError::History(HistoryError::InvalidInput(_)) => true,
            AssistantError::Service(
                ServiceError::UnknownService(_) | ServiceError::MissingApiKey(_),
            ) => true,
            AssistantError::Media(
                MediaError::InvalidCommand(_) | MediaError::NotAllowed(_),
            ) => true,
            _ => false,
        }
    }
}
