//! Error types for model backends.

use comfy_assistant_protocol::{ServiceId, UnknownService};

/// Errors returned by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The backend requires an API key and none was configured.
    #[error("{0} requires an API key")]
    MissingApiKey(ServiceId),
    /// The service id does not name a backend.
    #[error(transparent)]
    UnknownService(#[from] UnknownService),
    /// Transport failure, including timeouts.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("{service} error ({status}): {body}")]
    Status {
        service: ServiceId,
        status: u16,
        body: String,
    },
    /// The backend answered with a body of the wrong shape.
    #[error("unexpected {service} response: {message}")]
    InvalidResponse { service: ServiceId, message: String },
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
