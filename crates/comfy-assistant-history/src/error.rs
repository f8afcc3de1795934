//! Error types for history operations.

/// Errors returned by the history store.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Caller supplied an out-of-range or malformed argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A persisted line could not be decoded.
    #[error("corrupt history at line {line}: {message}")]
    Corrupt { line: usize, message: String },
    /// The history file was written by a newer schema.
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
}
