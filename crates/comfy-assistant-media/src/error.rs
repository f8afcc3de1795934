//! Media error types.

/// Errors returned while running or probing local tools.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The command line could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// The command names a program other than the configured one.
    #[error("command not allowed: {0}")]
    NotAllowed(String),
    /// The program is not installed or not on PATH.
    #[error("dependency missing: {0}")]
    DependencyMissing(String),
    /// The process exceeded its time budget and was killed.
    #[error("command timed out after {0} seconds")]
    Timeout(u64),
}
