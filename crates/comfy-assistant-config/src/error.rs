use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading, merging or checking `comfy_assistant.json5` layers.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{origin} is not valid json5: {source}")]
    Syntax {
        origin: String,
        #[source]
        source: json5::Error,
    },
    #[error("{origin} cannot be decoded: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    /// A `--config` override that does not exist.
    #[error("override config {0} does not exist")]
    MissingOverride(PathBuf),
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}
