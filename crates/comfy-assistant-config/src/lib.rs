//! Settings file for the assistant.
//!
//! `comfy_assistant.json5` is read from the home directory, the working
//! directory and any `--config` overrides, merged in that order, checked
//! against a fixed key schema and decoded into [`AssistantConfig`].

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::*;
