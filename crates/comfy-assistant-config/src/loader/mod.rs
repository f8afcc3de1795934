//! Layered loading of `comfy_assistant.json5`.
//!
//! Layers are applied lowest first: the user file in `~/.comfy_assistant`, the
//! file in the working directory, then every `--config` override in the order
//! given. Each layer is schema-checked on its own so errors name the file they
//! came from; the merged value is decoded and validated once at the end.

mod layers;
mod schema;

#[cfg(test)]
mod tests;

use crate::{AssistantConfig, ConfigError};
use layers::{file_identity, overlay, parse_json5, read_error, read_layer};
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the home and working directories.
const DEFAULT_CONFIG_FILE: &str = "comfy_assistant.json5";

/// Merged config and the files that produced it, lowest precedence first.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: AssistantConfig,
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    User,
    Cwd,
    /// Passed explicitly with `--config`; must exist.
    Runtime,
}

#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Locations consulted by [`AssistantConfig::load_layered_with_options`].
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    /// `None` skips the user layer entirely.
    pub user_config_path: Option<PathBuf>,
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: layers::user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Layers to read, lowest precedence first.
    fn plan(&self) -> Vec<(ConfigLayerSource, PathBuf)> {
        let cwd = self
            .cwd
            .canonicalize()
            .unwrap_or_else(|_| self.cwd.clone());
        let mut plan = Vec::with_capacity(2 + self.runtime_paths.len());
        if let Some(path) = &self.user_config_path {
            plan.push((ConfigLayerSource::User, path.clone()));
        }
        plan.push((ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE)));
        plan.extend(
            self.runtime_paths
                .iter()
                .map(|path| (ConfigLayerSource::Runtime, path.clone())),
        );
        plan
    }
}

impl AssistantConfig {
    /// Read exactly one file, without layering.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config (path={})", path.display());
        let contents = fs::read_to_string(path).map_err(|err| read_error(path, err))?;
        let origin = path.display().to_string();
        decode(parse_json5(&contents, &origin)?, &origin)
    }

    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading inline config (len={})", contents.len());
        decode(parse_json5(contents, "config")?, "config")
    }

    /// Layered load from the default user location plus `cwd`.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut merged = Value::Object(Map::new());
        let mut layers = Vec::new();
        let mut seen = HashSet::new();

        for (source, path) in options.plan() {
            // A runtime override naming an already-read file still applies last.
            if source != ConfigLayerSource::Runtime && !seen.insert(file_identity(&path)) {
                debug!("config layer listed twice (path={})", path.display());
                continue;
            }
            if let Some(layer) = read_layer(source, &path)? {
                overlay(&mut merged, layer.value);
                layers.push(layer.meta);
            }
        }

        let config = decode(merged, "effective")?;
        info!("config ready (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Range checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.history.page_size) {
            return Err(ConfigError::InvalidField {
                path: "history.page_size".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }
        if self.ffmpeg.program.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                path: "ffmpeg.program".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.ffmpeg.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ffmpeg.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn decode(value: Value, origin: &str) -> Result<AssistantConfig, ConfigError> {
    schema::validate_layer_schema(&value, origin)?;
    let config: AssistantConfig =
        serde_json::from_value(value).map_err(|source| ConfigError::Decode {
            origin: origin.to_string(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}
