//! Reading and overlaying individual config files.

use super::{ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_FILE, schema};
use crate::{ConfigError, DEFAULT_HOME_DIR};
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Parsed and schema-checked contents of one layer.
pub(super) struct LayerFile {
    pub(super) meta: ConfigLayer,
    pub(super) value: Value,
}

impl ConfigLayerSource {
    fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Cwd => "cwd",
            Self::Runtime => "runtime",
        }
    }
}

/// `~/.comfy_assistant/comfy_assistant.json5`, when a home directory exists.
pub(super) fn user_config_path() -> Option<PathBuf> {
    let dirs = UserDirs::new()?;
    Some(dirs.home_dir().join(DEFAULT_HOME_DIR).join(DEFAULT_CONFIG_FILE))
}

/// Read one layer. Missing user and cwd files yield `None`; a missing
/// runtime override is an error.
pub(super) fn read_layer(
    source: ConfigLayerSource,
    path: &Path,
) -> Result<Option<LayerFile>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            if source == ConfigLayerSource::Runtime {
                return Err(ConfigError::MissingOverride(path.to_path_buf()));
            }
            debug!(
                "config layer absent (source={}, path={})",
                source.label(),
                path.display()
            );
            return Ok(None);
        }
        Err(err) => return Err(read_error(path, err)),
    };

    let origin = format!("{}({})", source.label(), path.display());
    let value = parse_json5(&contents, &origin)?;
    schema::validate_layer_schema(&value, &origin)?;
    debug!("config layer read (origin={origin}, bytes={})", contents.len());
    Ok(Some(LayerFile {
        meta: ConfigLayer {
            source,
            path: path.to_path_buf(),
        },
        value,
    }))
}

pub(super) fn parse_json5(contents: &str, origin: &str) -> Result<Value, ConfigError> {
    json5::from_str(contents).map_err(|source| ConfigError::Syntax {
        origin: origin.to_string(),
        source,
    })
}

pub(super) fn read_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Read {
        path: path.to_path_buf(),
        source,
    }
}

/// Apply `top` over `base`. Objects merge key by key; anything else in `top`
/// replaces what was there, arrays included.
pub(super) fn overlay(base: &mut Value, top: Value) {
    let Value::Object(top_map) = top else {
        *base = top;
        return;
    };
    let Value::Object(base_map) = base else {
        *base = Value::Object(top_map);
        return;
    };
    for (key, value) in top_map {
        match base_map.get_mut(&key) {
            Some(slot) => overlay(slot, value),
            None => {
                base_map.insert(key, value);
            }
        }
    }
}

/// Identity used to skip a file listed twice (e.g. cwd is the home dir).
pub(super) fn file_identity(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
