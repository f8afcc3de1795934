//! Key and type checks for a single config layer.
//!
//! serde would silently ignore misspelled keys, so every layer is walked
//! against a fixed table first. Errors carry `origin:dotted.path`.

use crate::ConfigError;
use comfy_assistant_protocol::ServiceId;
use serde_json::{Map, Value};

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Count,
    Number,
    Service,
    Section(&'static [(&'static str, Kind)]),
    /// `services`: `default` plus one parameter block per backend.
    Services,
}

const AI_PARAMS: &[(&str, Kind)] = &[
    ("temperature", Kind::Number),
    ("max_tokens", Kind::Count),
    ("timeout", Kind::Count),
    ("model", Kind::Text),
    ("proxy", Kind::Text),
    ("api_key", Kind::Text),
    ("api_base", Kind::Text),
    ("api_type", Kind::Text),
    ("api_version", Kind::Text),
];

const ROOT: &[(&str, Kind)] = &[
    ("$schema", Kind::Text),
    ("storage", Kind::Section(&[("root", Kind::Text)])),
    ("history", Kind::Section(&[("page_size", Kind::Count)])),
    ("services", Kind::Services),
    (
        "ffmpeg",
        Kind::Section(&[("program", Kind::Text), ("timeout_secs", Kind::Count)]),
    ),
    ("server", Kind::Section(&[("bind", Kind::Text)])),
];

pub(super) fn validate_layer_schema(value: &Value, origin: &str) -> Result<(), ConfigError> {
    check(value, Kind::Section(ROOT), origin, "")
}

fn check(value: &Value, kind: Kind, origin: &str, path: &str) -> Result<(), ConfigError> {
    let fail = |message: &str| invalid_field(origin, path, message);
    match kind {
        Kind::Text if !value.is_string() => Err(fail("expected string")),
        Kind::Count if !value.is_u64() => Err(fail("expected non-negative integer")),
        Kind::Number if !value.is_number() => Err(fail("expected number")),
        Kind::Text | Kind::Count | Kind::Number => Ok(()),
        Kind::Service => {
            let id = value.as_str().ok_or_else(|| fail("expected string"))?;
            match id.parse::<ServiceId>() {
                Ok(_) => Ok(()),
                Err(_) => Err(fail(&format!("unknown service '{id}'"))),
            }
        }
        Kind::Section(fields) => {
            let map = object(value, origin, path)?;
            for (key, child) in map {
                let child_path = join(path, key);
                let Some((_, kind)) = fields.iter().find(|(name, _)| name == key) else {
                    return Err(invalid_field(origin, &child_path, "unknown key"));
                };
                check(child, *kind, origin, &child_path)?;
            }
            Ok(())
        }
        Kind::Services => {
            let map = object(value, origin, path)?;
            for (key, child) in map {
                let child_path = join(path, key);
                let kind = if key == "default" {
                    Kind::Service
                } else if key.parse::<ServiceId>().is_ok() {
                    Kind::Section(AI_PARAMS)
                } else {
                    return Err(invalid_field(origin, &child_path, "unknown key"));
                };
                check(child, kind, origin, &child_path)?;
            }
            Ok(())
        }
    }
}

fn object<'a>(
    value: &'a Value,
    origin: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(origin, path, "expected object"))
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid_field(origin: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{origin}:{path}"),
        message: message.to_string(),
    }
}
