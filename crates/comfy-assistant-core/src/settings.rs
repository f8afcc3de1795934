//! User-selected backend and per-backend parameters, persisted as JSON.

use crate::error::AssistantError;
use comfy_assistant_config::ServicesConfig;
use comfy_assistant_protocol::{AiParams, Feature, ServiceId};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "settings.json";
/// Placeholder shown for parameters a backend does not support.
pub const DISABLED: &str = "disabled";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    service: Option<ServiceId>,
    #[serde(default)]
    params: BTreeMap<ServiceId, AiParams>,
}

/// Persisted backend settings layered over the configured defaults.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    defaults: ServicesConfig,
    state: Mutex<SettingsFile>,
}

impl SettingsStore {
    /// Open `root/settings.json`; a missing file means configured defaults.
    pub fn open(root: &Path, defaults: ServicesConfig) -> Result<Self, AssistantError> {
        let path = root.join(SETTINGS_FILE);
        let state = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(err) => {
                    warn!(
                        "settings unreadable, using defaults (path={}, err={err})",
                        path.display()
                    );
                    SettingsFile::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => SettingsFile::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            defaults,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backend used when a request does not name one.
    pub fn selected(&self) -> ServiceId {
        self.state.lock().service.unwrap_or(self.defaults.default)
    }

    /// Saved parameters for `service`, or the configured defaults.
    pub fn params(&self, service: ServiceId) -> AiParams {
        self.state
            .lock()
            .params
            .get(&service)
            .cloned()
            .unwrap_or_else(|| self.defaults.params(service).clone())
    }

    /// Parameters as a JSON map with unsupported ones replaced by `"disabled"`.
    pub fn view(
        &self,
        service: ServiceId,
        unsupported: &[Feature],
    ) -> Result<Map<String, Value>, AssistantError> {
        let Value::Object(mut map) = serde_json::to_value(self.params(service))? else {
            return Ok(Map::new());
        };
        for feature in unsupported {
            if let Some(value) = map.get_mut(feature.as_str()) {
                *value = Value::String(DISABLED.to_string());
            }
        }
        Ok(map)
    }

    /// Select `service` and merge `raw` over its current parameters.
    /// `"disabled"` placeholders and unsupported parameters are ignored;
    /// numeric fields may arrive as strings.
    pub fn save(
        &self,
        service: ServiceId,
        raw: &Map<String, Value>,
        unsupported: &[Feature],
    ) -> Result<AiParams, AssistantError> {
        let Value::Object(mut merged) = serde_json::to_value(self.params(service))? else {
            return Err(AssistantError::InvalidInput(
                "parameters must be an object".to_string(),
            ));
        };
        for (key, value) in raw {
            if value.as_str() == Some(DISABLED)
                || unsupported.iter().any(|feature| feature.as_str() == key)
                || !merged.contains_key(key)
            {
                continue;
            }
            merged.insert(key.clone(), coerce(key, value)?);
        }
        let params: AiParams = serde_json::from_value(Value::Object(merged))
            .map_err(|err| AssistantError::InvalidInput(format!("invalid parameters: {err}")))?;

        let mut state = self.state.lock();
        state.service = Some(service);
        state.params.insert(service, params.clone());
        self.persist(&state)?;
        debug!("saved settings (service={service})");
        Ok(params)
    }

    fn persist(&self, state: &SettingsFile) -> Result<(), AssistantError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn coerce(key: &str, value: &Value) -> Result<Value, AssistantError> {
    let numeric = matches!(key, "temperature" | "max_tokens" | "timeout");
    match value {
        Value::String(text) if numeric => {
            let parsed = if key == "temperature" {
                text.trim().parse::<f64>().ok().map(Value::from)
            } else {
                text.trim().parse::<u64>().ok().map(Value::from)
            };
            parsed.ok_or_else(|| AssistantError::InvalidInput(format!("{key} must be a number")))
        }
        Value::Null if !numeric => Ok(Value::String(String::new())),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::SettingsStore;
    use crate::AssistantError;
    use comfy_assistant_config::ServicesConfig;
    use comfy_assistant_protocol::{Feature, ServiceId};
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value, json};
    use tempfile::tempdir;

    const G4F_UNSUPPORTED: &[Feature] = &[
        Feature::ApiKey,
        Feature::ApiBase,
        Feature::ApiType,
        Feature::ApiVersion,
    ];

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn defaults_come_from_config() {
        let temp = tempdir().expect("tempdir");
        let store = SettingsStore::open(temp.path(), ServicesConfig::default()).expect("open");
        assert_eq!(store.selected(), ServiceId::G4f);
        assert_eq!(store.params(ServiceId::Qianwen).model, "qwen-max");
    }

    #[test]
    fn view_masks_unsupported_features() {
        let temp = tempdir().expect("tempdir");
        let store = SettingsStore::open(temp.path(), ServicesConfig::default()).expect("open");
        let view = store.view(ServiceId::G4f, G4F_UNSUPPORTED).expect("view");
        assert_eq!(view["api_key"], "disabled");
        assert_eq!(view["api_version"], "disabled");
        assert_eq!(view["model"], "gpt-4o-mini");
        assert_eq!(view["max_tokens"], 2000);
    }

    #[test]
    fn save_ignores_placeholders_and_persists() {
        let temp = tempdir().expect("tempdir");
        let store = SettingsStore::open(temp.path(), ServicesConfig::default()).expect("open");
        let raw = object(json!({
            "model": "gpt-4",
            "max_tokens": "512",
            "temperature": 0.2,
            "api_key": "disabled",
            "api_base": "http://elsewhere",
            "unknown": 1
        }));
        let saved = store.save(ServiceId::G4f, &raw, G4F_UNSUPPORTED).expect("save");
        assert_eq!(saved.model, "gpt-4");
        assert_eq!(saved.max_tokens, 512);
        assert_eq!(saved.api_base, "http://127.0.0.1:1337/v1");

        let reopened = SettingsStore::open(temp.path(), ServicesConfig::default()).expect("reopen");
        assert_eq!(reopened.params(ServiceId::G4f), saved);
        assert_eq!(reopened.selected(), ServiceId::G4f);
    }

    #[test]
    fn save_selects_service() {
        let temp = tempdir().expect("tempdir");
        let store = SettingsStore::open(temp.path(), ServicesConfig::default()).expect("open");
        let raw = object(json!({ "api_key": "sk-1" }));
        store.save(ServiceId::Qianwen, &raw, &[]).expect("save");
        assert_eq!(store.selected(), ServiceId::Qianwen);
        assert_eq!(store.params(ServiceId::Qianwen).api_key, "sk-1");
    }

    #[test]
    fn non_numeric_strings_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = SettingsStore::open(temp.path(), ServicesConfig::default()).expect("open");
        let raw = object(json!({ "timeout": "soon" }));
        let err = store.save(ServiceId::G4f, &raw, &[]).unwrap_err();
        assert!(matches!(err, AssistantError::InvalidInput(_)));
    }
}
