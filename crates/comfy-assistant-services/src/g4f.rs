//! G4F relay reached through its OpenAI-compatible HTTP API.

use crate::backend::{ChatBackend, TextStream, http_client, status_error};
use crate::sse::data_events;
use crate::{Conversation, ServiceError};
use async_trait::async_trait;
use comfy_assistant_protocol::{AiParams, Feature, ModelInfo, ServiceId, ServiceInfo};
use futures_util::{StreamExt, future};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const CACHE_DIR: &str = "models_cache";
const CACHE_FILE: &str = "g4f_models.json";
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const DONE_MARKER: &str = "[DONE]";

const UNSUPPORTED: &[Feature] = &[
    Feature::ApiKey,
    Feature::ApiBase,
    Feature::ApiType,
    Feature::ApiVersion,
];

const BACKUP_MODELS: &[(&str, &str)] = &[
    ("gpt_35_turbo", "GPT-3.5-Turbo"),
    ("gpt_4", "GPT-4"),
    ("claude_3_opus", "Claude-3-Opus"),
    ("claude_3_sonnet", "Claude-3-Sonnet"),
    ("gemini_pro", "Gemini Pro"),
];

/// Backend for a G4F relay.
#[derive(Debug, Clone)]
pub struct G4fBackend {
    api_base: String,
    cache_path: PathBuf,
}

impl G4fBackend {
    /// `api_base` is the OpenAI-compatible root, e.g. `http://127.0.0.1:1337/v1`.
    /// The model list cache lives under `cache_root/models_cache/`.
    pub fn new(api_base: impl Into<String>, cache_root: &Path) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            api_base,
            cache_path: cache_root.join(CACHE_DIR).join(CACHE_FILE),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    async fn live_models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(LIST_TIMEOUT)
            .no_proxy()
            .build()?;
        let response = client
            .get(format!("{}/models", self.api_base))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(ServiceId::G4f, response).await);
        }
        let body: Value = response.json().await?;
        let Some(entries) = body["data"].as_array() else {
            return Err(invalid("model listing has no `data` array"));
        };
        let mut ids: Vec<&str> = entries
            .iter()
            .filter_map(|entry| entry["id"].as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Err(invalid("model listing is empty"));
        }
        Ok(ids
            .into_iter()
            .map(|id| ModelInfo::new(id, &id.replace('_', "-").to_uppercase(), None))
            .collect())
    }

    fn read_cache(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        let raw = std::fs::read_to_string(&self.cache_path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_cache(&self, models: &[ModelInfo]) {
        let write = || -> Result<(), ServiceError> {
            if let Some(parent) = self.cache_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.cache_path, serde_json::to_vec_pretty(models)?)?;
            Ok(())
        };
        if let Err(err) = write() {
            warn!(
                "failed to write model cache (path={}, err={err})",
                self.cache_path.display()
            );
        }
    }

    fn request_body(&self, conversation: &Conversation, params: &AiParams, stream: bool) -> Value {
        let mut messages: Vec<Value> = conversation
            .prior_messages()
            .into_iter()
            .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
            .collect();
        let images = conversation.image_urls();
        let content = if images.is_empty() {
            Value::String(conversation.message().to_string())
        } else {
            let mut parts = vec![json!({ "type": "text", "text": conversation.message() })];
            parts.extend(
                images
                    .into_iter()
                    .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
            );
            Value::Array(parts)
        };
        messages.push(json!({ "role": "user", "content": content }));

        let model = match params.model.trim() {
            "" => DEFAULT_MODEL,
            model => model,
        };
        json!({
            "model": model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": stream,
        })
    }

    async fn post(
        &self,
        conversation: &Conversation,
        params: &AiParams,
        stream: bool,
    ) -> Result<reqwest::Response, ServiceError> {
        let client = http_client(params)?;
        let response = client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&self.request_body(conversation, params, stream))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(ServiceId::G4f, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for G4fBackend {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            id: ServiceId::G4f,
            name: "G4F".to_string(),
            description: "Free GPT service".to_string(),
        }
    }

    fn unsupported_features(&self) -> &'static [Feature] {
        UNSUPPORTED
    }

    /// Live listing first, then the on-disk cache, then the built-in list.
    async fn models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        match self.live_models().await {
            Ok(models) => {
                debug!("listed g4f models (count={})", models.len());
                self.write_cache(&models);
                return Ok(models);
            }
            Err(err) => warn!("g4f model listing failed (err={err})"),
        }

        if self.cache_path.exists() {
            match self.read_cache() {
                Ok(models) => {
                    info!("using cached g4f models (count={})", models.len());
                    return Ok(models);
                }
                Err(err) => warn!(
                    "failed to read model cache (path={}, err={err})",
                    self.cache_path.display()
                ),
            }
        }

        let models: Vec<ModelInfo> = BACKUP_MODELS
            .iter()
            .map(|(id, name)| ModelInfo::new(id, name, None))
            .collect();
        self.write_cache(&models);
        Ok(models)
    }

    async fn send(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<String, ServiceError> {
        let body: Value = self.post(conversation, params, false).await?.json().await?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("missing choices[0].message.content in {body}")))
    }

    async fn stream(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<TextStream, ServiceError> {
        let response = self.post(conversation, params, true).await?;
        let deltas = data_events(response)
            .take_while(|event| {
                future::ready(!matches!(event, Ok(data) if data.trim() == DONE_MARKER))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(data) => parse_delta(&data).transpose(),
                    Err(err) => Some(Err(err)),
                })
            });
        Ok(deltas.boxed())
    }
}

/// Extract `choices[0].delta.content` from one completion chunk.
fn parse_delta(data: &str) -> Result<Option<String>, ServiceError> {
    let chunk: Value = serde_json::from_str(data)?;
    if let Some(error) = chunk.get("error") {
        return Err(invalid(format!("stream error: {error}")));
    }
    Ok(chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .map(str::to_string))
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidResponse {
        service: ServiceId::G4f,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::{G4fBackend, parse_delta};
    use crate::Conversation;
    use comfy_assistant_protocol::AiParams;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn request_body_carries_images_as_content_parts() {
        let backend = G4fBackend::new("http://relay/v1/", Path::new("/tmp"));
        let conversation = Conversation::new("what is this")
            .with_images(vec!["/view?filename=a.png".to_string()])
            .with_host_url("http://host:8188");
        let body = backend.request_body(&conversation, &AiParams::default(), false);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(
            body["messages"],
            json!([{
                "role": "user",
                "content": [
                    { "type": "text", "text": "what is this" },
                    { "type": "image_url", "image_url": { "url": "http://host:8188/view?filename=a.png" } }
                ]
            }])
        );
        assert_eq!(backend.api_base(), "http://relay/v1");
    }

    #[test]
    fn deltas_skip_empty_content() {
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).expect("parse"),
            Some("hi".to_string())
        );
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).expect("parse"),
            None
        );
        assert!(parse_delta(r#"{"error":"quota"}"#).is_err());
    }
}
