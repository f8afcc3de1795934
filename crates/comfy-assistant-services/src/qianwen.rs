//! Alibaba Cloud Qianwen through the DashScope text-generation API.

use crate::backend::{ChatBackend, TextStream, http_client, status_error};
use crate::sse::data_events;
use crate::{Conversation, ServiceError};
use async_trait::async_trait;
use comfy_assistant_protocol::{AiParams, Feature, ModelInfo, ServiceId, ServiceInfo};
use futures_util::{StreamExt, future};
use serde_json::{Value, json};

pub const DEFAULT_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";
const DEFAULT_MODEL: &str = "qwen-max";

const UNSUPPORTED: &[Feature] = &[Feature::ApiBase, Feature::ApiType, Feature::ApiVersion];

/// `(id, display name, description)` of every catalog model.
const CATALOG: &[(&str, &str, &str)] = &[
    ("qwen-max", "通义千问 Max", "Most capable text model"),
    ("qwen-plus", "通义千问 Plus", "Balanced quality and speed"),
    ("qwen-turbo", "通义千问 Turbo", "Fastest text model"),
    ("qwen-vl-plus", "通义千问 VL Plus", "Balanced vision model"),
    ("qwen-vl-max", "通义千问 VL Max", "Most capable vision model"),
    ("qwen-vl-max-latest", "通义千问 VL Max Latest", "Latest vision model"),
    ("qwen-long", "通义千问 Long", "Long-context text model"),
    ("qwen-vl-ocr", "通义千问 VL OCR", "Vision model for text extraction"),
];

/// Map a catalog display name to its model id; other values pass through.
pub fn map_model_name(model: &str) -> &str {
    let model = model.trim();
    CATALOG
        .iter()
        .find(|(_, name, _)| *name == model)
        .map(|(id, _, _)| *id)
        .unwrap_or(model)
}

/// Backend for the DashScope generation endpoint.
#[derive(Debug, Clone)]
pub struct QianwenBackend {
    endpoint: String,
}

impl Default for QianwenBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl QianwenBackend {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
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
            let mut parts = Vec::with_capacity(images.len() + 1);
            if !conversation.message().is_empty() {
                parts.push(json!({ "text": conversation.message() }));
            }
            parts.extend(images.into_iter().map(|url| json!({ "image": url })));
            Value::Array(parts)
        };
        messages.push(json!({ "role": "user", "content": content }));

        let model = match map_model_name(&params.model) {
            "" => DEFAULT_MODEL,
            model => model,
        };
        let mut parameters = json!({
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });
        if stream {
            parameters["incremental_output"] = Value::Bool(true);
        }
        json!({
            "model": model,
            "input": { "messages": messages },
            "parameters": parameters,
        })
    }

    async fn post(
        &self,
        conversation: &Conversation,
        params: &AiParams,
        stream: bool,
    ) -> Result<reqwest::Response, ServiceError> {
        let api_key = params.api_key.trim();
        if api_key.is_empty() {
            return Err(ServiceError::MissingApiKey(ServiceId::Qianwen));
        }
        let client = http_client(params)?;
        let mut request = client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(conversation, params, stream));
        if stream {
            request = request.header("X-DashScope-SSE", "enable");
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(ServiceId::Qianwen, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for QianwenBackend {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            id: ServiceId::Qianwen,
            name: "千问".to_string(),
            description: "Alibaba Cloud Qianwen".to_string(),
        }
    }

    fn unsupported_features(&self) -> &'static [Feature] {
        UNSUPPORTED
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        Ok(CATALOG
            .iter()
            .map(|(id, name, description)| ModelInfo::new(id, name, Some(description)))
            .collect())
    }

    async fn send(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<String, ServiceError> {
        let body: Value = self.post(conversation, params, false).await?.json().await?;
        output_text(&body)?.ok_or_else(|| invalid(format!("missing output.text in {body}")))
    }

    async fn stream(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<TextStream, ServiceError> {
        let response = self.post(conversation, params, true).await?;
        let deltas = data_events(response).filter_map(|event| {
            future::ready(match event {
                Ok(data) => serde_json::from_str::<Value>(&data)
                    .map_err(ServiceError::from)
                    .and_then(|chunk| output_text(&chunk))
                    .map(|text| text.filter(|text| !text.is_empty()))
                    .transpose(),
                Err(err) => Some(Err(err)),
            })
        });
        Ok(deltas.boxed())
    }
}

/// Read `output.text`; an error payload (`code` + `message`) is surfaced.
fn output_text(body: &Value) -> Result<Option<String>, ServiceError> {
    if let Some(text) = body["output"]["text"].as_str() {
        return Ok(Some(text.to_string()));
    }
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        let code = body["code"].as_str().unwrap_or("error");
        return Err(invalid(format!("{code}: {message}")));
    }
    Ok(None)
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidResponse {
        service: ServiceId::Qianwen,
        message: message.into(),
    }
}
