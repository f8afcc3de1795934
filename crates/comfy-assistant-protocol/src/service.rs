//! Backend descriptors and tunable request parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Closed set of supported model backends.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ServiceId {
    /// Free GPT relay exposed through an OpenAI-compatible endpoint.
    #[default]
    G4f,
    /// Alibaba Cloud DashScope (Qianwen).
    Qianwen,
}

impl ServiceId {
    /// All backends in display order.
    pub const ALL: [ServiceId; 2] = [ServiceId::G4f, ServiceId::Qianwen];

    /// Return the wire id.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::G4f => "g4f",
            ServiceId::Qianwen => "qianwen",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a service id does not name a supported backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service: {0}")]
pub struct UnknownService(pub String);

impl FromStr for ServiceId {
    type Err = UnknownService;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "g4f" => Ok(ServiceId::G4f),
            "qianwen" => Ok(ServiceId::Qianwen),
            other => Err(UnknownService(other.to_string())),
        }
    }
}

/// Descriptor returned by the service listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub name: String,
    pub description: String,
}

/// One model offered by a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelInfo {
    pub fn new(id: &str, name: &str, description: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
        }
    }
}

/// Request parameters a backend may not support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ApiKey,
    ApiBase,
    ApiType,
    ApiVersion,
    Stream,
    SystemPrompt,
    Temperature,
    MaxTokens,
    Timeout,
    Proxy,
}

impl Feature {
    /// Return the parameter key used in settings payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::ApiKey => "api_key",
            Feature::ApiBase => "api_base",
            Feature::ApiType => "api_type",
            Feature::ApiVersion => "api_version",
            Feature::Stream => "stream",
            Feature::SystemPrompt => "system_prompt",
            Feature::Temperature => "temperature",
            Feature::MaxTokens => "max_tokens",
            Feature::Timeout => "timeout",
            Feature::Proxy => "proxy",
        }
    }
}

/// Sampling and transport parameters for one backend call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub model: String,
    pub proxy: String,
    pub api_key: String,
    pub api_base: String,
    pub api_type: String,
    pub api_version: String,
}

impl Default for AiParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_tokens: 2000,
            timeout: 300,
            model: String::new(),
            proxy: String::new(),
            api_key: String::new(),
            api_base: String::new(),
            api_type: String::new(),
            api_version: String::new(),
        }
    }
}

impl AiParams {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Proxy URL when one is configured.
    pub fn proxy(&self) -> Option<&str> {
        let proxy = self.proxy.trim();
        (!proxy.is_empty()).then_some(proxy)
    }
}
