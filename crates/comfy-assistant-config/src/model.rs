//! Configuration schema for the assistant.

use comfy_assistant_protocol::{AiParams, ServiceId};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory under the home directory holding user config and data.
pub const DEFAULT_HOME_DIR: &str = ".comfy_assistant";

/// Root config for the assistant extension.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssistantConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where persisted state (history, prompts, settings, caches) lives.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Explicit storage root; defaults to `~/.comfy_assistant/data`.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the storage root, falling back to the home directory.
    pub fn resolve_root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.root {
            return Some(root.clone());
        }
        UserDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_HOME_DIR).join("data"))
    }
}

/// Chat history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Page size used when a request omits `limit`.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    20
}

/// Backend defaults applied before saved settings and request overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Backend selected when nothing has been saved yet.
    #[serde(default)]
    pub default: ServiceId,
    #[serde(default = "default_g4f_params")]
    pub g4f: AiParams,
    #[serde(default = "default_qianwen_params")]
    pub qianwen: AiParams,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            default: ServiceId::default(),
            g4f: default_g4f_params(),
            qianwen: default_qianwen_params(),
        }
    }
}

impl ServicesConfig {
    /// Configured defaults for one backend.
    pub fn params(&self, service: ServiceId) -> &AiParams {
        match service {
            ServiceId::G4f => &self.g4f,
            ServiceId::Qianwen => &self.qianwen,
        }
    }
}

/// Default base URL of the local G4F relay.
pub const DEFAULT_G4F_API_BASE: &str = "http://127.0.0.1:1337/v1";

fn default_g4f_params() -> AiParams {
    AiParams {
        model: "gpt-4o-mini".to_string(),
        api_base: DEFAULT_G4F_API_BASE.to_string(),
        ..AiParams::default()
    }
}

fn default_qianwen_params() -> AiParams {
    AiParams {
        model: "qwen-max".to_string(),
        ..AiParams::default()
    }
}

/// Local FFmpeg execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    /// The only program name accepted as the first token of a command.
    #[serde(default = "default_ffmpeg_program")]
    pub program: String,
    #[serde(default = "default_ffmpeg_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            program: default_ffmpeg_program(),
            timeout_secs: default_ffmpeg_timeout_secs(),
        }
    }
}

fn default_ffmpeg_program() -> String {
    "ffmpeg".to_string()
}

fn default_ffmpeg_timeout_secs() -> u64 {
    3600
}

/// Standalone listener settings for the development binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8189".to_string()
}
