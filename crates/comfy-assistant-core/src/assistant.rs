//! Assistant facade: wires history, prompts, settings, backends and the
//! FFmpeg runner together and runs chat turns.

use crate::error::AssistantError;
use crate::prompts::{ContextProvider, PromptEntry, PromptLibrary};
use crate::render::render_reply;
use crate::settings::SettingsStore;
use comfy_assistant_config::AssistantConfig;
use comfy_assistant_history::{
    AssistantTurn, HistoryError, HistoryStore, JsonlHistoryStore, MessageId, Page, Record,
    UserTurn, validate_page_limit,
};
use comfy_assistant_media::{FfmpegReport, FfmpegRunner, SystemReport, inspect_system};
use comfy_assistant_protocol::{AiParams, ChatReply, ChatRequest, ModelInfo, ServiceId, ServiceInfo};
use comfy_assistant_services::{
    Backend, Backends, ChatBackend, Conversation, G4fBackend, QIANWEN_ENDPOINT, QianwenBackend,
    TextStream,
};
use log::{debug, info};
use serde_json::{Map, Value};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

/// Everything a turn needs before it is sent.
struct PreparedTurn<'a> {
    backend: &'a Backend,
    params: AiParams,
    conversation: Conversation,
    prompt: Option<PromptEntry>,
}

/// Main assistant facade shared by the HTTP routes.
pub struct Assistant {
    history: Arc<dyn HistoryStore>,
    prompts: PromptLibrary,
    settings: SettingsStore,
    backends: Backends,
    ffmpeg: FfmpegRunner,
    page_size: usize,
}

impl Assistant {
    /// Assemble an assistant from already-built parts.
    pub fn from_parts(
        history: Arc<dyn HistoryStore>,
        prompts: PromptLibrary,
        settings: SettingsStore,
        backends: Backends,
        ffmpeg: FfmpegRunner,
        page_size: usize,
    ) -> Self {
        Self {
            history,
            prompts,
            settings,
            backends,
            ffmpeg,
            page_size,
        }
    }

    /// Open every store under the configured storage root.
    pub fn open(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let root = config.storage.resolve_root().ok_or_else(|| {
            AssistantError::InvalidInput("storage root could not be resolved".to_string())
        })?;
        fs::create_dir_all(&root)?;
        info!("opening assistant storage (root={})", root.display());

        let history = Arc::new(JsonlHistoryStore::open(&root)?);
        let prompts = PromptLibrary::open(&root);
        let settings = SettingsStore::open(&root, config.services.clone())?;
        let qianwen_endpoint = match config.services.qianwen.api_base.trim() {
            "" => QIANWEN_ENDPOINT,
            endpoint => endpoint,
        };
        let backends = Backends::new(
            G4fBackend::new(config.services.g4f.api_base.clone(), &root),
            QianwenBackend::with_endpoint(qianwen_endpoint),
        );
        let ffmpeg = FfmpegRunner::new(
            config.ffmpeg.program.clone(),
            Duration::from_secs(config.ffmpeg.timeout_secs),
        );
        Ok(Self::from_parts(
            history,
            prompts,
            settings,
            backends,
            ffmpeg,
            config.history.page_size,
        ))
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn ffmpeg(&self) -> &FfmpegRunner {
        &self.ffmpeg
    }

    /// Run a history operation on the blocking pool; the store does
    /// synchronous file IO under its lock.
    async fn with_history<T, F>(&self, op: F) -> Result<T, AssistantError>
    where
        F: FnOnce(&dyn HistoryStore) -> Result<T, HistoryError> + Send + 'static,
        T: Send + 'static,
    {
        let history = Arc::clone(&self.history);
        Ok(tokio::task::spawn_blocking(move || op(history.as_ref())).await??)
    }

    /// Page of history; `limit` defaults to the configured page size.
    pub async fn history_page(
        &self,
        from_id: MessageId,
        limit: Option<usize>,
    ) -> Result<Page, AssistantError> {
        let limit = validate_page_limit(limit.unwrap_or(self.page_size))?;
        self.with_history(move |history| history.read_page(from_id, limit))
            .await
    }

    /// Store `record`, allocating an id when it carries none.
    pub async fn save_record(&self, mut record: Record) -> Result<Record, AssistantError> {
        self.with_history(move |history| {
            if record.message_id == 0 {
                record.message_id = history.next_id()?;
            }
            history.upsert(&record)?;
            Ok(record)
        })
        .await
    }

    pub async fn clear_history(&self) -> Result<(), AssistantError> {
        self.with_history(|history| history.reset()).await?;
        info!("history cleared");
        Ok(())
    }

    pub fn services(&self) -> Vec<ServiceInfo> {
        self.backends.infos()
    }

    /// Backend named by `service`, or the saved selection.
    pub fn backend(&self, service: Option<&str>) -> Result<&Backend, AssistantError> {
        match service.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Ok(self.backends.resolve(id)?),
            None => Ok(self.backends.get(self.settings.selected())),
        }
    }

    pub async fn models(&self, service: Option<&str>) -> Result<Vec<ModelInfo>, AssistantError> {
        Ok(self.backend(service)?.models().await?)
    }

    /// Backend id plus its parameters with unsupported ones masked.
    pub fn config_view(
        &self,
        service: Option<&str>,
    ) -> Result<(ServiceId, Map<String, Value>), AssistantError> {
        let backend = self.backend(service)?;
        let view = self
            .settings
            .view(backend.id(), backend.unsupported_features())?;
        Ok((backend.id(), view))
    }

    /// Select `service` and persist its parameters.
    pub fn save_config(
        &self,
        service: &str,
        params: &Map<String, Value>,
    ) -> Result<AiParams, AssistantError> {
        let backend = self.backends.resolve(service.trim())?;
        self.settings
            .save(backend.id(), params, backend.unsupported_features())
    }

    pub async fn run_ffmpeg(&self, command_line: &str) -> Result<FfmpegReport, AssistantError> {
        Ok(self.ffmpeg.run(command_line).await?)
    }

    pub async fn system_report(&self) -> SystemReport {
        inspect_system(self.ffmpeg.program()).await
    }

    /// Send one turn, store the exchange and render the reply.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply, AssistantError> {
        let turn = self.prepare(&request).await?;
        let reply = turn.backend.send(&turn.conversation, &turn.params).await?;
        if reply.trim().is_empty() {
            return Err(AssistantError::EmptyReply(turn.backend.id()));
        }

        let (prompt_id, prompt_name, handler) = match &turn.prompt {
            Some(entry) => (
                Some(entry.prompt_id.clone()),
                Some(entry.prompt_name.clone()),
                entry.prompt_fun,
            ),
            None => (None, None, None),
        };
        let user = UserTurn {
            content: request.message,
            images: request.images,
            prompt_name,
            prompt_id,
        };
        let assistant = AssistantTurn {
            content: reply.clone(),
            images: Vec::new(),
        };
        let record = self
            .with_history(move |history| history.append_exchange(user, assistant))
            .await?;
        info!(
            "chat turn stored (service={}, message_id={})",
            turn.backend.id(),
            record.message_id
        );
        Ok(ChatReply {
            success: true,
            response: render_reply(handler, &reply),
            message_id: Some(record.message_id),
        })
    }

    /// Stream reply deltas. Streamed turns are not written to history.
    pub async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, AssistantError> {
        let turn = self.prepare(&request).await?;
        Ok(turn.backend.stream(&turn.conversation, &turn.params).await?)
    }

    async fn prepare(&self, request: &ChatRequest) -> Result<PreparedTurn<'_>, AssistantError> {
        if request.message.trim().is_empty() && request.images.is_empty() {
            return Err(AssistantError::InvalidInput(
                "message cannot be empty".to_string(),
            ));
        }
        let backend = self.backend(request.service.as_deref())?;
        let params = apply_overrides(self.settings.params(backend.id()), request);

        let history = if request.history > 0 {
            let limit = validate_page_limit(request.history)?;
            self.with_history(move |history| history.read_page(0, limit))
                .await?
                .records
        } else {
            Vec::new()
        };

        let prompt = match request.prompt_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => Some(
                self.prompts
                    .entry(id)?
                    .ok_or_else(|| AssistantError::PromptNotFound(id.to_string()))?,
            ),
            None => None,
        };
        let mut system_prompt = match request.system_prompt.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => match &prompt {
                Some(entry) => self.prompts.content(&entry.prompt_id)?,
                None => String::new(),
            },
        };
        if let Some(ContextProvider::MediaEnvironment) = prompt.as_ref().and_then(|p| p.prompt_run)
        {
            let report = self.system_report().await;
            if !system_prompt.is_empty() {
                system_prompt.push_str("\n\n");
            }
            system_prompt.push_str(&report.to_markdown());
        }

        let mut conversation = Conversation::new(request.message.clone())
            .with_system_prompt(system_prompt)
            .with_history(history)
            .with_images(request.images.clone());
        if let Some(host_url) = request.host_url.as_deref() {
            conversation = conversation.with_host_url(host_url);
        }
        debug!(
            "prepared turn (service={}, model={}, history_len={})",
            backend.id(),
            params.model,
            conversation.history().len()
        );
        Ok(PreparedTurn {
            backend,
            params,
            conversation,
            prompt,
        })
    }
}

/// Request-level values take precedence over saved parameters.
fn apply_overrides(mut params: AiParams, request: &ChatRequest) -> AiParams {
    let text = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    if let Some(temperature) = request.temperature {
        params.temperature = temperature;
    }
    if let Some(max_tokens) = request.max_tokens {
        params.max_tokens = max_tokens;
    }
    if let Some(timeout) = request.timeout {
        params.timeout = timeout;
    }
    if let Some(model) = text(&request.model) {
        params.model = model;
    }
    if let Some(proxy) = text(&request.proxy) {
        params.proxy = proxy;
    }
    if let Some(api_key) = text(&request.api_key) {
        params.api_key = api_key;
    }
    params
}
