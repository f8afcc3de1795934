//! Backend-neutral description of one chat turn and its context.

use comfy_assistant_protocol::{ChatMessage, Record, Role};

/// Everything a backend needs to answer one user message.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    system_prompt: Option<String>,
    history: Vec<Record>,
    message: String,
    images: Vec<String>,
    host_url: Option<String>,
}

impl Conversation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Blank prompts are ignored.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// Prior exchanges, in any order; they are replayed oldest first.
    pub fn with_history(mut self, mut records: Vec<Record>) -> Self {
        records.sort_by_key(|record| record.message_id);
        self.history = records;
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Origin used to absolutize relative image paths.
    pub fn with_host_url(mut self, host_url: impl Into<String>) -> Self {
        self.host_url = Some(host_url.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn history(&self) -> &[Record] {
        &self.history
    }

    /// System prompt followed by one user/assistant pair per history record.
    pub fn prior_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() * 2 + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::new(Role::System, prompt.clone()));
        }
        for record in &self.history {
            messages.push(ChatMessage::new(Role::User, record.user.content.clone()));
            messages.push(ChatMessage::new(
                Role::Assistant,
                record.assistant.content.clone(),
            ));
        }
        messages
    }

    /// Attached images with relative paths resolved against the host origin.
    pub fn image_urls(&self) -> Vec<String> {
        self.images
            .iter()
            .map(|image| absolutize(image, self.host_url.as_deref()))
            .collect()
    }
}

fn absolutize(image: &str, host_url: Option<&str>) -> String {
    match host_url {
        Some(host) if !image.starts_with("http://") && !image.starts_with("https://") => {
            format!(
                "{}/{}",
                host.trim_end_matches('/'),
                image.trim_start_matches('/')
            )
        }
        _ => image.to_string(),
    }
}
