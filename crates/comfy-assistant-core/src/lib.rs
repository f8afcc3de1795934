//! Core of the chat assistant.
//!
//! This crate owns the [`Assistant`] facade, the prompt library, saved backend
//! settings, and rendering of replies into chat-panel HTML.

mod assistant;
pub mod error;
pub mod prompts;
pub mod render;
pub mod settings;

pub use assistant::Assistant;
pub use error::AssistantError;
pub use prompts::{
    ContextProvider, DEFAULT_PROMPT_ID, PromptEntry, PromptIndex, PromptLibrary, ResponseHandler,
};
pub use settings::{DISABLED, SettingsStore};
