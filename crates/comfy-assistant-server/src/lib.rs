//! HTTP surface of the assistant.
//!
//! Every route lives under [`ROUTE_PREFIX`] and answers JSON (or server-sent
//! events for the streaming routes). Failures use one envelope,
//! `{"success": false, "error": "..."}`, produced by [`ApiError`].

mod error;
mod handlers;

pub use error::ApiError;

use axum::Router;
use axum::routing::{get, post};
use comfy_assistant_core::Assistant;
use std::sync::Arc;

/// Path prefix shared by every route.
pub const ROUTE_PREFIX: &str = "/comfy_ai_assistant";

/// Shared handler state.
pub type AppState = Arc<Assistant>;

/// Build the router with every assistant route mounted under [`ROUTE_PREFIX`].
pub fn router(assistant: AppState) -> Router {
    let api = Router::new()
        // History
        .route("/history", get(handlers::history::get_history))
        .route("/save_history", post(handlers::history::save_history))
        .route("/clear_history", post(handlers::history::clear_history))
        .route("/sessions", get(handlers::history::sessions))
        // Chat
        .route("/chat", post(handlers::chat::chat))
        .route("/stream_chat", post(handlers::chat::stream_chat))
        // Backends and saved settings
        .route("/services", get(handlers::services::services))
        .route("/models", get(handlers::services::models))
        .route("/config", get(handlers::services::get_config))
        .route("/save_config", post(handlers::services::save_config))
        // Prompts
        .route("/get_prompts", get(handlers::prompts::get_prompts))
        .route("/get_prompt", get(handlers::prompts::get_prompt))
        .route("/set_prompt", post(handlers::prompts::set_prompt))
        .route("/delete_prompt", post(handlers::prompts::delete_prompt))
        // Local media
        .route("/cmd_win_ffmpeg", post(handlers::media::run_ffmpeg))
        .route("/ffmpeg_run_win", post(handlers::media::run_ffmpeg_stream))
        .route("/system_info", get(handlers::media::system_info))
        .with_state(assistant);
    Router::new().nest(ROUTE_PREFIX, api)
}
