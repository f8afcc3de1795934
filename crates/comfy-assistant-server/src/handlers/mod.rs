pub(crate) mod chat;
pub(crate) mod history;
pub(crate) mod media;
pub(crate) mod prompts;
pub(crate) mod services;

use crate::ApiError;
use axum::response::sse::Event;
use serde::Serialize;

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// SSE event whose data is `payload` as JSON.
pub(crate) fn json_event<T: Serialize>(payload: &T) -> Event {
    Event::default().data(serde_json::to_string(payload).unwrap_or_default())
}
