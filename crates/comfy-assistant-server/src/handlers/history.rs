use super::ApiResult;
use crate::AppState;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use comfy_assistant_history::{AssistantTurn, MessageId, Record, RecordKind, UserTurn};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default)]
    from_id: MessageId,
    #[serde(default)]
    limit: Option<usize>,
}

pub(crate) async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let page = state.history_page(query.from_id, query.limit).await?;
    Ok(Json(json!({
        "success": true,
        "records": page.records,
        "has_more": page.has_more,
        "next_id": page.next_id,
    })))
}

/// A record as posted by the panel; `message_id` 0 or absent asks for a new id.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordBody {
    #[serde(default)]
    message_id: MessageId,
    #[serde(rename = "type", default)]
    kind: RecordKind,
    user: UserTurn,
    #[serde(default)]
    assistant: AssistantTurn,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SaveHistoryBody {
    Wrapped { history: RecordBody },
    Bare(RecordBody),
}

pub(crate) async fn save_history(
    State(state): State<AppState>,
    body: Result<Json<SaveHistoryBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let (SaveHistoryBody::Wrapped { history: body } | SaveHistoryBody::Bare(body)) = body;
    let record = Record {
        message_id: body.message_id,
        kind: body.kind,
        user: body.user,
        assistant: body.assistant,
    };
    let saved = state.save_record(record).await?;
    Ok(Json(json!({ "success": true, "message_id": saved.message_id })))
}

pub(crate) async fn clear_history(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.clear_history().await?;
    Ok(Json(json!({ "success": true, "message": "history cleared" })))
}

/// Only one conversation exists.
pub(crate) async fn sessions() -> Json<Value> {
    Json(json!({ "success": true, "sessions": ["default"] }))
}
