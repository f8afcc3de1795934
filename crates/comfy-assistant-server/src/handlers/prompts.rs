use super::ApiResult;
use crate::{ApiError, AppState};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use comfy_assistant_core::{ContextProvider, PromptEntry, ResponseHandler};
use log::info;
use serde::Deserialize;
use serde_json::{Value, json};

/// Deleting this id resets the whole library.
const DELETE_ALL: &str = "all";

pub(crate) async fn get_prompts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let index = state.prompts().list()?;
    Ok(Json(json!({ "success": true, "prompts": index })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PromptQuery {
    #[serde(default)]
    prompt_id: Option<String>,
}

/// Prompt content, base64 encoded.
pub(crate) async fn get_prompt(
    State(state): State<AppState>,
    query: Result<Query<PromptQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let Some(prompt_id) = query.prompt_id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::bad_request("prompt_id is required"));
    };
    let content = state.prompts().content(&prompt_id)?;
    if content.is_empty() {
        return Err(ApiError::not_found(format!(
            "prompt content not found: {prompt_id}"
        )));
    }
    Ok(Json(json!({ "success": true, "content": STANDARD.encode(content) })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetPromptBody {
    #[serde(default)]
    prompt_id: String,
    #[serde(default)]
    prompt_name: String,
    #[serde(default)]
    prompt_content_path: String,
    /// Base64 encoded UTF-8 text.
    #[serde(default)]
    prompt_content: String,
    #[serde(default)]
    prompt_fun: Option<ResponseHandler>,
    #[serde(default)]
    prompt_run: Option<ContextProvider>,
}

pub(crate) async fn set_prompt(
    State(state): State<AppState>,
    body: Result<Json<SetPromptBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    if body.prompt_id.is_empty()
        || body.prompt_name.is_empty()
        || body.prompt_content_path.is_empty()
        || body.prompt_content.is_empty()
    {
        return Err(ApiError::bad_request(
            "prompt_id, prompt_name, prompt_content_path and prompt_content are required",
        ));
    }
    let content = STANDARD
        .decode(body.prompt_content.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| ApiError::bad_request("prompt_content is not base64 encoded UTF-8"))?;
    let entry = PromptEntry {
        prompt_id: body.prompt_id,
        prompt_name: body.prompt_name,
        prompt_content_path: body.prompt_content_path,
        prompt_fun: body.prompt_fun,
        prompt_run: body.prompt_run,
    };
    info!("saving prompt (prompt_id={})", entry.prompt_id);
    state.prompts().save(entry, &content)?;
    Ok(Json(json!({ "success": true, "message": "prompt saved" })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeletePromptBody {
    #[serde(default)]
    prompt_id: String,
}

pub(crate) async fn delete_prompt(
    State(state): State<AppState>,
    body: Result<Json<DeletePromptBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    match body.prompt_id.as_str() {
        "" => Err(ApiError::bad_request("prompt_id is required")),
        DELETE_ALL => {
            state.prompts().reset_all()?;
            Ok(Json(json!({ "success": true, "message": "all prompts reset" })))
        }
        prompt_id => {
            state.prompts().delete(prompt_id)?;
            Ok(Json(json!({ "success": true, "message": "prompt deleted" })))
        }
    }
}
