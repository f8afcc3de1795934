use super::ApiResult;
use crate::{ApiError, AppState};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceQuery {
    #[serde(default)]
    service: Option<String>,
}

pub(crate) async fn services(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "success": true, "services": state.services() }))
}

pub(crate) async fn models(
    State(state): State<AppState>,
    query: Result<Query<ServiceQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let models = state.models(query.service.as_deref()).await?;
    Ok(Json(json!({ "success": true, "models": models })))
}

/// Selected service, the service list and its masked parameters.
pub(crate) async fn get_config(
    State(state): State<AppState>,
    query: Result<Query<ServiceQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (service, params) = state.config_view(query.service.as_deref())?;
    Ok(Json(json!({
        "success": true,
        "config": {
            "service": service,
            "services": state.services(),
            "ai_params": params,
        }
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveConfigBody {
    service: String,
    #[serde(default)]
    ai_params: Map<String, Value>,
}

pub(crate) async fn save_config(
    State(state): State<AppState>,
    body: Result<Json<SaveConfigBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    if body.service.trim().is_empty() {
        return Err(ApiError::bad_request("service is required"));
    }
    let params = state.save_config(&body.service, &body.ai_params)?;
    Ok(Json(json!({ "success": true, "ai_params": params })))
}
