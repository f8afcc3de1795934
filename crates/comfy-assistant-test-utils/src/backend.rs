//! In-process stub of the model backends served over real HTTP.
//!
//! Mimics the OpenAI-compatible G4F relay (`/v1/models`,
//! `/v1/chat/completions`) and the DashScope generation endpoint, recording
//! every request it receives.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Path of the DashScope generation endpoint served by the stub.
pub const DASHSCOPE_PATH: &str = "/api/v1/services/aigc/text-generation/generation";

/// What the stub answers with.
#[derive(Debug, Clone)]
pub struct StubBehavior {
    /// Full reply for non-streaming calls.
    pub reply: String,
    /// Deltas emitted by streaming calls.
    pub chunks: Vec<String>,
    /// Model ids listed by `/v1/models`; `None` makes the listing fail.
    pub models: Option<Vec<String>>,
    /// Status for chat calls; anything but 200 returns an error body.
    pub status: u16,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            reply: "stub reply".to_string(),
            chunks: vec!["stub ".to_string(), "reply".to_string()],
            models: Some(vec!["gpt-4o-mini".to_string(), "gpt-4".to_string()]),
            status: 200,
        }
    }
}

/// One request captured by the stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub sse_header: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    behavior: Arc<StubBehavior>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Running stub server; aborted on drop.
pub struct StubBackend {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl StubBackend {
    /// Bind an ephemeral local port and start serving.
    pub async fn spawn(behavior: StubBehavior) -> std::io::Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            behavior: Arc::new(behavior),
            requests: Arc::clone(&requests),
        };
        let app = Router::new()
            .route("/v1/models", get(list_models))
            .route("/v1/chat/completions", post(chat_completions))
            .route(DASHSCOPE_PATH, post(dashscope_generation))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            base_url: format!("http://{addr}"),
            requests,
            handle,
        })
    }

    /// Root URL, e.g. `http://127.0.0.1:PORT`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// OpenAI-compatible base (`{base_url}/v1`).
    pub fn openai_base(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    /// Full DashScope endpoint URL.
    pub fn dashscope_endpoint(&self) -> String {
        format!("{}{}", self.base_url, DASHSCOPE_PATH)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn record(state: &StubState, path: &str, headers: &HeaderMap, body: &Bytes) -> Value {
    let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().push(RecordedRequest {
        path: path.to_string(),
        authorization: header_value("authorization"),
        sse_header: header_value("x-dashscope-sse"),
        body: body.clone(),
    });
    body
}

fn failure(status: u16) -> Option<Response> {
    if status == 200 {
        return None;
    }
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Some((status, "stub failure").into_response())
}

fn event_stream(events: Vec<Value>, done_marker: bool) -> Response {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {event}\n\n"));
    }
    if done_marker {
        body.push_str("data: [DONE]\n\n");
    }
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn list_models(State(state): State<StubState>) -> Response {
    match &state.behavior.models {
        Some(models) => {
            let data: Vec<Value> = models
                .iter()
                .map(|id| json!({ "id": id, "object": "model" }))
                .collect();
            axum::Json(json!({ "object": "list", "data": data })).into_response()
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, "models offline").into_response(),
    }
}

async fn chat_completions(
    State(state): State<StubState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = record(&state, "/v1/chat/completions", &headers, &body);
    if let Some(response) = failure(state.behavior.status) {
        return response;
    }
    if body["stream"].as_bool() == Some(true) {
        let events = state
            .behavior
            .chunks
            .iter()
            .map(|chunk| json!({ "choices": [{ "index": 0, "delta": { "content": chunk } }] }))
            .collect();
        return event_stream(events, true);
    }
    axum::Json(json!({
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": state.behavior.reply }
        }]
    }))
    .into_response()
}

async fn dashscope_generation(
    State(state): State<StubState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, DASHSCOPE_PATH, &headers, &body);
    if let Some(response) = failure(state.behavior.status) {
        return response;
    }
    let streaming = headers
        .get("x-dashscope-sse")
        .and_then(|value| value.to_str().ok())
        == Some("enable");
    if streaming {
        let events = state
            .behavior
            .chunks
            .iter()
            .map(|chunk| json!({ "output": { "text": chunk, "finish_reason": "null" } }))
            .collect();
        return event_stream(events, false);
    }
    axum::Json(json!({
        "output": { "text": state.behavior.reply, "finish_reason": "stop" },
        "request_id": "stub"
    }))
    .into_response()
}
