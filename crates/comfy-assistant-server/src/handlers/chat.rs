use super::{ApiResult, json_event};
use crate::AppState;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, header};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use comfy_assistant_protocol::{ChatReply, ChatRequest, StreamChunk};
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, future};
use log::warn;
use std::convert::Infallible;

const DONE: &str = "[DONE]";

/// Origin of the calling host, used for relative image paths.
fn host_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| format!("http://{host}"))
}

fn with_host(mut request: ChatRequest, headers: &HeaderMap) -> ChatRequest {
    if request.host_url.is_none() {
        request.host_url = host_url(headers);
    }
    request
}

pub(crate) async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let Json(request) = body?;
    let reply = state.chat(with_host(request, &headers)).await?;
    Ok(Json(reply))
}

/// `data: {"content": ...}` per delta, `data: {"error": ...}` on failure,
/// then `data: [DONE]`. Failures are reported inside the stream.
pub(crate) async fn stream_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Sse<KeepAliveStream<BoxStream<'static, Result<Event, Infallible>>>> {
    let error_event = |error: String| json_event(&StreamChunk::Error { error });
    let events: BoxStream<'static, Event> = match body {
        Err(rejection) => stream::once(future::ready(error_event(rejection.body_text()))).boxed(),
        Ok(Json(request)) => match state.stream_chat(with_host(request, &headers)).await {
            Ok(deltas) => deltas
                .map(move |delta| match delta {
                    Ok(content) => json_event(&StreamChunk::Content { content }),
                    Err(err) => {
                        warn!("stream chat failed mid-stream (err={err})");
                        error_event(err.to_string())
                    }
                })
                .boxed(),
            Err(err) => {
                warn!("stream chat rejected (err={err})");
                stream::once(future::ready(error_event(err.to_string()))).boxed()
            }
        },
    };
    let events = events
        .chain(stream::once(future::ready(Event::default().data(DONE))))
        .map(Ok)
        .boxed();
    Sse::new(events).keep_alive(KeepAlive::default())
}
