use super::{ApiResult, json_event};
use crate::{ApiError, AppState};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use comfy_assistant_protocol::StreamChunk;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, future};
use log::warn;
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Deserialize)]
pub(crate) struct CommandBody {
    #[serde(default)]
    cmd: String,
}

fn command(body: Result<Json<CommandBody>, JsonRejection>) -> ApiResult<String> {
    let Json(body) = body?;
    let cmd = body.cmd.trim();
    if cmd.is_empty() {
        return Err(ApiError::bad_request("cmd cannot be empty"));
    }
    Ok(cmd.to_string())
}

/// Run the command to completion and return the analysed report.
pub(crate) async fn run_ffmpeg(
    State(state): State<AppState>,
    body: Result<Json<CommandBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let cmd = command(body)?;
    let report = state.run_ffmpeg(&cmd).await?;
    Ok(Json(json!({ "success": true, "result": report })))
}

/// Progress events while the command runs, then the result event.
/// The command is validated before the stream starts.
pub(crate) async fn run_ffmpeg_stream(
    State(state): State<AppState>,
    body: Result<Json<CommandBody>, JsonRejection>,
) -> ApiResult<Sse<KeepAliveStream<BoxStream<'static, Result<Event, Infallible>>>>> {
    let cmd = command(body)?;
    let runner = state.ffmpeg().clone();
    runner
        .parse(&cmd)
        .map_err(comfy_assistant_core::AssistantError::from)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move { runner.run_with_progress(&cmd, tx).await });
    let progress = UnboundedReceiverStream::new(rx).map(|event| json_event(&event));
    let failure = stream::once(async move {
        let error = match handle.await {
            Ok(Ok(_)) => return None,
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        warn!("ffmpeg run failed (err={error})");
        Some(json_event(&StreamChunk::Error { error }))
    })
    .filter_map(future::ready);
    let events = progress.chain(failure).map(Ok).boxed();
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Host, GPU and FFmpeg build report, structured and as markdown.
pub(crate) async fn system_info(State(state): State<AppState>) -> Json<Value> {
    let report = state.system_report().await;
    Json(json!({
        "success": true,
        "markdown": report.to_markdown(),
        "system": report,
    }))
}
