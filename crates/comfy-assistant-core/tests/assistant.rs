use comfy_assistant_config::ServicesConfig;
use comfy_assistant_core::{
    Assistant, AssistantError, DEFAULT_PROMPT_ID, PromptEntry, PromptLibrary, ResponseHandler,
    SettingsStore,
};
use comfy_assistant_history::{HistoryStore, JsonlHistoryStore};
use comfy_assistant_media::FfmpegRunner;
use comfy_assistant_protocol::ChatRequest;
use comfy_assistant_services::{Backends, G4fBackend, QianwenBackend};
use comfy_assistant_test_utils::{StubBackend, StubBehavior, sample_record};
use futures_util::TryStreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    assistant: Assistant,
    stub: StubBackend,
    _temp: TempDir,
}

async fn harness(behavior: StubBehavior) -> Harness {
    let stub = StubBackend::spawn(behavior).await.expect("stub");
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let history = Arc::new(JsonlHistoryStore::open(root).expect("history"));
    let settings = SettingsStore::open(root, ServicesConfig::default()).expect("settings");
    let backends = Backends::new(
        G4fBackend::new(stub.openai_base(), root),
        QianwenBackend::with_endpoint(stub.dashscope_endpoint()),
    );
    let assistant = Assistant::from_parts(
        history,
        PromptLibrary::open(root),
        settings,
        backends,
        FfmpegRunner::new("ffmpeg", Duration::from_secs(5)),
        20,
    );
    Harness {
        assistant,
        stub,
        _temp: temp,
    }
}

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        ..ChatRequest::default()
    }
}

#[tokio::test]
async fn chat_stores_exchange_with_prompt() {
    let h = harness(StubBehavior::default()).await;
    let reply = h
        .assistant
        .chat(ChatRequest {
            prompt_id: Some(DEFAULT_PROMPT_ID.to_string()),
            ..request("build me a workflow")
        })
        .await
        .expect("chat");
    assert!(reply.success);
    assert_eq!(reply.message_id, Some(1));
    assert_eq!(reply.response, "<p>stub reply</p>\n");

    let stored = h.assistant.history().get(1).expect("get").expect("record");
    assert_eq!(stored.user.content, "build me a workflow");
    assert_eq!(stored.user.prompt_id.as_deref(), Some(DEFAULT_PROMPT_ID));
    assert_eq!(stored.assistant.content, "stub reply");

    let body = &h.stub.requests()[0].body;
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["messages"][0]["content"]
        .as_str()
        .is_some_and(|content| content.contains("comfyui")));
}

#[tokio::test]
async fn chat_replays_recent_history() {
    let h = harness(StubBehavior::default()).await;
    for (id, content) in [(1, "one"), (2, "two"), (3, "three")] {
        h.assistant
            .save_record(sample_record(id, content))
            .await
            .expect("save");
    }
    h.assistant
        .chat(ChatRequest {
            history: 2,
            ..request("four")
        })
        .await
        .expect("chat");

    let body = &h.stub.requests()[0].body;
    assert_eq!(
        body["messages"],
        json!([
            { "role": "user", "content": "two" },
            { "role": "assistant", "content": "reply to two" },
            { "role": "user", "content": "three" },
            { "role": "assistant", "content": "reply to three" },
            { "role": "user", "content": "four" },
        ])
    );
}

#[tokio::test]
async fn workflow_prompt_renders_widget() {
    let h = harness(StubBehavior {
        reply: r#"<title>Decode</title><workflow>{"1": {"class_type": "VAEDecode"}}</workflow>"#
            .to_string(),
        ..StubBehavior::default()
    })
    .await;
    h.assistant
        .prompts()
        .save(
            PromptEntry {
                prompt_id: "graphs".to_string(),
                prompt_name: "Graphs".to_string(),
                prompt_content_path: "graphs.ini".to_string(),
                prompt_fun: Some(ResponseHandler::Workflow),
                prompt_run: None,
            },
            "You build graphs.",
        )
        .expect("save prompt");

    let reply = h
        .assistant
        .chat(ChatRequest {
            prompt_id: Some("graphs".to_string()),
            system_prompt: Some("Override".to_string()),
            ..request("decode it")
        })
        .await
        .expect("chat");
    assert!(reply.response.contains(r#"data-action="load-workflow""#));
    assert!(reply.response.contains("Decode_"));

    let body = &h.stub.requests()[0].body;
    assert_eq!(body["messages"][0]["content"], "Override");
    let stored = h.assistant.history().get(1).expect("get").expect("record");
    assert_eq!(stored.user.prompt_name.as_deref(), Some("Graphs"));
}

#[tokio::test]
async fn input_errors_are_reported_before_sending() {
    let h = harness(StubBehavior::default()).await;

    let err = h
        .assistant
        .chat(ChatRequest {
            service: Some("openai".to_string()),
            ..request("hi")
        })
        .await
        .unwrap_err();
    assert!(err.is_input_error());

    let err = h
        .assistant
        .chat(ChatRequest {
            history: 500,
            ..request("hi")
        })
        .await
        .unwrap_err();
    assert!(err.is_input_error());

    let err = h.assistant.chat(request("   ")).await.unwrap_err();
    assert!(matches!(err, AssistantError::InvalidInput(_)));

    let err = h
        .assistant
        .chat(ChatRequest {
            prompt_id: Some("missing".to_string()),
            ..request("hi")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::PromptNotFound(id) if id == "missing"));

    assert!(h.stub.requests().is_empty());
}

#[tokio::test]
async fn empty_reply_is_not_stored() {
    let h = harness(StubBehavior {
        reply: String::new(),
        ..StubBehavior::default()
    })
    .await;
    let err = h.assistant.chat(request("hi")).await.unwrap_err();
    assert!(matches!(err, AssistantError::EmptyReply(_)));
    assert_eq!(h.assistant.history().last_message_id().expect("last"), 0);
}

#[tokio::test]
async fn stream_chat_yields_deltas_without_recording() {
    let h = harness(StubBehavior::default()).await;
    let stream = h.assistant.stream_chat(request("hi")).await.expect("stream");
    let chunks: Vec<String> = stream.try_collect().await.expect("collect");
    assert_eq!(chunks, vec!["stub ".to_string(), "reply".to_string()]);
    assert_eq!(h.assistant.history().last_message_id().expect("last"), 0);
}

#[tokio::test]
async fn saved_config_selects_backend() {
    let h = harness(StubBehavior::default()).await;
    let params = json!({ "api_key": "sk-test", "model": "qwen-plus" });
    let params = params.as_object().expect("object");
    h.assistant.save_config("qianwen", params).expect("save");

    let (service, view) = h.assistant.config_view(None).expect("view");
    assert_eq!(service.as_str(), "qianwen");
    assert_eq!(view["api_base"], "disabled");
    assert_eq!(view["api_key"], "sk-test");

    h.assistant.chat(request("hi")).await.expect("chat");
    let requests = h.stub.requests();
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-test"));
}

#[tokio::test]
async fn history_pages_use_configured_size() {
    let h = harness(StubBehavior::default()).await;
    let first = h
        .assistant
        .save_record(sample_record(0, "one"))
        .await
        .expect("save");
    assert_eq!(first.message_id, 1);
    let page = h.assistant.history_page(0, None).await.expect("page");
    assert_eq!(page.records.len(), 1);
    assert!(h
        .assistant
        .history_page(0, Some(0))
        .await
        .unwrap_err()
        .is_input_error());

    h.assistant.clear_history().await.expect("clear");
    assert!(h
        .assistant
        .history_page(0, None)
        .await
        .expect("page")
        .records
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_saves_get_distinct_ids() {
    let h = harness(StubBehavior::default()).await;
    let saves = (0..8).map(|n| h.assistant.save_record(sample_record(0, &format!("m{n}"))));
    let mut ids: Vec<_> = futures_util::future::join_all(saves)
        .await
        .into_iter()
        .map(|saved| saved.expect("save").message_id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=8).collect::<Vec<_>>());

    let page = h.assistant.history_page(0, Some(8)).await.expect("page");
    assert_eq!(page.records.len(), 8);
}
