use super::*;
use comfy_assistant_protocol::ServiceId;
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

fn put(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("dir");
    fs::write(path, contents).expect("write");
}

#[test]
fn parse_minimal_config() {
    let config = AssistantConfig::load_from_str("{}").expect("config");
    assert_eq!(config.history.page_size, 20);
    assert_eq!(config.services.default, ServiceId::G4f);
    assert_eq!(config.services.g4f.api_base, crate::DEFAULT_G4F_API_BASE);
    assert_eq!(config.ffmpeg.program, "ffmpeg");
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = AssistantConfig::load_from_str(r#"{ unexpected: true }"#).unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

#[test]
fn rejects_unknown_service_default() {
    let err = AssistantConfig::load_from_str(r#"{ services: { default: "openai" } }"#)
        .unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("services.default"));
    assert!(msg.contains("openai"));
}

#[test]
fn rejects_out_of_range_page_size() {
    let err = AssistantConfig::load_from_str(r#"{ history: { page_size: 500 } }"#).unwrap_err();
    assert!(format!("{err}").contains("history.page_size"));
}

#[test]
fn rejects_wrongly_typed_backend_param() {
    let err = AssistantConfig::load_from_str(r#"{ services: { qianwen: { max_tokens: "lots" } } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("services.qianwen.max_tokens"));
}

#[test]
fn partial_backend_block_keeps_defaults() {
    let config =
        AssistantConfig::load_from_str(r#"{ services: { qianwen: { api_key: "sk-test" } } }"#)
            .expect("config");
    assert_eq!(config.services.qianwen.api_key, "sk-test");
    assert_eq!(config.services.qianwen.max_tokens, 2000);
    assert_eq!(config.services.qianwen.model, "");
}

#[test]
fn cwd_layer_overrides_user_layer() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    let cwd = root.join("work");
    fs::create_dir_all(&cwd).expect("cwd");

    let user_config = root.join("user.json5");
    put(
        &user_config,
        "{ history: { page_size: 10 }, server: { bind: \"0.0.0.0:9000\" } }",
    );
    put(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ history: { page_size: 30 } }",
    );

    let mut options = LayeredConfigOptions::new(&cwd);
    options.user_config_path = Some(user_config);

    let layered = AssistantConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.history.page_size, 30);
    assert_eq!(layered.config.server.bind, "0.0.0.0:9000");
    assert_eq!(layered.layers.len(), 2);
}

#[test]
fn runtime_override_wins() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();

    let user_config = root.join("user.json5");
    put(&user_config, "{ ffmpeg: { program: \"ffmpeg\", timeout_secs: 60 } }");
    let runtime_config = root.join("runtime.json5");
    put(&runtime_config, "{ ffmpeg: { timeout_secs: 5 } }");

    let mut options = LayeredConfigOptions::new(root).with_runtime_path(&runtime_config);
    options.user_config_path = Some(user_config);

    let layered = AssistantConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.ffmpeg.timeout_secs, 5);
    assert_eq!(
        layered.layers.last().map(|layer| layer.source),
        Some(ConfigLayerSource::Runtime)
    );
}

#[test]
fn missing_runtime_layer_is_an_error() {
    let temp = TempDir::new().expect("tempdir");
    let mut options =
        LayeredConfigOptions::new(temp.path()).with_runtime_path(temp.path().join("absent.json5"));
    options.user_config_path = None;
    let err = AssistantConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::MissingOverride(path) if path.ends_with("absent.json5")));
}

#[test]
fn invalid_layer_reports_its_label() {
    let temp = TempDir::new().expect("tempdir");
    let user_config = temp.path().join("user.json5");
    put(&user_config, "{ storage: { rooot: \"/tmp\" } }");
    let mut options = LayeredConfigOptions::new(temp.path());
    options.user_config_path = Some(user_config);
    let err = AssistantConfig::load_layered_with_options(options).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("user("));
    assert!(msg.contains("storage.rooot"));
}

#[test]
fn syntax_errors_name_the_layer() {
    let temp = TempDir::new().expect("tempdir");
    put(&temp.path().join(DEFAULT_CONFIG_FILE), "{ history: ");
    let mut options = LayeredConfigOptions::new(temp.path());
    options.user_config_path = None;
    let err = AssistantConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::Syntax { ref origin, .. } if origin.starts_with("cwd(")));
}

#[test]
fn user_file_in_cwd_is_read_once() {
    let temp = TempDir::new().expect("tempdir");
    let shared = temp.path().join(DEFAULT_CONFIG_FILE);
    put(&shared, "{ history: { page_size: 15 } }");
    let mut options = LayeredConfigOptions::new(temp.path());
    options.user_config_path = Some(shared);
    let layered = AssistantConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.layers.len(), 1);
    assert_eq!(layered.config.history.page_size, 15);
}
