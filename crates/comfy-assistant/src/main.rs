//! Standalone HTTP server for the assistant routes.

use anyhow::Context;
use clap::Parser;
use comfy_assistant::config::{AssistantConfig, LayeredConfigOptions};
use comfy_assistant::core::Assistant;
use comfy_assistant::init_logging;
use comfy_assistant::server::router;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Command-line options for the assistant server.
#[derive(Parser)]
#[command(name = "comfy-assistant", version)]
struct Cli {
    /// Extra comfy_assistant.json5 applied over the user and cwd layers
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overriding `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    info!(
        "starting assistant server (config_set={}, bind_set={})",
        cli.config.is_some(),
        cli.bind.is_some()
    );

    let cwd = std::env::current_dir().context("failed to resolve current working directory")?;
    let mut options = LayeredConfigOptions::new(&cwd);
    if let Some(path) = cli.config.as_ref() {
        options = options.with_runtime_path(path);
    }
    let layered = AssistantConfig::load_layered_with_options(options)
        .context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    let config = layered.config;
    config.validate().context("invalid config")?;

    let assistant = Assistant::open(&config).context("failed to open assistant storage")?;
    let app = router(Arc::new(assistant)).layer(TraceLayer::new_for_http());

    let bind = cli.bind.unwrap_or(config.server.bind);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening (addr={})", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "comfy-assistant",
            "--config",
            "local.json5",
            "--bind",
            "0.0.0.0:9000",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("local.json5")));
        assert_eq!(cli.bind.as_deref(), Some("0.0.0.0:9000"));
    }

    #[test]
    fn overrides_are_optional() {
        let cli = Cli::try_parse_from(["comfy-assistant"]).expect("parse");
        assert!(cli.config.is_none());
        assert!(cli.bind.is_none());
    }
}
