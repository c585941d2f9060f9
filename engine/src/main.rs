// Switchyard adaptive request dispatcher
// Main entry point for the switchyard binary

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use switchyard_engine::cli::{Cli, Command};
use switchyard_engine::config::Config;
use switchyard_engine::dispatcher::Dispatcher;
use switchyard_engine::handlers::{
    handle_chat, handle_classify, handle_config, handle_models, handle_route, handle_run,
    OutputFormat,
};
use switchyard_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let (config, config_path) = match &cli.config {
        Some(path) => (
            Config::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            path.clone(),
        ),
        None => (
            Config::load_or_create().context("Failed to load config")?,
            Config::default_config_path()?,
        ),
    };

    // --log wins over the config; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("Switchyard v{} ({} - {})", version, commit, timestamp);

    let dispatcher = Arc::new(Dispatcher::from_config(&config));

    match cli.command {
        Command::Run { text, model } => handle_run(dispatcher, text, model, format).await,
        Command::Chat { model } => handle_chat(dispatcher, model, format).await,
        Command::Classify { text } => handle_classify(&dispatcher, &text, format),
        Command::Route { text, model } => {
            handle_route(&dispatcher, &text, model.as_deref(), format).await
        }
        Command::Models => handle_models(&dispatcher, format).await,
        Command::Config { action } => handle_config(action, &config, &config_path, format),
    }
}
