//! `retext-proxy` binary entrypoint.

use anyhow::{Context, Result};
use clap::Parser;
use retext_config::{
    apply_env_overrides, find_config_file, load_config_from_file, ConfigStore, RetextConfig,
};
use retext_providers::BackendClient;
use retext_proxy::{serve, AppState};
use retext_telemetry::init_subscriber;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "retext-proxy", version, about = "Rewriting proxy for OpenAI-compatible chat completions")]
struct Cli {
    /// Configuration file (JSON, JSONC or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit console logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().or_else(find_config_file);
    let resolved = path
        .as_deref()
        .map(load_config_from_file)
        .transpose()
        .context("failed to load configuration")?;

    let mut config = resolved
        .as_ref()
        .map(|r| r.config.clone())
        .unwrap_or_default();
    config = apply_cli_overrides(apply_env_overrides(config), &cli);

    let logs = init_subscriber(&config.logging).context("failed to initialize logging")?;

    match &resolved {
        Some(resolved) => info!(path = %resolved.path.display(), "Configuration loaded"),
        None => warn!("No configuration file found, using defaults"),
    }

    let report = config.validate();
    for warning in &report.warnings {
        warn!(warning = %warning, "configuration warning");
    }
    for error in &report.errors {
        warn!(error = %error, "configuration error");
    }
    if !config.api.has_api_key() {
        warn!("No API key configured; completions will fail until one is set via /api/config");
    }

    // overrides run in memory only; the file keeps what it was loaded with
    let store = match resolved {
        Some(resolved) => {
            ConfigStore::persisted(config, resolved.raw, resolved.path, resolved.format)
        }
        None => ConfigStore::new(config),
    };

    let client = BackendClient::new().context("failed to build HTTP client")?;
    serve(AppState::new(Arc::new(store), client, logs)).await
}

fn apply_cli_overrides(mut config: RetextConfig, cli: &Cli) -> RetextConfig {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json_output = true;
    }
    config
}
