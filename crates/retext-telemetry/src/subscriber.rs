use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::buffer::{BufferLayer, LogBuffer, DEFAULT_BUFFER_SIZE};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default, alias = "jsonOutput")]
    pub json_output: bool,

    #[serde(default = "default_true", alias = "enableConsole")]
    pub enable_console: bool,

    /// JSON-lines copy of every event, appended to this file when set
    #[serde(default, alias = "filePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Entries kept in memory for the admin API
    #[serde(default = "default_buffer_size", alias = "bufferSize")]
    pub buffer_size: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_output: false,
            enable_console: true,
            file_path: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Install the global subscriber and return the log ring it feeds.
///
/// `RUST_LOG` wins over `config.level` when set.
pub fn init_subscriber(config: &TelemetryConfig) -> Result<LogBuffer, TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let buffer = LogBuffer::new(config.buffer_size);

    let file_layer = match &config.file_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|source| TelemetryError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| TelemetryError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let console_plain = (config.enable_console && !config.json_output).then(fmt::layer);
    let console_json = (config.enable_console && config.json_output).then(|| fmt::layer().json());

    tracing_subscriber::registry()
        .with(filter)
        .with(BufferLayer::new(buffer.clone()))
        .with(console_plain)
        .with(console_json)
        .with(file_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    Ok(buffer)
}
