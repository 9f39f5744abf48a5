//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backend configuration incomplete: missing {}", missing.join(", "))]
    IncompleteBackend { missing: Vec<&'static str> },

    #[error("invalid configuration: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },

    #[error("model alias not found: {0}")]
    AliasNotFound(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to serialize configuration: {0}")]
    Serialize(String),
}
