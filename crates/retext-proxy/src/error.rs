//! HTTP error mapping.
//!
//! Every failure leaves the server as an OpenAI-style envelope:
//! `{"error": {"message", "type", "code", "suggestions"}}`. Upstream bodies
//! and credentials stay in the log; callers only see the classified message.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use retext_config::ConfigError;
use retext_providers::{suggestions, BackendError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{message}")]
    BadRequest {
        message: String,
        suggestions: Vec<String>,
    },
}

impl ProxyError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let (message, error_type, code, suggestions) = match self {
            Self::Backend(BackendError::Configuration(err)) => (
                err.to_string(),
                "configuration",
                "incomplete_backend",
                suggestions(ErrorKind::Unknown),
            ),
            Self::Backend(err) => match err.classification() {
                Some(classification) => (
                    classification.message.clone(),
                    classification.kind.as_str(),
                    classification.category.as_str(),
                    classification.suggestions(),
                ),
                None => (err.to_string(), "unknown", "unknown_error", err.suggestions()),
            },
            Self::Config(err @ ConfigError::AliasNotFound(_)) => {
                (err.to_string(), "not_found", "alias_not_found", Vec::new())
            }
            Self::Config(err @ (ConfigError::Invalid { .. } | ConfigError::IncompleteBackend { .. })) => {
                (err.to_string(), "invalid_request", "invalid_config", Vec::new())
            }
            Self::Config(err) => (err.to_string(), "configuration", "config_io", Vec::new()),
            Self::BadRequest {
                message,
                suggestions,
            } => (message.clone(), "invalid_request", "bad_request", suggestions.clone()),
        };

        ErrorEnvelope {
            error: ErrorBody {
                message,
                error_type: error_type.to_string(),
                code: code.to_string(),
                suggestions,
            },
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Backend(BackendError::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::Config(ConfigError::AliasNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Config(ConfigError::Invalid { .. } | ConfigError::IncompleteBackend { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.envelope())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub suggestions: Vec<String>,
}
