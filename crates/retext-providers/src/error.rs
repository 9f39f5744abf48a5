//! Backend error types

use retext_config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse failure class; decides whether a call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Auth,
    RateLimit,
    Server,
    Client,
    Unknown,
}

impl ErrorKind {
    /// An invalid key or malformed request fails the same way every time.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Auth | Self::Client)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::Client => "client",
            Self::Unknown => "unknown",
        }
    }

    /// Remediation hints shown next to a failure of this kind.
    pub fn suggestions(self) -> &'static [&'static str] {
        match self {
            Self::Auth => &[
                "Check that the API key is correct",
                "Make sure the API key has not expired",
                "Verify the API key has sufficient permissions",
            ],
            Self::Network => &[
                "Check that the network connection is working",
                "Confirm the API server address is correct",
                "Check firewall and proxy settings",
            ],
            Self::RateLimit => &[
                "Reduce the request rate",
                "Wait a while and try again",
                "Consider upgrading the API plan",
            ],
            Self::Server => &[
                "Wait for the API server to recover",
                "Check the provider's status page",
                "Contact the API provider",
            ],
            Self::Client => &[
                "Check that the request parameters are correct",
                "Confirm the API endpoint URL is correct",
                "Verify the request payload format",
            ],
            Self::Unknown => &[
                "Check all configuration parameters",
                "Review the detailed logs",
                "Contact technical support",
            ],
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained failure code reported alongside the [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ConnectionRefused,
    Timeout,
    DnsError,
    UnknownNetwork,
    InvalidToken,
    Forbidden,
    TooManyRequests,
    ServerError,
    BadRequest,
    UnknownError,
}

impl ErrorCategory {
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::ConnectionRefused | Self::Timeout | Self::DnsError | Self::UnknownNetwork => {
                ErrorKind::Network
            }
            Self::InvalidToken | Self::Forbidden => ErrorKind::Auth,
            Self::TooManyRequests => ErrorKind::RateLimit,
            Self::ServerError => ErrorKind::Server,
            Self::BadRequest => ErrorKind::Client,
            Self::UnknownError => ErrorKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection_refused",
            Self::Timeout => "timeout",
            Self::DnsError => "dns_error",
            Self::UnknownNetwork => "unknown_network",
            Self::InvalidToken => "invalid_token",
            Self::Forbidden => "forbidden",
            Self::TooManyRequests => "too_many_requests",
            Self::ServerError => "server_error",
            Self::BadRequest => "bad_request",
            Self::UnknownError => "unknown_error",
        }
    }

    fn user_message(self) -> &'static str {
        match self {
            Self::ConnectionRefused => {
                "Could not connect to the API server; check the network connection and server status"
            }
            Self::Timeout => {
                "The request timed out; check the network connection or increase the timeout"
            }
            Self::DnsError => {
                "Could not resolve the API server address; check that the URL is correct"
            }
            Self::UnknownNetwork => "Network error; check the network connection",
            Self::InvalidToken => {
                "The API key is invalid or expired; check the API key configuration"
            }
            Self::Forbidden => "Access was denied; check the API key permissions",
            Self::TooManyRequests => "Too many requests; try again later",
            Self::ServerError => "The API server returned an error; try again later",
            Self::BadRequest => "The request was rejected; check the configuration parameters",
            Self::UnknownError => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorClassification {
    pub fn new(category: ErrorCategory) -> Self {
        Self {
            kind: category.kind(),
            category,
            message: category.user_message().to_string(),
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.kind
            .suggestions()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.kind, self.category)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// Raised before any network I/O.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// No HTTP response was received.
    #[error("{classification}")]
    Transport {
        classification: ErrorClassification,
        detail: String,
    },

    /// The upstream answered with a non-success status.
    #[error("{classification}")]
    Status {
        classification: ErrorClassification,
        status: u16,
        detail: String,
    },

    /// The upstream answered 2xx but the body was not what we expected.
    #[error("{classification}")]
    Decode {
        classification: ErrorClassification,
        detail: String,
    },
}

impl BackendError {
    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode {
            classification: ErrorClassification {
                kind: ErrorKind::Unknown,
                category: ErrorCategory::UnknownError,
                message: "The API server returned an unreadable response".to_string(),
            },
            detail: detail.into(),
        }
    }

    /// `None` for configuration errors, which never reach the network.
    pub fn classification(&self) -> Option<&ErrorClassification> {
        match self {
            Self::Configuration(_) => None,
            Self::Transport { classification, .. }
            | Self::Status { classification, .. }
            | Self::Decode { classification, .. } => Some(classification),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.classification().map(|c| c.kind)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_some_and(ErrorKind::is_retryable)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Internal detail for logs; never sent to callers.
    pub fn detail(&self) -> String {
        match self {
            Self::Configuration(e) => e.to_string(),
            Self::Transport { detail, .. }
            | Self::Status { detail, .. }
            | Self::Decode { detail, .. } => detail.clone(),
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self.classification() {
            Some(classification) => classification.suggestions(),
            None => ErrorKind::Unknown
                .suggestions()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
