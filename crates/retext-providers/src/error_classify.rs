//! Classification of failed upstream attempts.
//!
//! Status codes map onto categories through a fixed table. Transport failures
//! (no response at all) are sorted by walking the `reqwest` error's source
//! chain looking for refused connections, timeouts and resolver failures.

use crate::error::{BackendError, ErrorCategory, ErrorClassification};
use std::error::Error as StdError;
use std::io;

/// Classify an HTTP status received from the upstream.
pub fn classify_status(status: u16) -> ErrorClassification {
    let category = match status {
        401 => ErrorCategory::InvalidToken,
        403 => ErrorCategory::Forbidden,
        429 => ErrorCategory::TooManyRequests,
        s if s >= 500 => ErrorCategory::ServerError,
        400..=499 => ErrorCategory::BadRequest,
        _ => ErrorCategory::UnknownError,
    };
    ErrorClassification::new(category)
}

/// What could be learned about a request that never got a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportFailure {
    pub refused: bool,
    pub timed_out: bool,
    pub dns: bool,
}

impl TransportFailure {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let mut failure = Self {
            timed_out: err.is_timeout(),
            ..Self::default()
        };

        let mut source: Option<&(dyn StdError + 'static)> = err.source();
        while let Some(cause) = source {
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::ConnectionRefused => failure.refused = true,
                    io::ErrorKind::TimedOut => failure.timed_out = true,
                    _ => {}
                }
            }
            failure.absorb_message(&cause.to_string());
            source = cause.source();
        }

        failure
    }

    fn absorb_message(&mut self, message: &str) {
        let message = message.to_ascii_lowercase();
        if message.contains("connection refused") {
            self.refused = true;
        }
        if message.contains("timed out") {
            self.timed_out = true;
        }
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
        {
            self.dns = true;
        }
    }

    pub fn classify(self) -> ErrorClassification {
        let category = if self.refused {
            ErrorCategory::ConnectionRefused
        } else if self.timed_out {
            ErrorCategory::Timeout
        } else if self.dns {
            ErrorCategory::DnsError
        } else {
            ErrorCategory::UnknownNetwork
        };
        ErrorClassification::new(category)
    }
}

/// Turn a `reqwest` error from `send()` or a body read into a [`BackendError`].
pub fn classify_reqwest(err: reqwest::Error) -> BackendError {
    if err.is_decode() {
        return BackendError::decode(err.to_string());
    }
    if let Some(status) = err.status() {
        return BackendError::Status {
            classification: classify_status(status.as_u16()),
            status: status.as_u16(),
            detail: err.to_string(),
        };
    }
    BackendError::Transport {
        classification: TransportFailure::from_reqwest(&err).classify(),
        detail: error_chain(&err),
    }
}

/// Error message with its causes joined by `: `.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
