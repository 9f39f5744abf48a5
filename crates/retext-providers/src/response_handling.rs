//! Shared utilities for handling upstream responses

use serde::Deserialize;

/// Read an error response body into a single log-friendly line.
///
/// OpenAI-style envelopes (`{"error": {"message", "type", "code"}}`) and flat
/// `{"message": ...}` bodies are summarized; anything else is returned raw.
pub async fn parse_error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) => summarize_error_body(&text),
        Err(_) => "Failed to read error response body".to_string(),
    }
}

pub fn summarize_error_body(text: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(text) {
        if let Some(error) = envelope.error {
            return error.to_string();
        }
    }
    if let Ok(error) = serde_json::from_str::<ErrorResponse>(text) {
        if error.error_message.is_some() || error.error_code.is_some() {
            return error.to_string();
        }
    }
    text.trim().to_string()
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorResponse>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "type")]
    error_type: Option<String>,
    #[serde(rename = "message")]
    error_message: Option<String>,
    #[serde(rename = "code")]
    error_code: Option<serde_json::Value>,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if let Some(code) = self.error_code.as_ref().filter(|c| !c.is_null()) {
            match code.as_str() {
                Some(code) => parts.push(format!("code: {}", code)),
                None => parts.push(format!("code: {}", code)),
            }
        }
        if let Some(error_type) = &self.error_type {
            parts.push(format!("type: {}", error_type));
        }
        if let Some(message) = &self.error_message {
            parts.push(format!("message: {}", message));
        }

        if parts.is_empty() {
            write!(f, "Unknown error")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}
