//! HTTP client for OpenAI-compatible backends

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use retext_config::BackendConfig;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendResult, ErrorCategory, ErrorClassification, ErrorKind};
use crate::error_classify::{classify_reqwest, classify_status};
use crate::response_handling::parse_error_body;
use crate::retry::{with_retry, RetryConfig};
use crate::traits::ChatBackend;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionOptions, ModelList};

/// Timeout for `GET {base}/models` outside of diagnostics.
pub const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

/// Stateless client; the backend to talk to is passed on every call so the
/// primary and secondary backends can share one connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    /// Whether the configured model is listed; unknown when listing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ErrorClassification>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl BackendClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("retext/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    fn post(&self, backend: &BackendConfig, path: &str) -> RequestBuilder {
        self.http
            .post(backend.endpoint(path))
            .bearer_auth(&backend.api_key)
    }

    /// Single chat-completion call returning the trimmed assistant text.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        backend: &BackendConfig,
        options: &CompletionOptions,
    ) -> BackendResult<String> {
        backend.ensure_complete()?;

        let request = &ChatCompletionRequest {
            model: &backend.model_id,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let response: ChatCompletionResponse =
            with_retry(&self.retry, "chat completion", move || async move {
                let response = send_checked(
                    self.post(backend, "chat/completions")
                        .timeout(backend.timeout())
                        .json(request),
                )
                .await?;
                response.json().await.map_err(classify_reqwest)
            })
            .await?;

        let text = response
            .first_text()
            .ok_or_else(|| BackendError::decode("completion response carried no message content"))?;

        info!(model = %backend.model_id, chars = text.len(), "Chat completion succeeded");
        Ok(text.trim().to_string())
    }

    /// Forward a caller's chat-completion body as-is and return the upstream JSON.
    pub async fn forward_completion(
        &self,
        body: &Value,
        backend: &BackendConfig,
    ) -> BackendResult<Value> {
        backend.ensure_complete()?;

        let value: Value = with_retry(&self.retry, "forward completion", move || async move {
            let response = send_checked(
                self.post(backend, "chat/completions")
                    .timeout(backend.timeout())
                    .json(body),
            )
            .await?;
            response.json().await.map_err(classify_reqwest)
        })
        .await?;

        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&backend.model_id);
        info!(model, "Upstream completion succeeded");
        Ok(value)
    }

    /// Open a streaming completion and hand back the live response.
    ///
    /// The backend timeout bounds the wait for response headers only; the body
    /// may stream for as long as the upstream keeps it open.
    pub async fn open_stream(&self, body: &Value, backend: &BackendConfig) -> BackendResult<Response> {
        backend.ensure_complete()?;
        let timeout = backend.timeout();

        let response = with_retry(&self.retry, "open stream", move || async move {
            let send = self.post(backend, "chat/completions").json(body).send();
            match tokio::time::timeout(timeout, send).await {
                Ok(result) => check_status(result.map_err(classify_reqwest)?).await,
                Err(_) => Err(BackendError::Transport {
                    classification: ErrorClassification::new(ErrorCategory::Timeout),
                    detail: format!("no response headers within {} ms", timeout.as_millis()),
                }),
            }
        })
        .await?;

        info!(model = %backend.model_id, "Upstream stream opened");
        Ok(response)
    }

    /// `GET {base}/models` under the retry policy.
    pub async fn list_models(&self, backend: &BackendConfig) -> BackendResult<ModelList> {
        backend.ensure_complete()?;

        let list = with_retry(&self.retry, "list models", move || {
            self.fetch_models(backend, MODELS_TIMEOUT)
        })
        .await?;

        info!(count = list.data.len(), "Models retrieved");
        Ok(list)
    }

    /// One `GET {base}/models` attempt with an explicit timeout.
    pub async fn fetch_models(
        &self,
        backend: &BackendConfig,
        timeout: Duration,
    ) -> BackendResult<ModelList> {
        let response = send_checked(
            self.http
                .get(backend.endpoint("models"))
                .bearer_auth(&backend.api_key)
                .timeout(timeout),
        )
        .await?;
        response.json().await.map_err(classify_reqwest)
    }

    /// Whether the upstream models listing contains `model`.
    pub async fn model_available(&self, model: &str, backend: &BackendConfig) -> BackendResult<bool> {
        let list = self.list_models(backend).await?;
        let found = list.data.iter().any(|entry| entry.id == model);
        if !found {
            debug!(model, "Model not listed by upstream");
        }
        Ok(found)
    }

    /// Check reachability and credentials by listing models, and whether the
    /// configured model is among them.
    pub async fn test_connection(&self, backend: &BackendConfig) -> ConnectionTestResult {
        match self.model_available(&backend.model_id, backend).await {
            Ok(available) => {
                info!(
                    base_url = %backend.base_url_trimmed(),
                    model = %backend.model_id,
                    available,
                    "Connection test succeeded"
                );
                let message = if available {
                    "Connection test succeeded".to_string()
                } else {
                    format!(
                        "Connection test succeeded, but model {} is not listed by the backend",
                        backend.model_id
                    )
                };
                ConnectionTestResult {
                    success: true,
                    message,
                    model_available: Some(available),
                    classification: None,
                    suggestions: Vec::new(),
                }
            }
            Err(err) => {
                warn!(
                    base_url = %backend.base_url_trimmed(),
                    model = %backend.model_id,
                    detail = %err.detail(),
                    "Connection test failed"
                );
                let message = match err.classification() {
                    Some(classification) => classification.message.clone(),
                    None => err.to_string(),
                };
                ConnectionTestResult {
                    success: false,
                    message,
                    model_available: None,
                    classification: err.classification().cloned(),
                    suggestions: err.suggestions(),
                }
            }
        }
    }
}

#[async_trait]
impl ChatBackend for BackendClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        backend: &BackendConfig,
        options: &CompletionOptions,
    ) -> BackendResult<String> {
        BackendClient::complete(self, messages, backend, options).await
    }
}

/// Three remediation hints for a failure kind.
pub fn suggestions(kind: ErrorKind) -> Vec<String> {
    kind.suggestions().iter().map(|s| s.to_string()).collect()
}

async fn send_checked(request: RequestBuilder) -> BackendResult<Response> {
    let response = request.send().await.map_err(classify_reqwest)?;
    check_status(response).await
}

async fn check_status(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = parse_error_body(response).await;
    Err(BackendError::Status {
        classification: classify_status(status.as_u16()),
        status: status.as_u16(),
        detail,
    })
}
