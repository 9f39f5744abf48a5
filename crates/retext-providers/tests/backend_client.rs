//! Integration tests for the backend client against a mocked upstream.
//!
//! Retries run with `RetryConfig::immediate()` so exhausting the attempt
//! budget does not wait on real backoff delays.

use futures::StreamExt;
use retext_config::BackendConfig;
use retext_providers::{
    BackendClient, BackendError, ChatMessage, CompletionOptions, ErrorCategory, ErrorKind,
    OverallStatus, ProbeStatus, RetryConfig,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "sk-test-key-123456";

fn client() -> BackendClient {
    BackendClient::new()
        .unwrap()
        .with_retry(RetryConfig::immediate())
}

fn backend(server: &MockServer) -> BackendConfig {
    BackendConfig::new(format!("{}/v1", server.uri()), API_KEY, "gpt-test")
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

// ============================================================================
// complete
// ============================================================================

#[tokio::test]
async fn test_complete_sends_model_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "temperature": 0.5,
            "max_tokens": 64,
            "stream": false,
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  polished  ")))
        .expect(1)
        .mount(&server)
        .await;

    let options = CompletionOptions {
        temperature: Some(0.5),
        max_tokens: Some(64),
    };
    let text = client()
        .complete(&[ChatMessage::user("hello")], &backend(&server), &options)
        .await
        .unwrap();

    assert_eq!(text, "polished");
}

#[tokio::test]
async fn test_server_errors_use_the_full_attempt_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client()
        .complete(
            &[ChatMessage::user("hello")],
            &backend(&server),
            &CompletionOptions::default(),
        )
        .await
        .unwrap_err();

    let classification = err.classification().unwrap();
    assert_eq!(classification.kind, ErrorKind::Server);
    assert_eq!(classification.category, ErrorCategory::ServerError);
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.detail(), "upstream exploded");
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client()
        .complete(
            &[ChatMessage::user("hello")],
            &backend(&server),
            &CompletionOptions::default(),
        )
        .await
        .unwrap_err();

    let classification = err.classification().unwrap();
    assert_eq!(classification.kind, ErrorKind::Auth);
    assert_eq!(classification.category, ErrorCategory::InvalidToken);
    assert!(err.detail().contains("Incorrect API key provided"));
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("third time")))
        .expect(1)
        .mount(&server)
        .await;

    let text = client()
        .complete(
            &[ChatMessage::user("hello")],
            &backend(&server),
            &CompletionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(text, "third time");
}

#[tokio::test]
async fn test_incomplete_backend_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = backend(&server);
    config.api_key = String::new();

    let err = client()
        .complete(&[ChatMessage::user("hello")], &config, &CompletionOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Configuration(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_missing_content_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client()
        .complete(
            &[ChatMessage::user("hello")],
            &backend(&server),
            &CompletionOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Decode { .. }));
}

#[tokio::test]
async fn test_refused_connection_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = BackendConfig::new(format!("http://127.0.0.1:{port}/v1"), API_KEY, "gpt-test");
    let err = client()
        .complete(&[ChatMessage::user("hello")], &config, &CompletionOptions::default())
        .await
        .unwrap_err();

    let classification = err.classification().unwrap();
    assert_eq!(classification.kind, ErrorKind::Network);
    assert_eq!(classification.category, ErrorCategory::ConnectionRefused);
}

// ============================================================================
// passthrough and streaming
// ============================================================================

#[tokio::test]
async fn test_forward_completion_returns_upstream_json() {
    let server = MockServer::start().await;
    let upstream = json!({
        "id": "chatcmpl-9",
        "choices": [{"message": {"role": "assistant", "content": "hi"}}],
        "usage": {"total_tokens": 7}
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4", "user": "abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upstream))
        .expect(1)
        .mount(&server)
        .await;

    let body = json!({
        "model": "gpt-4",
        "user": "abc",
        "messages": [{"role": "user", "content": "hi"}]
    });
    let value = client()
        .forward_completion(&body, &backend(&server))
        .await
        .unwrap();

    assert_eq!(value, upstream);
}

#[tokio::test]
async fn test_open_stream_retries_until_headers_arrive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .expect(1)
        .mount(&server)
        .await;

    let body = json!({"model": "gpt-test", "stream": true, "messages": []});
    let response = client().open_stream(&body, &backend(&server)).await.unwrap();

    let mut collected = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(String::from_utf8(collected).unwrap(), sse);
}

#[tokio::test]
async fn test_open_stream_times_out_waiting_for_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = backend(&server).with_timeout_ms(100);
    let body = json!({"model": "gpt-test", "stream": true, "messages": []});
    let err = client().open_stream(&body, &config).await.unwrap_err();

    let classification = err.classification().unwrap();
    assert_eq!(classification.kind, ErrorKind::Network);
    assert_eq!(classification.category, ErrorCategory::Timeout);
}

// ============================================================================
// models, connection test and diagnostics
// ============================================================================

fn models_body() -> serde_json::Value {
    json!({
        "object": "list",
        "data": [
            {"id": "gpt-test", "object": "model", "created": 1, "owned_by": "test"},
            {"id": "gpt-other", "object": "model", "created": 2, "owned_by": "test"}
        ]
    })
}

#[tokio::test]
async fn test_list_models_and_availability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(models_body()))
        .mount(&server)
        .await;

    let client = client();
    let config = backend(&server);

    let ids: Vec<String> = client
        .list_models(&config)
        .await
        .unwrap()
        .data
        .into_iter()
        .map(|model| model.id)
        .collect();
    assert_eq!(ids, vec!["gpt-test".to_string(), "gpt-other".to_string()]);
    assert!(client.model_available("gpt-other", &config).await.unwrap());
    assert!(!client.model_available("gpt-missing", &config).await.unwrap());
}

#[tokio::test]
async fn test_connection_success_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(models_body()))
        .mount(&server)
        .await;

    let result = client().test_connection(&backend(&server)).await;
    assert!(result.success);
    assert_eq!(result.model_available, Some(true));
    assert!(result.classification.is_none());

    let mut unlisted = backend(&server);
    unlisted.model_id = "gpt-missing".to_string();
    let result = client().test_connection(&unlisted).await;
    assert!(result.success);
    assert_eq!(result.model_available, Some(false));
    assert!(result.message.contains("gpt-missing"));

    let failing = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&failing)
        .await;

    let result = client().test_connection(&backend(&failing)).await;
    assert!(!result.success);
    assert!(result.model_available.is_none());
    let classification = result.classification.unwrap();
    assert_eq!(classification.kind, ErrorKind::Auth);
    assert_eq!(classification.category, ErrorCategory::Forbidden);
    assert_eq!(result.message, classification.message);
    assert_eq!(result.suggestions.len(), 3);
}

#[tokio::test]
async fn test_diagnostics_all_probes_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(models_body()))
        .mount(&server)
        .await;

    let report = client().diagnostics(&backend(&server)).await;

    assert_eq!(report.tests.config.status, ProbeStatus::Passed);
    // No HEAD mock: the 404 still proves the origin is reachable.
    let network = report.tests.network.unwrap();
    assert_eq!(network.status, ProbeStatus::Passed);
    assert_eq!(network.status_code, Some(404));
    assert_eq!(report.tests.authentication.unwrap().status, ProbeStatus::Passed);
    let models = report.tests.models.unwrap();
    assert_eq!(models.model_count, Some(2));
    assert_eq!(report.overall.status, OverallStatus::Passed);
    assert_eq!(report.config.api_key_length, API_KEY.len());
}

#[tokio::test]
async fn test_diagnostics_probes_run_once_and_report_partial() {
    let server = MockServer::start().await;
    // authentication and models probe: one call each, no retries
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let report = client().diagnostics(&backend(&server)).await;

    let auth = report.tests.authentication.unwrap();
    assert_eq!(auth.status, ProbeStatus::Failed);
    assert_eq!(auth.error_type, Some(ErrorKind::Auth));
    assert_eq!(auth.suggestions.len(), 3);
    assert_eq!(report.tests.models.unwrap().status, ProbeStatus::Failed);
    assert_eq!(report.overall.status, OverallStatus::Partial);
    assert_eq!(report.overall.message, "Some checks passed (2/4)");
}
