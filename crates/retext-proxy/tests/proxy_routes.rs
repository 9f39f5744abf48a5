//! Front-door tests: the proxy routes against a mocked upstream.

use actix_web::{http::StatusCode, test, web, App};
use retext_config::{BackendConfig, ConfigStore, ModelAliasTable, RetextConfig};
use retext_providers::{BackendClient, RetryConfig};
use retext_proxy::{configure, AppState};
use retext_telemetry::LogBuffer;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "sk-test-key-123456";

fn state(server: &MockServer, aliases: ModelAliasTable) -> AppState {
    let config = RetextConfig {
        api: BackendConfig::new(format!("{}/v1", server.uri()), API_KEY, "gpt-test"),
        model_aliases: aliases,
        ..RetextConfig::default()
    };
    let client = BackendClient::new()
        .unwrap()
        .with_retry(RetryConfig::immediate());
    AppState::new(Arc::new(ConfigStore::new(config)), client, LogBuffer::new(100))
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
    })
}

/// Mock for the forwarded completion, told apart from rewrite calls by model.
async fn mount_completion(server: &MockServer, model: &str, content: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": model})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .expect(times)
        .mount(server)
        .await;
}

fn chat_request(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "write something"}],
        "stream": stream,
        "temperature": 0.3
    })
}

#[actix_rt::test]
async fn test_health() {
    let server = MockServer::start().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, ModelAliasTable::new())))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}

#[actix_rt::test]
async fn test_buffered_completion_rewrites_spans_for_alias() {
    let server = MockServer::start().await;
    // forwarded request carries the resolved model
    mount_completion(&server, "gpt-4", "Hello <|text|>world<|/text|> bye", 1).await;
    // span rewrite goes to the primary backend's model
    mount_completion(&server, "gpt-test", "WORLD", 1).await;

    let aliases: ModelAliasTable = [("gpt-custom", "gpt-4")].into_iter().collect();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, aliases)))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(chat_request("gpt-custom", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Hello <|text|>WORLD<|/text|> bye"
    );
    assert_eq!(body["usage"]["total_tokens"], 12);
}

#[actix_rt::test]
async fn test_untagged_response_passes_through_under_proxy_prefix() {
    let server = MockServer::start().await;
    mount_completion(&server, "gpt-unknown", "plain answer", 1).await;
    mount_completion(&server, "gpt-test", "never used", 0).await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, ModelAliasTable::new())))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/proxy/v1/chat/completions")
        .set_json(chat_request("gpt-unknown", false))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["choices"][0]["message"]["content"], "plain answer");
}

#[actix_rt::test]
async fn test_failed_rewrite_keeps_original_span() {
    let server = MockServer::start().await;
    mount_completion(&server, "gpt-4", "<|text|>draft<|/text|>", 1).await;
    // 400 is not retried
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-test"})))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, ModelAliasTable::new())))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(chat_request("gpt-4", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["choices"][0]["message"]["content"], "<|text|>draft<|/text|>");
}

#[actix_rt::test]
async fn test_streaming_is_piped_verbatim() {
    let server = MockServer::start().await;
    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"<|text|>hi<|/text|>\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4", "stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .expect(1)
        .mount(&server)
        .await;

    let aliases: ModelAliasTable = [("gpt-custom", "gpt-4")].into_iter().collect();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, aliases)))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(chat_request("gpt-custom", true))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers.get("content-type").unwrap(), "text/event-stream");
    assert_eq!(headers.get("cache-control").unwrap(), "no-cache");
    assert_eq!(headers.get("connection").unwrap(), "keep-alive");

    let body = test::read_body(resp).await;
    assert_eq!(body, sse.as_bytes());
}

#[actix_rt::test]
async fn test_upstream_server_error_is_retried_then_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal detail sk-leak"))
        .expect(3)
        .mount(&server)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, ModelAliasTable::new())))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(chat_request("gpt-4", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "server");
    assert_eq!(body["error"]["code"], "server_error");
    assert_eq!(body["error"]["suggestions"].as_array().unwrap().len(), 3);
    assert!(!body.to_string().contains("sk-leak"));
}

#[actix_rt::test]
async fn test_upstream_auth_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, ModelAliasTable::new())))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(chat_request("gpt-4", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "auth");
    assert_eq!(body["error"]["code"], "invalid_token");
}

#[actix_rt::test]
async fn test_missing_api_key_fails_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = state(&server, ModelAliasTable::new());
    let mut config = state.config.snapshot();
    config.api.api_key = String::new();
    let state = AppState::new(
        Arc::new(ConfigStore::new(config)),
        state.client.clone(),
        state.logs.clone(),
    );

    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .set_json(chat_request("gpt-4", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "configuration");
}

#[actix_rt::test]
async fn test_models_listing_merges_aliases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"id": "gpt-4", "object": "model", "created": 1, "owned_by": "openai"},
                {"id": "gpt-custom", "object": "model", "created": 2, "owned_by": "openai"}
            ]
        })))
        .mount(&server)
        .await;

    let aliases: ModelAliasTable = [("gpt-custom", "gpt-4"), ("writer", "gpt-4")]
        .into_iter()
        .collect();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&server, aliases)))
            .configure(configure),
    )
    .await;

    for uri in ["/v1/models", "/proxy/v1/models"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["gpt-4", "gpt-custom", "writer"]);
        assert_eq!(body["data"][2]["owned_by"], "custom");
        assert_eq!(body["object"], "list");
    }
}
