//! Actix Web HTTP server.
//!
//! Exposes OpenAI-compatible endpoints, both at the root and under `/proxy`:
//! - `POST /v1/chat/completions`
//! - `GET /v1/models`
//!
//! plus `GET /health` and the admin API under `/api` (see [`crate::admin`]).

use crate::{
    admin,
    error::ProxyError,
    models::merge_aliases,
    optimizer::TextOptimizer,
    streaming::PipeStream,
    types::ChatCompletionRequest,
};
use actix_cors::Cors;
use actix_web::{middleware::Condition, web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use retext_config::{BackendConfig, ConfigProvider, ConfigStore};
use retext_providers::BackendClient;
use retext_telemetry::LogBuffer;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub client: BackendClient,
    pub logs: LogBuffer,
}

impl AppState {
    pub fn new(config: Arc<ConfigStore>, client: BackendClient, logs: LogBuffer) -> Self {
        Self {
            config,
            client,
            logs,
        }
    }
}

/// Register every route; shared by [`serve`] and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .service(web::scope("/api").configure(admin::configure))
        .service(web::scope("/proxy").configure(proxy_routes))
        .configure(proxy_routes);
}

fn proxy_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/v1/chat/completions", web::post().to(chat_completions))
        .route("/v1/models", web::get().to(list_models));
}

pub async fn serve(state: AppState) -> Result<()> {
    let settings = state.config.snapshot().server;
    let addr = format!("{}:{}", settings.host, settings.port);
    info!(addr = %addr, cors = settings.enable_cors, "retext-proxy listening");

    let state = web::Data::new(state);
    let enable_cors = settings.enable_cors;

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Condition::new(enable_cors, Cors::permissive()))
            .configure(configure)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn chat_completions(
    state: web::Data<AppState>,
    body: web::Json<ChatCompletionRequest>,
) -> Result<HttpResponse, ProxyError> {
    let request = body.into_inner();
    let effective = state.config.effective_config();

    let requested = request
        .model
        .clone()
        .unwrap_or_else(|| effective.primary_backend.model_id.clone());
    let model = state.config.resolve_alias(&requested);
    if model != requested {
        info!(alias = %requested, model = %model, "Model alias resolved");
    }

    let stream = request.is_stream();
    debug!(model = %model, stream, messages = request.messages.len(), "Chat completion received");
    let upstream_body = request.into_upstream_body(model.clone());

    if stream {
        return stream_completion(&state, &upstream_body, &effective.primary_backend, model).await;
    }

    let mut response = state
        .client
        .forward_completion(&upstream_body, &effective.primary_backend)
        .await
        .inspect_err(|err| warn!(model = %model, detail = %err.detail(), "Upstream completion failed"))?;

    TextOptimizer::new(&state.client)
        .optimize_completion(
            &mut response,
            &effective.optimization_policy,
            &effective.primary_backend,
        )
        .await;

    Ok(HttpResponse::Ok().json(response))
}

async fn stream_completion(
    state: &AppState,
    body: &Value,
    backend: &BackendConfig,
    model: String,
) -> Result<HttpResponse, ProxyError> {
    let upstream = state
        .client
        .open_stream(body, backend)
        .await
        .inspect_err(|err| warn!(model = %model, detail = %err.detail(), "Upstream stream failed to open"))?;

    let stream = PipeStream::new(upstream.bytes_stream(), model);

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("cache-control", "no-cache"))
        .insert_header(("connection", "keep-alive"))
        .streaming(stream))
}

async fn list_models(state: web::Data<AppState>) -> Result<HttpResponse, ProxyError> {
    let backend = state.config.effective_config().primary_backend;
    let list = state
        .client
        .list_models(&backend)
        .await
        .inspect_err(|err| warn!(detail = %err.detail(), "Model listing failed"))?;

    let aliases = state.config.model_aliases();
    let merged = merge_aliases(list, &aliases, chrono::Utc::now().timestamp());
    Ok(HttpResponse::Ok().json(merged))
}
