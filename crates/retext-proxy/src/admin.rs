//! Admin API mounted under `/api`.
//!
//! Backend bodies posted here may carry the masked key placeholder returned
//! by `GET /api/config`; it is swapped for the key of the stored backend the
//! body points at before use.

use crate::{
    error::ProxyError,
    optimizer::TextOptimizer,
    server::AppState,
    types::{Ack, AliasCreate, AliasUpdate, ApiKeyStatus, ConfigUpdate, LogsQuery, OptimizeRequest},
};
use actix_web::{web, HttpResponse};
use retext_config::{BackendConfig, ConfigProvider, MASKED_SECRET};
use retext_providers::{suggestions, ErrorKind};
use serde_json::json;
use tracing::{info, warn};

const DEFAULT_LOG_LIMIT: usize = 100;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/config", web::get().to(get_config))
        .route("/config", web::post().to(update_config))
        .route("/config/api-key-status", web::get().to(api_key_status))
        .route("/model-aliases", web::get().to(list_aliases))
        .route("/model-aliases", web::post().to(add_alias))
        .route("/model-aliases/{name}", web::put().to(update_alias))
        .route("/model-aliases/{name}", web::delete().to(remove_alias))
        .route("/models", web::get().to(primary_models))
        .route("/models", web::post().to(backend_models))
        .route("/test-connection", web::post().to(test_connection))
        .route("/diagnostics", web::post().to(diagnostics))
        .route("/validate-config", web::post().to(validate_config))
        .route("/optimize", web::post().to(optimize))
        .route("/logs", web::get().to(get_logs))
        .route("/logs", web::delete().to(clear_logs));
}

/// Ad-hoc backend from a request body, with a masked key restored.
///
/// The key comes from the stored backend with the same base URL and model,
/// else the same base URL, else the primary.
fn ad_hoc_backend(state: &AppState, body: web::Json<BackendConfig>) -> BackendConfig {
    let mut backend = body.into_inner();
    if backend.api_key != MASKED_SECRET {
        return backend;
    }

    let config = state.config.snapshot();
    let stored: Vec<&BackendConfig> = std::iter::once(&config.api)
        .chain(config.text_optimization.secondary_backend.as_ref())
        .collect();
    let same_url = |s: &&&BackendConfig| s.base_url_trimmed() == backend.base_url_trimmed();
    let source = stored
        .iter()
        .filter(same_url)
        .find(|s| s.model_id == backend.model_id)
        .or_else(|| stored.iter().find(same_url))
        .copied()
        .unwrap_or(&config.api);

    backend.unmask_from(source);
    backend
}

// ============================================================================
// Configuration
// ============================================================================

async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.config.masked())
}

async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<ConfigUpdate>,
) -> Result<HttpResponse, ProxyError> {
    let update = body.into_inner();
    if update.is_empty() {
        return Err(ProxyError::bad_request("no configuration sections given"));
    }

    let mut next = state.config.snapshot();
    update.apply_to(&mut next);
    state
        .config
        .replace(next)
        .inspect_err(|err| warn!(error = %err, "Configuration update rejected"))?;

    info!("Configuration updated");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Configuration saved",
        "config": state.config.masked(),
    })))
}

async fn api_key_status(state: web::Data<AppState>) -> HttpResponse {
    let config = state.config.snapshot();
    let has_api_key = config.api.has_api_key();
    let secondary_has_api_key = config
        .text_optimization
        .secondary_backend
        .as_ref()
        .is_some_and(BackendConfig::has_api_key);

    HttpResponse::Ok().json(ApiKeyStatus {
        has_api_key,
        secondary_has_api_key,
        message: if has_api_key {
            "API key configured".to_string()
        } else {
            "API key not configured".to_string()
        },
    })
}

// ============================================================================
// Model aliases
// ============================================================================

async fn list_aliases(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.config.aliases())
}

async fn add_alias(
    state: web::Data<AppState>,
    body: web::Json<AliasCreate>,
) -> Result<HttpResponse, ProxyError> {
    let AliasCreate {
        custom_name,
        actual_model,
    } = body.into_inner();
    state.config.add_alias(&custom_name, &actual_model)?;

    info!(alias = %custom_name, model = %actual_model, "Model alias added");
    Ok(HttpResponse::Created().json(Ack::ok(format!(
        "alias {custom_name} -> {actual_model} added"
    ))))
}

async fn update_alias(
    state: web::Data<AppState>,
    name: web::Path<String>,
    body: web::Json<AliasUpdate>,
) -> Result<HttpResponse, ProxyError> {
    let name = name.into_inner();
    let actual_model = body.into_inner().actual_model;
    state.config.update_alias(&name, &actual_model)?;

    info!(alias = %name, model = %actual_model, "Model alias updated");
    Ok(HttpResponse::Ok().json(Ack::ok(format!("alias {name} -> {actual_model} updated"))))
}

async fn remove_alias(
    state: web::Data<AppState>,
    name: web::Path<String>,
) -> Result<HttpResponse, ProxyError> {
    let name = name.into_inner();
    state.config.remove_alias(&name)?;

    info!(alias = %name, "Model alias removed");
    Ok(HttpResponse::Ok().json(Ack::ok(format!("alias {name} removed"))))
}

// ============================================================================
// Backend checks
// ============================================================================

async fn primary_models(state: web::Data<AppState>) -> Result<HttpResponse, ProxyError> {
    let backend = state.config.effective_config().primary_backend;
    if !backend.has_api_key() {
        return Err(ProxyError::BadRequest {
            message: "API key not configured".to_string(),
            suggestions: suggestions(ErrorKind::Auth),
        });
    }

    let list = state.client.list_models(&backend).await?;
    Ok(HttpResponse::Ok().json(list))
}

async fn backend_models(
    state: web::Data<AppState>,
    body: web::Json<BackendConfig>,
) -> Result<HttpResponse, ProxyError> {
    let backend = ad_hoc_backend(&state, body);
    let list = state.client.list_models(&backend).await?;
    Ok(HttpResponse::Ok().json(list))
}

async fn test_connection(
    state: web::Data<AppState>,
    body: web::Json<BackendConfig>,
) -> HttpResponse {
    let backend = ad_hoc_backend(&state, body);
    HttpResponse::Ok().json(state.client.test_connection(&backend).await)
}

async fn diagnostics(state: web::Data<AppState>, body: web::Json<BackendConfig>) -> HttpResponse {
    let backend = ad_hoc_backend(&state, body);
    HttpResponse::Ok().json(state.client.diagnostics(&backend).await)
}

async fn validate_config(body: web::Json<BackendConfig>) -> HttpResponse {
    HttpResponse::Ok().json(body.validate())
}

// ============================================================================
// Optimization
// ============================================================================

async fn optimize(
    state: web::Data<AppState>,
    body: web::Json<OptimizeRequest>,
) -> Result<HttpResponse, ProxyError> {
    let OptimizeRequest { text, tags, prompt } = body.into_inner();
    if text.trim().is_empty() {
        return Err(ProxyError::bad_request("text is required"));
    }

    let effective = state.config.effective_config();
    let mut policy = effective.optimization_policy;
    if let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) {
        policy.prompt = prompt;
    }

    let optimizer = TextOptimizer::new(&state.client);
    let outcome = match tags {
        Some(tags) => {
            policy.wrap_tags = tags;
            let pass = optimizer
                .rewrite_spans(&text, &policy, &effective.primary_backend)
                .await;
            pass.into_outcome(text)
        }
        None => {
            optimizer
                .optimize_whole_text(&text, &policy, &effective.primary_backend)
                .await
        }
    };

    Ok(HttpResponse::Ok().json(outcome))
}

// ============================================================================
// Logs
// ============================================================================

async fn get_logs(state: web::Data<AppState>, query: web::Query<LogsQuery>) -> HttpResponse {
    let LogsQuery { level, limit } = query.into_inner();
    let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT);

    let (entries, total) = match level.as_deref().filter(|l| !l.is_empty()) {
        Some(level) => {
            let mut entries = state.logs.by_level(level);
            let total = entries.len();
            if total > limit {
                entries.drain(..total - limit);
            }
            (entries, total)
        }
        None => (state.logs.recent(limit), state.logs.len()),
    };

    HttpResponse::Ok().json(json!({
        "logs": entries,
        "total": total,
    }))
}

async fn clear_logs(state: web::Data<AppState>) -> HttpResponse {
    state.logs.clear();
    info!("Log buffer cleared");
    HttpResponse::Ok().json(Ack::ok("logs cleared"))
}
