//! Request and response bodies of the HTTP surface.
//!
//! Admin bodies accept both camelCase (what the settings UI sends) and
//! snake_case field names.

use retext_config::{
    BackendConfig, ModelAliasTable, OptimizationPolicy, RetextConfig, ServerSettings,
    TelemetryConfig, WrapTags,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound OpenAI-compatible chat-completion request.
///
/// Only the fields the proxy acts on are typed; everything else is kept in
/// `extra` and forwarded untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub messages: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Body sent upstream: the caller's request with `model` replaced.
    pub fn into_upstream_body(mut self, model: String) -> Value {
        self.model = Some(model);
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Admin bodies
// ============================================================================

/// `POST /api/config`: sections present replace the stored ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub server: Option<ServerSettings>,
    #[serde(default)]
    pub api: Option<BackendConfig>,
    #[serde(default, alias = "textOptimization")]
    pub text_optimization: Option<OptimizationPolicy>,
    #[serde(default)]
    pub logging: Option<TelemetryConfig>,
    #[serde(default, alias = "modelAliases")]
    pub model_aliases: Option<ModelAliasTable>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.server.is_none()
            && self.api.is_none()
            && self.text_optimization.is_none()
            && self.logging.is_none()
            && self.model_aliases.is_none()
    }

    pub fn apply_to(self, config: &mut RetextConfig) {
        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(api) = self.api {
            config.api = api;
        }
        if let Some(policy) = self.text_optimization {
            config.text_optimization = policy;
        }
        if let Some(logging) = self.logging {
            config.logging = logging;
        }
        if let Some(aliases) = self.model_aliases {
            config.model_aliases = aliases;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasCreate {
    #[serde(default, alias = "customName")]
    pub custom_name: String,
    #[serde(default, alias = "actualModel")]
    pub actual_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasUpdate {
    #[serde(default, alias = "actualModel")]
    pub actual_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: Option<WrapTags>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    pub level: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStatus {
    pub has_api_key: bool,
    pub secondary_has_api_key: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
