use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub use retext_telemetry::TelemetryConfig;

use crate::error::ConfigError;

/// Placeholder returned in place of stored API keys.
pub const MASKED_SECRET: &str = "******";

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Main retext configuration
///
/// Loaded from (in priority order):
/// 1. `retext.jsonc` - JSON with comments
/// 2. `retext.json` - Standard JSON
/// 3. `retext.yml` / `retext.yaml` - YAML format
///
/// Hidden variants (`.retext.*`) and `~/.config/retext/` are checked as well.
///
/// # Example
///
/// ```yaml
/// server:
///   port: 3000
/// api:
///   base_url: https://api.openai.com/v1
///   api_key: ${OPENAI_API_KEY}
///   model: gpt-4o-mini
/// text_optimization:
///   wrap_tags: ["<|text|>", "<|/text|>"]
///   prompt: "Polish the following passage without changing its meaning:"
/// model_aliases:
///   gpt-custom: gpt-4o
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetextConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Primary upstream backend
    #[serde(default)]
    pub api: BackendConfig,

    /// How wrapped spans are rewritten
    #[serde(default, alias = "textOptimization")]
    pub text_optimization: OptimizationPolicy,

    /// Log sink settings
    #[serde(default)]
    pub logging: TelemetryConfig,

    /// Custom model id -> real upstream model id
    #[serde(default, alias = "modelAliases")]
    pub model_aliases: ModelAliasTable,
}

/// Outcome of a configuration check. Errors block a save, warnings do not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

impl RetextConfig {
    /// Check every section; used once when a config enters the process.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let api = self.api.validate_stored();
        errors.extend(api.errors);
        warnings.extend(api.warnings);

        let policy = self.text_optimization.validate();
        errors.extend(policy.errors);
        warnings.extend(policy.warnings);

        if self.server.port == 0 {
            errors.push("server port must be between 1 and 65535".to_string());
        }

        for (custom, actual) in self.model_aliases.iter() {
            if custom.trim().is_empty() || actual.trim().is_empty() {
                errors.push(format!(
                    "model alias entries must not be empty ({custom:?} -> {actual:?})"
                ));
            }
        }

        ValidationReport::new(errors, warnings)
    }

    /// Copy with every API key replaced by [`MASKED_SECRET`].
    pub fn masked(&self) -> Self {
        let mut config = self.clone();
        config.api.mask_key();
        if let Some(secondary) = config.text_optimization.secondary_backend.as_mut() {
            secondary.mask_key();
        }
        config
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Permissive CORS for browser clients (default: true)
    #[serde(default = "default_true", alias = "enableCors")]
    pub enable_cors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Backend
// ============================================================================

/// One upstream OpenAI-compatible chat-completion endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url", alias = "baseUrl")]
    pub base_url: String,

    #[serde(default, alias = "apiKey")]
    pub api_key: String,

    #[serde(
        default = "default_model",
        rename = "model",
        alias = "model_id",
        alias = "modelId"
    )]
    pub model_id: String,

    /// Per-call timeout; [`DEFAULT_TIMEOUT_MS`] when absent.
    #[serde(
        default,
        alias = "timeout",
        alias = "timeoutMs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_ms: Option<u64>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.has_api_key())
            .field("model_id", &self.model_id)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model_id: default_model(),
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

impl BackendConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model_id: model_id.into(),
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// Join a path such as `chat/completions` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url_trimmed(), path.trim_start_matches('/'))
    }

    /// Guard run before any network call: base URL, key and model must be set.
    pub fn ensure_complete(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.base_url.trim().is_empty() {
            missing.push("base_url");
        }
        if !self.has_api_key() {
            missing.push("api_key");
        }
        if self.model_id.trim().is_empty() {
            missing.push("model");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::IncompleteBackend { missing })
        }
    }

    /// Field-shape checks reported to users by diagnostics and validate-config.
    pub fn validate(&self) -> ValidationReport {
        self.check(true)
    }

    /// Checks for a config about to be stored; a missing or short key only warns.
    pub fn validate_stored(&self) -> ValidationReport {
        self.check(false)
    }

    fn check(&self, require_key: bool) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            errors.push("base URL must not be empty".to_string());
        } else if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            errors.push("base URL must start with http:// or https://".to_string());
        } else if base_url.contains("localhost") || base_url.contains("127.0.0.1") {
            warnings.push("base URL points at a local address".to_string());
        }

        let key_problems = if require_key {
            &mut errors
        } else {
            &mut warnings
        };
        if !self.has_api_key() {
            key_problems.push("API key must not be empty".to_string());
        } else if self.api_key == MASKED_SECRET {
            warnings.push("API key is the masked placeholder".to_string());
        } else if self.api_key.len() < 10 {
            key_problems.push("API key must be at least 10 characters".to_string());
        }

        if self.model_id.trim().is_empty() {
            errors.push("model must not be empty".to_string());
        } else if !self
            .model_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'))
        {
            warnings.push("model contains unusual characters".to_string());
        }

        if let Some(timeout) = self.timeout_ms {
            if timeout < 1000 {
                errors.push("timeout must be at least 1000 ms".to_string());
            } else if timeout > 300_000 {
                warnings.push("timeout is longer than 5 minutes".to_string());
            }
        }

        ValidationReport::new(errors, warnings)
    }

    fn mask_key(&mut self) {
        if self.has_api_key() {
            self.api_key = MASKED_SECRET.to_string();
        }
    }

    /// Keep `current`'s key when this config carries the masked placeholder.
    pub fn unmask_from(&mut self, current: &BackendConfig) {
        if self.api_key == MASKED_SECRET {
            self.api_key = current.api_key.clone();
        }
    }
}

// ============================================================================
// Optimization policy
// ============================================================================

/// Start/end marker pair, serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapTags(pub String, pub String);

impl WrapTags {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self(start.into(), end.into())
    }

    pub fn start(&self) -> &str {
        &self.0
    }

    pub fn end(&self) -> &str {
        &self.1
    }
}

impl Default for WrapTags {
    fn default() -> Self {
        Self::new("<|text|>", "<|/text|>")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationPolicy {
    #[serde(default, alias = "wrapTags")]
    pub wrap_tags: WrapTags,

    /// Instruction placed ahead of every span sent for rewriting
    #[serde(
        default = "default_prompt",
        alias = "optimizationPrompt",
        alias = "optimization_prompt"
    )]
    pub prompt: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens", alias = "maxTokens")]
    pub max_tokens: u32,

    /// Route rewrites to `secondary_backend` instead of the primary API
    #[serde(
        default,
        alias = "useSecondaryBackend",
        alias = "useSeparateOptimizationApi",
        alias = "use_separate_optimization_api"
    )]
    pub use_secondary_backend: bool,

    #[serde(
        default,
        alias = "secondaryBackend",
        alias = "optimizationApi",
        alias = "optimization_api",
        skip_serializing_if = "Option::is_none"
    )]
    pub secondary_backend: Option<BackendConfig>,
}

impl Default for OptimizationPolicy {
    fn default() -> Self {
        Self {
            wrap_tags: WrapTags::default(),
            prompt: default_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            use_secondary_backend: false,
            secondary_backend: None,
        }
    }
}

fn default_prompt() -> String {
    "Rewrite the following text so it reads more fluently. Keep the original meaning:".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

impl OptimizationPolicy {
    pub fn start_tag(&self) -> &str {
        self.wrap_tags.start()
    }

    pub fn end_tag(&self) -> &str {
        self.wrap_tags.end()
    }

    /// Backend used for every rewrite in one request.
    ///
    /// `None` means the secondary backend was requested but never configured.
    pub fn effective_backend<'a>(&'a self, primary: &'a BackendConfig) -> Option<&'a BackendConfig> {
        if self.use_secondary_backend {
            self.secondary_backend.as_ref()
        } else {
            Some(primary)
        }
    }

    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.start_tag().trim().is_empty() {
            errors.push("start tag must not be empty".to_string());
        }
        if self.end_tag().trim().is_empty() {
            errors.push("end tag must not be empty".to_string());
        }
        if self.prompt.trim().is_empty() {
            warnings.push("optimization prompt is empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            errors.push("temperature must be between 0 and 2".to_string());
        }
        if !(1..=100_000).contains(&self.max_tokens) {
            errors.push("max tokens must be between 1 and 100000".to_string());
        }

        if self.use_secondary_backend {
            match &self.secondary_backend {
                None => errors.push(
                    "secondary backend must be configured when it is enabled".to_string(),
                ),
                Some(secondary) => {
                    let report = secondary.validate_stored();
                    errors.extend(report.errors.into_iter().map(|e| format!("secondary: {e}")));
                    warnings.extend(
                        report
                            .warnings
                            .into_iter()
                            .map(|w| format!("secondary: {w}")),
                    );
                }
            }
        }

        ValidationReport::new(errors, warnings)
    }
}

// ============================================================================
// Model aliases
// ============================================================================

/// Custom model ids mapped onto real upstream ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelAliasTable(BTreeMap<String, String>);

impl ModelAliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match lookup; unknown ids come back unchanged.
    pub fn resolve<'a>(&'a self, model_id: &'a str) -> &'a str {
        self.0.get(model_id).map(String::as_str).unwrap_or(model_id)
    }

    pub fn get(&self, custom: &str) -> Option<&str> {
        self.0.get(custom).map(String::as_str)
    }

    pub fn contains(&self, custom: &str) -> bool {
        self.0.contains_key(custom)
    }

    pub fn insert(&mut self, custom: impl Into<String>, actual: impl Into<String>) -> Option<String> {
        self.0.insert(custom.into(), actual.into())
    }

    pub fn remove(&mut self, custom: &str) -> Option<String> {
        self.0.remove(custom)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ModelAliasTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> BackendConfig {
        BackendConfig::new("https://api.example.com/v1", "sk-test-0123456789", "gpt-4o")
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RetextConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.api.base_url, "https://api.openai.com/v1");
        assert_eq!(config.api.timeout(), Duration::from_millis(30_000));
        assert_eq!(config.text_optimization.start_tag(), "<|text|>");
        assert_eq!(config.text_optimization.end_tag(), "<|/text|>");
        assert_eq!(config.text_optimization.max_tokens, 2000);
        assert!(config.model_aliases.is_empty());
    }

    #[test]
    fn test_ensure_complete_lists_missing_fields() {
        assert!(backend().ensure_complete().is_ok());

        let empty = BackendConfig::new("", " ", "");
        match empty.ensure_complete() {
            Err(ConfigError::IncompleteBackend { missing }) => {
                assert_eq!(missing, vec!["base_url", "api_key", "model"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_backend_validation() {
        assert!(backend().validate().is_valid);

        let bad = BackendConfig::new("ftp://example.com", "short", "gpt-4o").with_timeout_ms(10);
        let report = bad.validate();
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 3);

        let stored = bad.validate_stored();
        assert_eq!(stored.errors.len(), 2);
        assert_eq!(stored.warnings.len(), 1);
    }

    #[test]
    fn test_default_config_without_key_is_storable() {
        let report = RetextConfig::default().validate();
        assert!(report.is_valid);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_debug_does_not_print_api_key() {
        let rendered = format!("{:?}", backend());
        assert!(!rendered.contains("sk-test-0123456789"));
        assert!(rendered.contains("has_api_key: true"));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = BackendConfig::new("https://api.example.com/v1/", "k", "m");
        assert_eq!(
            config.endpoint("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(config.endpoint("/models"), "https://api.example.com/v1/models");
    }

    #[test]
    fn test_effective_backend_selection() {
        let primary = backend();
        let secondary = BackendConfig::new("https://other.example.com", "sk-other-0123456", "m2");

        let mut policy = OptimizationPolicy::default();
        assert_eq!(policy.effective_backend(&primary), Some(&primary));

        policy.use_secondary_backend = true;
        assert_eq!(policy.effective_backend(&primary), None);
        assert!(!policy.validate().is_valid);

        policy.secondary_backend = Some(secondary.clone());
        assert_eq!(policy.effective_backend(&primary), Some(&secondary));

        policy.use_secondary_backend = false;
        assert_eq!(policy.effective_backend(&primary), Some(&primary));
    }

    #[test]
    fn test_alias_resolution() {
        let aliases: ModelAliasTable = [("gpt-custom", "gpt-4")].into_iter().collect();
        assert_eq!(aliases.resolve("gpt-custom"), "gpt-4");
        assert_eq!(aliases.resolve("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn test_masked_hides_both_keys() {
        let mut config = RetextConfig {
            api: backend(),
            ..RetextConfig::default()
        };
        config.text_optimization.secondary_backend =
            Some(BackendConfig::new("https://x.example.com", "sk-secondary-000", "m"));

        let masked = config.masked();
        assert_eq!(masked.api.api_key, MASKED_SECRET);
        assert_eq!(
            masked.text_optimization.secondary_backend.unwrap().api_key,
            MASKED_SECRET
        );

        let no_key = RetextConfig::default().masked();
        assert_eq!(no_key.api.api_key, "");
    }

    #[test]
    fn test_camel_case_aliases_are_accepted() {
        let json = r#"{
            "api": {"baseUrl": "https://api.example.com/v1", "apiKey": "sk-abcdefghijk", "model": "gpt-4o", "timeout": 5000},
            "textOptimization": {
                "wrapTags": ["[[", "]]"],
                "optimizationPrompt": "Fix it:",
                "useSeparateOptimizationApi": true,
                "optimizationApi": {"baseUrl": "https://b.example.com", "apiKey": "sk-bbbbbbbbbbb", "model": "small"}
            },
            "modelAliases": {"mine": "gpt-4o"}
        }"#;
        let config: RetextConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.api.timeout_ms, Some(5000));
        assert_eq!(config.text_optimization.start_tag(), "[[");
        assert_eq!(config.text_optimization.prompt, "Fix it:");
        assert!(config.text_optimization.use_secondary_backend);
        assert_eq!(config.model_aliases.resolve("mine"), "gpt-4o");
        assert!(config.validate().is_valid);
    }
}
