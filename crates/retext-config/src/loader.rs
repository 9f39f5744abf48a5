use crate::schema::{BackendConfig, RetextConfig};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Jsonc,
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;

        match ext {
            "jsonc" => Some(Self::Jsonc),
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Config with `${VAR}` placeholders expanded, ready to run with
    pub config: RetextConfig,
    /// Config exactly as written in the file
    pub raw: RetextConfig,
    pub path: PathBuf,
    pub format: ConfigFormat,
}

pub fn load_config(config_path: Option<&Path>) -> Result<RetextConfig> {
    resolve_config(config_path).map(|r| r.config)
}

pub fn resolve_config(config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .or_else(find_config_file)
        .ok_or_else(|| anyhow!("No configuration file found"))?;

    load_config_from_file(&path)
}

pub fn load_config_from_file(path: &Path) -> Result<ResolvedConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| anyhow!("Unknown config format for: {}", path.display()))?;

    let raw = parse_config_content(&content, format)?;

    Ok(ResolvedConfig {
        config: expand_env_vars(raw.clone()),
        raw,
        path: path.to_path_buf(),
        format,
    })
}

fn parse_config_content(content: &str, format: ConfigFormat) -> Result<RetextConfig> {
    match format {
        ConfigFormat::Jsonc => json5::from_str(content).context("Failed to parse JSONC"),
        ConfigFormat::Json => serde_json::from_str(content).context("Failed to parse JSON"),
        ConfigFormat::Yaml => serde_yaml_ng::from_str(content).context("Failed to parse YAML"),
    }
}

/// Render a config for writing back to disk. JSONC is written as plain JSON.
pub fn render_config(config: &RetextConfig, format: ConfigFormat) -> Result<String> {
    match format {
        ConfigFormat::Jsonc | ConfigFormat::Json => {
            serde_json::to_string_pretty(config).context("Failed to serialize JSON")
        }
        ConfigFormat::Yaml => serde_yaml_ng::to_string(config).context("Failed to serialize YAML"),
    }
}

const CONFIG_CANDIDATES: &[&str] = &[
    "retext.jsonc",
    "retext.json",
    "retext.yml",
    "retext.yaml",
    ".retext.jsonc",
    ".retext.json",
    ".retext.yml",
    ".retext.yaml",
];

/// First existing candidate in the working directory, then `~/.config/retext/`.
pub fn find_config_file() -> Option<PathBuf> {
    for candidate in CONFIG_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    let global_dir = dirs::home_dir()?.join(".config").join("retext");
    CONFIG_CANDIDATES
        .iter()
        .map(|candidate| global_dir.join(candidate))
        .find(|path| path.exists())
}

/// Apply `RETEXT_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(mut config: RetextConfig) -> RetextConfig {
    if let Some(port) = env::var("RETEXT_PORT")
        .or_else(|_| env::var("PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
    {
        config.server.port = port;
    }
    if let Ok(host) = env::var("RETEXT_HOST") {
        config.server.host = host;
    }
    if let Ok(base_url) = env::var("RETEXT_BASE_URL") {
        config.api.base_url = base_url;
    }
    if let Ok(api_key) = env::var("RETEXT_API_KEY") {
        config.api.api_key = api_key;
    }
    if let Ok(model) = env::var("RETEXT_MODEL") {
        config.api.model_id = model;
    }
    config
}

fn expand_env_vars(mut config: RetextConfig) -> RetextConfig {
    config.api = expand_backend(config.api);
    config.text_optimization.secondary_backend = config
        .text_optimization
        .secondary_backend
        .map(expand_backend);
    config
}

fn expand_backend(mut backend: BackendConfig) -> BackendConfig {
    backend.base_url = expand_env_string(&backend.base_url);
    backend.api_key = expand_env_string(&backend.api_key);
    backend.model_id = expand_env_string(&backend.model_id);
    backend
}

fn expand_env_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            if chars.peek() == Some(&'{') {
                // ${VAR} syntax
                chars.next();
                let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                if let Ok(value) = env::var(&var_name) {
                    result.push_str(&value);
                } else {
                    result.push_str("${");
                    result.push_str(&var_name);
                    result.push('}');
                }
            } else {
                // $VAR syntax; peek so the delimiter is kept
                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        var_name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if !var_name.is_empty() {
                    if let Ok(value) = env::var(&var_name) {
                        result.push_str(&value);
                    } else {
                        result.push('$');
                        result.push_str(&var_name);
                    }
                } else {
                    result.push('$');
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}
