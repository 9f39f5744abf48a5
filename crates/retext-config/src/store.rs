//! Runtime configuration store.
//!
//! Request handlers never hold the lock: they take an [`EffectiveConfig`]
//! snapshot at the start of a request and work from that copy, so a
//! concurrent update can never be observed half-written.

use crate::error::ConfigError;
use crate::loader::{render_config, ConfigFormat, ResolvedConfig};
use crate::schema::{BackendConfig, ModelAliasTable, OptimizationPolicy, RetextConfig};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-request view of the configuration the proxy core consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub primary_backend: BackendConfig,
    pub optimization_policy: OptimizationPolicy,
}

/// Read-side interface the proxy core depends on.
pub trait ConfigProvider: Send + Sync {
    fn effective_config(&self) -> EffectiveConfig;

    /// Map a custom model id onto the real upstream id (identity when unknown).
    fn resolve_alias(&self, model_id: &str) -> String;

    fn model_aliases(&self) -> ModelAliasTable;
}

#[derive(Debug)]
pub struct ConfigStore {
    inner: RwLock<StoreState>,
    persist_to: Option<(PathBuf, ConfigFormat)>,
}

#[derive(Debug)]
struct StoreState {
    /// What requests run with, after env expansion and overrides
    live: RetextConfig,
    /// What the file holds; only fields an update touches are changed here
    file: RetextConfig,
}

impl ConfigStore {
    /// In-memory store; updates are not written anywhere.
    pub fn new(config: RetextConfig) -> Self {
        Self {
            inner: RwLock::new(StoreState {
                file: config.clone(),
                live: config,
            }),
            persist_to: None,
        }
    }

    /// Store that writes every accepted update back to `path`, starting from
    /// `config` as the file contents.
    pub fn with_persistence(config: RetextConfig, path: PathBuf, format: ConfigFormat) -> Self {
        Self::persisted(config.clone(), config, path, format)
    }

    /// Store running with `live` whose file on disk holds `file`.
    ///
    /// Updates are carried into `file` field by field, so unexpanded
    /// placeholders and values that only came from the environment or the
    /// command line never reach the disk unless an update sets them.
    pub fn persisted(
        live: RetextConfig,
        file: RetextConfig,
        path: PathBuf,
        format: ConfigFormat,
    ) -> Self {
        Self {
            inner: RwLock::new(StoreState { live, file }),
            persist_to: Some((path, format)),
        }
    }

    pub fn from_resolved(resolved: ResolvedConfig) -> Self {
        Self::persisted(resolved.config, resolved.raw, resolved.path, resolved.format)
    }

    pub fn snapshot(&self) -> RetextConfig {
        self.inner.read().live.clone()
    }

    pub fn masked(&self) -> RetextConfig {
        self.inner.read().live.masked()
    }

    pub fn path(&self) -> Option<&Path> {
        self.persist_to.as_ref().map(|(p, _)| p.as_path())
    }

    /// Replace the whole configuration.
    ///
    /// Masked API keys in `next` keep the stored value. The update is
    /// rejected when validation reports errors.
    pub fn replace(&self, next: RetextConfig) -> Result<(), ConfigError> {
        self.write(move |config| {
            let mut next = next;
            next.api.unmask_from(&config.api);
            if let (Some(incoming), Some(stored)) = (
                next.text_optimization.secondary_backend.as_mut(),
                config.text_optimization.secondary_backend.as_ref(),
            ) {
                incoming.unmask_from(stored);
            }

            let report = next.validate();
            if !report.is_valid {
                return Err(ConfigError::Invalid {
                    errors: report.errors,
                });
            }
            for warning in &report.warnings {
                warn!(warning = %warning, "configuration warning");
            }

            *config = next;
            Ok(())
        })
    }

    pub fn aliases(&self) -> ModelAliasTable {
        self.inner.read().live.model_aliases.clone()
    }

    /// Insert or overwrite an alias.
    pub fn add_alias(&self, custom: &str, actual: &str) -> Result<(), ConfigError> {
        if custom.trim().is_empty() || actual.trim().is_empty() {
            return Err(ConfigError::Invalid {
                errors: vec!["custom name and actual model are required".to_string()],
            });
        }
        self.write(|config| {
            config.model_aliases.insert(custom, actual);
            Ok(())
        })
    }

    /// Re-point an existing alias.
    pub fn update_alias(&self, custom: &str, actual: &str) -> Result<(), ConfigError> {
        if actual.trim().is_empty() {
            return Err(ConfigError::Invalid {
                errors: vec!["actual model is required".to_string()],
            });
        }
        self.write(|config| {
            if !config.model_aliases.contains(custom) {
                return Err(ConfigError::AliasNotFound(custom.to_string()));
            }
            config.model_aliases.insert(custom, actual);
            Ok(())
        })
    }

    pub fn remove_alias(&self, custom: &str) -> Result<(), ConfigError> {
        self.write(|config| {
            if config.model_aliases.remove(custom).is_none() {
                return Err(ConfigError::AliasNotFound(custom.to_string()));
            }
            Ok(())
        })
    }

    /// Apply `mutate` to a copy of the live config under the write lock,
    /// persist it, and only then install it.
    ///
    /// The lock is held while writing the file so two updates cannot
    /// interleave on disk. A failed save leaves memory untouched.
    fn write(
        &self,
        mutate: impl FnOnce(&mut RetextConfig) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let mut state = self.inner.write();
        let mut next = state.live.clone();
        mutate(&mut next)?;

        if let Some((path, format)) = &self.persist_to {
            let mut file = state.file.clone();
            carry_changes(&state.live, &next, &mut file);
            save_to(path, *format, &file)?;
            state.file = file;
        }
        state.live = next;
        Ok(())
    }
}

macro_rules! carry_fields {
    ($before:expr, $after:expr, $file:expr; $($field:ident),+ $(,)?) => {
        $(
            if $before.$field != $after.$field {
                $file.$field = $after.$field.clone();
            }
        )+
    };
}

/// Copy every field that differs between `before` and `after` into `file`.
fn carry_changes(before: &RetextConfig, after: &RetextConfig, file: &mut RetextConfig) {
    carry_fields!(before.server, after.server, file.server; host, port, enable_cors);
    carry_backend(&before.api, &after.api, &mut file.api);

    let (old, new, on_disk) = (
        &before.text_optimization,
        &after.text_optimization,
        &mut file.text_optimization,
    );
    carry_fields!(old, new, on_disk; wrap_tags, prompt, temperature, max_tokens, use_secondary_backend);
    let carried = match (
        old.secondary_backend.as_ref(),
        new.secondary_backend.as_ref(),
        on_disk.secondary_backend.as_mut(),
    ) {
        (Some(old), Some(new), Some(on_disk)) => {
            carry_backend(old, new, on_disk);
            true
        }
        _ => false,
    };
    if !carried && old.secondary_backend != new.secondary_backend {
        on_disk.secondary_backend = new.secondary_backend.clone();
    }

    carry_fields!(before.logging, after.logging, file.logging;
        level, json_output, enable_console, file_path, buffer_size);

    if before.model_aliases != after.model_aliases {
        file.model_aliases = after.model_aliases.clone();
    }
}

fn carry_backend(before: &BackendConfig, after: &BackendConfig, file: &mut BackendConfig) {
    carry_fields!(before, after, file; base_url, api_key, model_id, timeout_ms);
}

impl ConfigProvider for ConfigStore {
    fn effective_config(&self) -> EffectiveConfig {
        let state = self.inner.read();
        let config = &state.live;
        EffectiveConfig {
            primary_backend: config.api.clone(),
            optimization_policy: config.text_optimization.clone(),
        }
    }

    fn resolve_alias(&self, model_id: &str) -> String {
        self.inner.read().live.model_aliases.resolve(model_id).to_string()
    }

    fn model_aliases(&self) -> ModelAliasTable {
        self.aliases()
    }
}

/// Write `config` to `path`, keeping the previous file as `<path>.backup`.
pub fn save_to(path: &Path, format: ConfigFormat, config: &RetextConfig) -> Result<(), ConfigError> {
    let rendered = render_config(config, format).map_err(|e| ConfigError::Serialize(e.to_string()))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    if path.exists() {
        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|source| ConfigError::Write {
            path: backup.clone(),
            source,
        })?;
        debug!(backup = %backup.display(), "previous configuration backed up");
    }

    fs::write(path, rendered).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "configuration saved");
    Ok(())
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}
