pub mod error;
pub mod loader;
pub mod schema;
pub mod store;

pub use error::ConfigError;
pub use loader::{
    apply_env_overrides, find_config_file, load_config, load_config_from_file, render_config,
    resolve_config, ConfigFormat, ResolvedConfig,
};
pub use schema::{
    BackendConfig, ModelAliasTable, OptimizationPolicy, RetextConfig, ServerSettings,
    TelemetryConfig, ValidationReport, WrapTags, DEFAULT_TIMEOUT_MS, MASKED_SECRET,
};
pub use store::{ConfigProvider, ConfigStore, EffectiveConfig};
