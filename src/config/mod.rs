//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod client;
mod economy;
mod limits;
mod storage;

pub use client::{
    PollerConfig, TelegramConfig, TonConfig, DEFAULT_TELEGRAM_API_BASE, DEFAULT_TON_API_BASE,
    DEFAULT_TON_INDEXER_ENDPOINT,
};
pub use economy::{
    ConfigSource, ConfigSourceError, EconomyConfig, StaticConfigSource, DEFAULT_COFFEE_PER_REF2_ACTION,
    DEFAULT_COOLDOWN_MS, DEFAULT_MAX_FREE_ACTIONS_PER_DAY, DEFAULT_SANDWICH_PER_REF_ACTION,
    DEFAULT_STEPS_PER_WAKE,
};
pub use limits::{BucketConfig, RateLimitConfig};
pub use storage::{StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "KOTH_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "KOTH";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "KOTH_LOG";

use serde::Deserialize;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Static economy parameters (fallback for the runtime config source).
    pub economy: EconomyConfig,
    /// TON payment settings.
    pub ton: TonConfig,
    /// Telegram Bot API settings.
    pub telegram: TelegramConfig,
    /// Burst-control buckets.
    pub rate_limits: RateLimitConfig,
    /// Payment poller settings.
    pub poller: PollerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::ton::parse_ton_amount(&self.ton.activation_amount).map_err(|e| {
            ConfigError::Invalid(format!(
                "ton.activation_amount {:?}: {e}",
                self.ton.activation_amount
            ))
        })?;
        if self.economy.steps_per_wake < 0
            || self.economy.sandwich_per_ref_action < 0
            || self.economy.coffee_per_ref2_action < 0
        {
            return Err(ConfigError::Invalid(
                "economy grants must not be negative".to_string(),
            ));
        }
        if self.storage.storage_type == StorageType::Sqlite && self.storage.path.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.path is required for sqlite storage".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }
}
