//! Tunable economy parameters and where they are read from.
//!
//! The engine reads parameters through a [`ConfigSource`] on every action so
//! operators can change them without a restart. Keys that are unset in the
//! source fall back to the static defaults from the process configuration.

use async_trait::async_trait;
use serde::Deserialize;

/// Default cooldown between wakes (8 hours).
pub const DEFAULT_COOLDOWN_MS: u64 = 28_800_000;
/// Default number of free wakes per UTC day.
pub const DEFAULT_MAX_FREE_ACTIONS_PER_DAY: u32 = 3;
/// Default steps granted per wake.
pub const DEFAULT_STEPS_PER_WAKE: i64 = 1;
/// Default sandwiches granted to the direct referrer per wake.
pub const DEFAULT_SANDWICH_PER_REF_ACTION: i64 = 1;
/// Default coffee granted to the second-level referrer per wake.
pub const DEFAULT_COFFEE_PER_REF2_ACTION: i64 = 1;

/// Economy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub cooldown_ms: u64,
    pub max_free_actions_per_day: u32,
    pub steps_per_wake: i64,
    pub sandwich_per_ref_action: i64,
    pub coffee_per_ref2_action: i64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            max_free_actions_per_day: DEFAULT_MAX_FREE_ACTIONS_PER_DAY,
            steps_per_wake: DEFAULT_STEPS_PER_WAKE,
            sandwich_per_ref_action: DEFAULT_SANDWICH_PER_REF_ACTION,
            coffee_per_ref2_action: DEFAULT_COFFEE_PER_REF2_ACTION,
        }
    }
}

impl EconomyConfig {
    /// Keys understood by key/value config sources.
    pub const KEYS: [&'static str; 5] = [
        "cooldown_ms",
        "max_free_actions_per_day",
        "steps_per_wake",
        "sandwich_per_ref_action",
        "coffee_per_ref2_action",
    ];

    /// Overlay a single key/value pair onto `self`.
    ///
    /// Unknown keys and values that do not parse (or are negative grants)
    /// are ignored and reported as `false`.
    pub fn apply_override(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        match key {
            "cooldown_ms" => parse_into(value, &mut self.cooldown_ms),
            "max_free_actions_per_day" => parse_into(value, &mut self.max_free_actions_per_day),
            "steps_per_wake" => parse_grant(value, &mut self.steps_per_wake),
            "sandwich_per_ref_action" => parse_grant(value, &mut self.sandwich_per_ref_action),
            "coffee_per_ref2_action" => parse_grant(value, &mut self.coffee_per_ref2_action),
            _ => false,
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

fn parse_grant(value: &str, slot: &mut i64) -> bool {
    match value.parse::<i64>() {
        Ok(parsed) if parsed >= 0 => {
            *slot = parsed;
            true
        }
        _ => false,
    }
}

/// Errors raised while reading economy parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigSourceError {
    #[error("Config source unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-through provider of economy parameters.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load(&self) -> Result<EconomyConfig, ConfigSourceError>;
}

/// Fixed parameters, typically the `economy` section of the process config.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    config: EconomyConfig,
}

impl StaticConfigSource {
    pub fn new(config: EconomyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn load(&self) -> Result<EconomyConfig, ConfigSourceError> {
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EconomyConfig::default();
        assert_eq!(config.cooldown_ms, 28_800_000);
        assert_eq!(config.max_free_actions_per_day, 3);
        assert_eq!(config.steps_per_wake, 1);
        assert_eq!(config.sandwich_per_ref_action, 1);
        assert_eq!(config.coffee_per_ref2_action, 1);
    }

    #[test]
    fn test_apply_override_ignores_garbage() {
        let mut config = EconomyConfig::default();
        assert!(config.apply_override("cooldown_ms", " 60000 "));
        assert!(!config.apply_override("steps_per_wake", "-4"));
        assert!(!config.apply_override("max_free_actions_per_day", "lots"));
        assert!(!config.apply_override("unknown", "1"));
        assert_eq!(config.cooldown_ms, 60_000);
        assert_eq!(config.steps_per_wake, 1);
        assert_eq!(config.max_free_actions_per_day, 3);
    }

    #[tokio::test]
    async fn test_static_source_returns_its_config() {
        let mut config = EconomyConfig::default();
        config.steps_per_wake = 7;
        let source = StaticConfigSource::new(config.clone());
        assert_eq!(source.load().await.unwrap(), config);
    }
}
