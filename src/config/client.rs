//! External service configuration types.
//!
//! Settings for the TON chain indexer and the Telegram Bot API, the two
//! collaborators the engine calls over HTTP.

use std::time::Duration;

use serde::Deserialize;

/// Default TON indexer (toncenter v2 compatible) endpoint.
pub const DEFAULT_TON_INDEXER_ENDPOINT: &str = "https://toncenter.com/api";
/// Default single-transaction lookup API (tonapi v2 compatible).
pub const DEFAULT_TON_API_BASE: &str = "https://tonapi.io";
/// Default Telegram Bot API base URL.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

// ============================================================================
// Configuration
// ============================================================================

/// TON payment configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TonConfig {
    /// Indexer used to list a receiver's recent transactions.
    pub indexer_endpoint: String,
    /// API used to fetch one transaction by hash.
    pub api_base: String,
    /// Optional bearer token for `api_base`.
    pub api_key: Option<String>,
    /// Default receiver address for payment missions.
    pub receiver: String,
    /// Default payment amount in decimal TON (e.g. "1" or "0.25").
    pub activation_amount: String,
    /// Confirmations required before a payment counts as paid.
    pub min_confirmations: u32,
    /// Timeout for one indexer request.
    pub request_timeout_secs: u64,
    /// Number of recent transactions inspected per sync.
    pub transaction_limit: u32,
}

impl Default for TonConfig {
    fn default() -> Self {
        Self {
            indexer_endpoint: DEFAULT_TON_INDEXER_ENDPOINT.to_string(),
            api_base: DEFAULT_TON_API_BASE.to_string(),
            api_key: None,
            receiver: String::new(),
            activation_amount: "1".to_string(),
            min_confirmations: 1,
            request_timeout_secs: 10,
            transaction_limit: 50,
        }
    }
}

impl TonConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    /// Bot token. Membership checks and notifications are disabled when empty.
    pub bot_token: String,
    /// Channel used by `join_channel` missions without their own channel id.
    pub required_channel_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            bot_token: String::new(),
            required_channel_id: None,
            request_timeout_secs: 10,
        }
    }
}

impl TelegramConfig {
    pub fn is_enabled(&self) -> bool {
        !self.bot_token.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Payment poller configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay between sync sweeps.
    pub interval_secs: u64,
    /// Maximum open purchases synced per sweep.
    pub batch_size: u32,
    /// Concurrent syncs per sweep.
    pub concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            batch_size: 50,
            concurrency: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ton_config_default() {
        let ton = TonConfig::default();
        assert_eq!(ton.min_confirmations, 1);
        assert_eq!(ton.activation_amount, "1");
        assert_eq!(ton.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_telegram_disabled_without_token() {
        assert!(!TelegramConfig::default().is_enabled());
    }
}
