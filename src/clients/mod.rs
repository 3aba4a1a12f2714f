//! External service clients.
//!
//! The engine talks to three untrusted collaborators: a TON chain indexer,
//! the Telegram membership check and the Telegram message sink. Each sits
//! behind a trait so tests and alternative providers can be swapped in.

use async_trait::async_trait;

use crate::ton::ChainTransaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod telegram;
pub mod toncenter;

pub use telegram::TelegramClient;
pub use toncenter::TonHttpOracle;

/// Errors raised by external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),
}

/// Chain indexer.
#[async_trait]
pub trait ChainOracle: Send + Sync {
    /// Fetch one transaction by hash. `None` when the indexer does not know it.
    async fn get_transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, OracleError>;

    /// Recent incoming transactions of `address`, newest first.
    async fn list_transactions(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<ChainTransaction>, OracleError>;
}

/// Channel membership check.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn is_member(&self, channel_id: &str, external_user_id: i64) -> Result<bool, OracleError>;
}

/// Best-effort user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, external_user_id: i64, text: &str) -> Result<(), OracleError>;
}

/// Notifier that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _external_user_id: i64, _text: &str) -> Result<(), OracleError> {
        Ok(())
    }
}

/// Map a non-success HTTP status to an error, keeping a short body excerpt.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> OracleError {
    let excerpt: String = body.chars().take(200).collect();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        OracleError::Unavailable(format!("HTTP {status} - {excerpt}"))
    } else {
        OracleError::Decode(format!("HTTP {status} - {excerpt}"))
    }
}
