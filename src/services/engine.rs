//! Action engine construction and shared request plumbing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{ActionError, Attempt, Result};
use crate::clients::{ChainOracle, MembershipOracle, NoopNotifier, Notifier};
use crate::clock::{Clock, SystemClock};
use crate::config::{EconomyConfig, TelegramConfig, TonConfig};
use crate::model::{LedgerEntry, LedgerKind, User};
use crate::rules::is_derived_key;
use crate::storage::Stores;
use crate::utils::retry::conflict_backoff;
use crate::utils::{NoopRateLimiter, RateLimitedOp, RateLimiter};

/// Longest accepted idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Executes user actions exactly once per idempotency key.
///
/// Every collaborator is injected; the engine holds no global state and is
/// cheap to share behind an `Arc`.
pub struct ActionEngine {
    pub(crate) stores: Stores,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) limiter: Arc<dyn RateLimiter>,
    pub(crate) chain: Arc<dyn ChainOracle>,
    pub(crate) membership: Arc<dyn MembershipOracle>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) ton: TonConfig,
    pub(crate) telegram: TelegramConfig,
}

/// Builder for [`ActionEngine`].
///
/// Defaults: wall clock, no rate limiting, notifications dropped, default
/// TON and Telegram settings.
pub struct ActionEngineBuilder {
    stores: Stores,
    chain: Arc<dyn ChainOracle>,
    membership: Arc<dyn MembershipOracle>,
    clock: Arc<dyn Clock>,
    limiter: Arc<dyn RateLimiter>,
    notifier: Arc<dyn Notifier>,
    ton: TonConfig,
    telegram: TelegramConfig,
}

impl ActionEngineBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_ton_config(mut self, ton: TonConfig) -> Self {
        self.ton = ton;
        self
    }

    pub fn with_telegram_config(mut self, telegram: TelegramConfig) -> Self {
        self.telegram = telegram;
        self
    }

    pub fn build(self) -> ActionEngine {
        ActionEngine {
            stores: self.stores,
            clock: self.clock,
            limiter: self.limiter,
            chain: self.chain,
            membership: self.membership,
            notifier: self.notifier,
            ton: self.ton,
            telegram: self.telegram,
        }
    }
}

impl ActionEngine {
    pub fn builder(
        stores: Stores,
        chain: Arc<dyn ChainOracle>,
        membership: Arc<dyn MembershipOracle>,
    ) -> ActionEngineBuilder {
        ActionEngineBuilder {
            stores,
            chain,
            membership,
            clock: Arc::new(SystemClock),
            limiter: Arc::new(NoopRateLimiter),
            notifier: Arc::new(NoopNotifier),
            ton: TonConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Trimmed, non-empty, bounded idempotency key outside the reserved
    /// cascade namespace.
    pub(crate) fn require_key<'k>(&self, key: Option<&'k str>) -> Result<&'k str> {
        let key = key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ActionError::MissingIdempotencyKey)?;
        if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(ActionError::Validation(format!(
                "idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} bytes"
            )));
        }
        if is_derived_key(key) {
            return Err(ActionError::Validation(
                "idempotency keys may not end in :lvl1 or :lvl2".to_string(),
            ));
        }
        Ok(key)
    }

    pub(crate) async fn throttle(&self, op: RateLimitedOp, user_id: Uuid) -> Result<()> {
        self.limiter
            .check(op, &user_id.to_string())
            .await
            .map_err(|throttled| {
                debug!(%user_id, op = op.as_str(), retry_after_ms = throttled.retry_after_ms, "Throttled");
                ActionError::RateLimited {
                    retry_after_ms: throttled.retry_after_ms,
                }
            })
    }

    pub(crate) async fn load_user(&self, user_id: Uuid) -> Result<User> {
        self.stores
            .accounts
            .get_user(user_id)
            .await?
            .ok_or(ActionError::Unauthenticated)
    }

    pub(crate) async fn economy(&self) -> Result<EconomyConfig> {
        self.stores
            .config
            .load()
            .await
            .map_err(|e| ActionError::Internal(format!("failed to load economy config: {e}")))
    }

    /// Stored entry for `key`, if the key was already used by this user for
    /// the same kind of action.
    pub(crate) async fn find_prior(
        &self,
        key: &str,
        user_id: Uuid,
        kind: LedgerKind,
    ) -> Result<Option<LedgerEntry>> {
        let Some(entry) = self.stores.ledger.find_by_key(key).await? else {
            return Ok(None);
        };
        check_prior(entry, user_id, kind).map(Some)
    }

    /// Run `attempt` again while it reports a concurrent wake-state change.
    pub(crate) async fn retry_stale<T, F, Fut>(&self, op: &'static str, attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Attempt>>,
    {
        attempt
            .retry(conflict_backoff())
            .when(|e| matches!(e, Attempt::Stale))
            .notify(|_: &Attempt, delay: Duration| {
                debug!(op, ?delay, "Concurrent state change, retrying");
            })
            .await
            .map_err(|e| match e {
                Attempt::Stale => {
                    ActionError::Conflict("state kept changing concurrently".to_string())
                }
                Attempt::Fail(err) => err,
            })
    }

    /// Send a message, logging instead of failing.
    pub(crate) async fn notify_best_effort(&self, external_id: i64, text: &str) {
        if let Err(e) = self.notifier.notify(external_id, text).await {
            warn!(external_id, error = %e, "Notification failed");
        }
    }
}

/// A key may only be replayed by its owner for the same kind of action.
pub(crate) fn check_prior(entry: LedgerEntry, user_id: Uuid, kind: LedgerKind) -> Result<LedgerEntry> {
    if entry.user_id != user_id {
        return Err(ActionError::Conflict(
            "idempotency key already used by another user".to_string(),
        ));
    }
    if entry.kind != kind {
        return Err(ActionError::Conflict(format!(
            "idempotency key already used for {}",
            entry.kind
        )));
    }
    Ok(entry)
}
