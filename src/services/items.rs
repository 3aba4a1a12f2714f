//! Spending sandwiches and coffee for steps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::engine::{check_prior, ActionEngine};
use super::error::{ActionError, Result};
use crate::model::{Balances, Currency, Deltas, LedgerEntry, LedgerKind, NewLedgerEntry};
use crate::storage::AccountChange;
use crate::utils::RateLimitedOp;

/// Consumable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKey {
    Sandwiches,
    Coffee,
}

impl ItemKey {
    pub fn currency(&self) -> Currency {
        match self {
            ItemKey::Sandwiches => Currency::Sandwiches,
            ItemKey::Coffee => Currency::Coffee,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.currency().as_str())
    }
}

impl FromStr for ItemKey {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sandwiches" => Ok(ItemKey::Sandwiches),
            "coffee" => Ok(ItemKey::Coffee),
            _ => Err(ActionError::Validation(
                "item_key must be sandwiches or coffee".to_string(),
            )),
        }
    }
}

/// How the item was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseMode {
    Tap,
    Hold,
}

impl UseMode {
    pub fn step_gain(&self) -> i64 {
        match self {
            UseMode::Tap => 1,
            UseMode::Hold => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UseMode::Tap => "tap",
            UseMode::Hold => "hold",
        }
    }
}

impl FromStr for UseMode {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tap" => Ok(UseMode::Tap),
            "hold" => Ok(UseMode::Hold),
            _ => Err(ActionError::Validation("mode must be tap or hold".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub deduped: bool,
    pub entry: LedgerEntry,
    pub balances: Balances,
}

impl ActionEngine {
    /// Spend one unit of `item` for steps.
    ///
    /// The balance guard runs inside the commit; an empty balance records
    /// nothing.
    pub async fn use_item(
        &self,
        user_id: Uuid,
        idempotency_key: Option<&str>,
        item: ItemKey,
        mode: UseMode,
    ) -> Result<ItemOutcome> {
        let key = self.require_key(idempotency_key)?;
        self.throttle(RateLimitedOp::Item, user_id).await?;
        let user = self.load_user(user_id).await?;

        if let Some(prior) = self.find_prior(key, user.id, LedgerKind::ItemUse).await? {
            debug!(%user_id, idempotency_key = key, "Item use replayed");
            return Ok(ItemOutcome {
                deduped: true,
                entry: prior,
                balances: user.balances,
            });
        }

        let currency = item.currency();
        if user.balances.get(currency) <= 0 {
            return Err(ActionError::InsufficientBalance(currency));
        }

        let deltas = Deltas::single(currency, -1).plus(Deltas::steps(mode.step_gain()));
        let entry = NewLedgerEntry::new(user.id, LedgerKind::ItemUse, deltas, self.clock.now())
            .with_key(key)
            .with_meta(json!({ "item_key": item, "mode": mode }));

        let outcome = self
            .stores
            .accounts
            .commit(entry, AccountChange::none())
            .await?;
        let deduped = outcome.is_duplicate();
        let entry = check_prior(outcome.into_entry(), user.id, LedgerKind::ItemUse)?;
        if !deduped {
            info!(%user_id, item = %item, mode = mode.as_str(), "Item used");
        }

        let user = self.load_user(user_id).await?;
        Ok(ItemOutcome {
            deduped,
            entry,
            balances: user.balances,
        })
    }
}
