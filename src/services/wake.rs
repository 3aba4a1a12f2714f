//! The wake action and its referral cascade.

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::{check_prior, ActionEngine};
use super::error::{ActionError, Attempt, Result};
use crate::config::EconomyConfig;
use crate::model::{Balances, Deltas, LedgerEntry, LedgerKind, NewLedgerEntry, User};
use crate::rules::{self, compute_referral_grants, Eligibility};
use crate::storage::{AccountChange, CommitOutcome};
use crate::utils::RateLimitedOp;

/// Result of a wake request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WakeOutcome {
    /// The key had already been applied; nothing new was granted to the caller.
    pub deduped: bool,
    pub entry: LedgerEntry,
    pub balances: Balances,
    /// Eligibility after the action.
    pub eligibility: Eligibility,
    /// Upstream grants recorded for this wake (new or already present).
    pub referral_entries: Vec<LedgerEntry>,
}

impl ActionEngine {
    /// Perform a wake for `user_id` under `idempotency_key`.
    pub async fn wake(&self, user_id: Uuid, idempotency_key: Option<&str>) -> Result<WakeOutcome> {
        let key = self.require_key(idempotency_key)?;
        self.throttle(RateLimitedOp::Wake, user_id).await?;
        let user = self.load_user(user_id).await?;

        // Replays are answered before gating so a retry inside the cooldown
        // still reports success.
        if let Some(prior) = self.find_prior(key, user.id, LedgerKind::Wake).await? {
            debug!(%user_id, idempotency_key = key, "Wake replayed");
            return self.finish_wake(&user, key, prior, true).await;
        }

        let outcome = self
            .retry_stale("wake", || self.wake_once(user_id, key))
            .await?;
        let deduped = outcome.is_duplicate();
        let entry = check_prior(outcome.into_entry(), user.id, LedgerKind::Wake)?;
        if !deduped {
            info!(%user_id, idempotency_key = key, steps = entry.deltas.steps, "Wake committed");
        }
        self.finish_wake(&user, key, entry, deduped).await
    }

    /// One optimistic attempt: read, gate, commit guarded by the wake state.
    async fn wake_once(&self, user_id: Uuid, key: &str) -> std::result::Result<CommitOutcome, Attempt> {
        let user = self.load_user(user_id).await?;
        let economy = self.economy().await?;
        let now = self.clock.now();

        let (_, eligibility) =
            rules::evaluate_wake(now, user.wake, &economy, user.is_premium(now));
        if !eligibility.available {
            // A same-key request may have committed since the replay lookup;
            // the cooldown it started is then our own.
            if let Some(prior) = self.find_prior(key, user.id, LedgerKind::Wake).await? {
                return Ok(CommitOutcome::Duplicate(prior));
            }
            return Err(ActionError::ActionUnavailable(eligibility).into());
        }

        let next = rules::advance(now, user.wake, &economy);
        let entry = NewLedgerEntry::new(
            user.id,
            LedgerKind::Wake,
            Deltas::steps(economy.steps_per_wake),
            now,
        )
        .with_key(key)
        .with_meta(json!({
            "free_slot": eligibility.remaining_free_actions > 0,
            "daily_free_count": next.daily_free_count,
        }));

        Ok(self
            .stores
            .accounts
            .commit(entry, AccountChange::wake(user.wake, next))
            .await?)
    }

    async fn finish_wake(
        &self,
        actor: &User,
        key: &str,
        entry: LedgerEntry,
        deduped: bool,
    ) -> Result<WakeOutcome> {
        let economy = self.economy().await?;
        let referral_entries = self.cascade(actor, key, &economy).await;

        let user = self.load_user(actor.id).await?;
        let now = self.clock.now();
        let (_, eligibility) =
            rules::evaluate_wake(now, user.wake, &economy, user.is_premium(now));

        Ok(WakeOutcome {
            deduped,
            entry,
            balances: user.balances,
            eligibility,
            referral_entries,
        })
    }

    /// Grant level-1 and level-2 referral rewards for an action under `key`.
    ///
    /// Grants carry keys derived from `key`, so running the cascade again for
    /// the same action only fills in whatever is missing. Failures are logged
    /// and skipped.
    pub(crate) async fn cascade(
        &self,
        actor: &User,
        key: &str,
        economy: &EconomyConfig,
    ) -> Vec<LedgerEntry> {
        let level1 = match actor.referrer_id {
            Some(id) => self.lookup_referrer(id, actor.id, 1).await,
            None => None,
        };
        let level2 = match level1.as_ref().and_then(|l1| l1.referrer_id) {
            Some(id) => self.lookup_referrer(id, actor.id, 2).await,
            None => None,
        };

        let grants = compute_referral_grants(
            economy.sandwich_per_ref_action,
            economy.coffee_per_ref2_action,
            level1.is_some(),
            level2.is_some(),
        );

        let now = self.clock.now();
        let mut entries = Vec::new();
        for (level, deltas) in grants.non_zero() {
            let target = match level {
                rules::CascadeLevel::Level1 => level1.as_ref(),
                rules::CascadeLevel::Level2 => level2.as_ref(),
            };
            let Some(target) = target else { continue };

            let derived = level.derive_key(key);
            let entry = NewLedgerEntry::new(target.id, level.ledger_kind(), deltas, now)
                .with_key(derived.clone())
                .with_meta(json!({
                    "source_user_id": actor.id,
                    "source_key": key,
                }));

            match self.stores.accounts.commit(entry, AccountChange::none()).await {
                Ok(CommitOutcome::Applied(entry)) => {
                    info!(
                        referrer_id = %target.id,
                        source_user_id = %actor.id,
                        kind = %entry.kind,
                        "Referral reward granted"
                    );
                    entries.push(entry);
                }
                Ok(CommitOutcome::Duplicate(entry)) => {
                    match check_prior(entry, target.id, level.ledger_kind()) {
                        Ok(entry) => {
                            debug!(idempotency_key = %derived, "Referral reward already granted");
                            entries.push(entry);
                        }
                        Err(e) => {
                            warn!(
                                referrer_id = %target.id,
                                idempotency_key = %derived,
                                error = %e,
                                "Derived key held by another entry, skipping"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        referrer_id = %target.id,
                        idempotency_key = %derived,
                        error = %e,
                        "Referral reward failed, skipping"
                    );
                }
            }
        }
        entries
    }

    async fn lookup_referrer(&self, id: Uuid, actor_id: Uuid, level: u8) -> Option<User> {
        match self.stores.accounts.get_user(id).await {
            Ok(Some(user)) if user.id != actor_id => Some(user),
            Ok(Some(_)) => None,
            Ok(None) => {
                warn!(referrer_id = %id, %actor_id, level, "Referrer missing, skipping level");
                None
            }
            Err(e) => {
                warn!(referrer_id = %id, %actor_id, level, error = %e, "Referrer lookup failed, skipping level");
                None
            }
        }
    }

    /// Current wake eligibility, after the daily reset.
    pub async fn eligibility(&self, user_id: Uuid) -> Result<Eligibility> {
        let user = self.load_user(user_id).await?;
        let economy = self.economy().await?;
        let now = self.clock.now();
        Ok(rules::evaluate_wake(now, user.wake, &economy, user.is_premium(now)).1)
    }
}
