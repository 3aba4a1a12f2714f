//! TON payment missions.
//!
//! ```text
//! create_payment_intent ──► created ──sync──► pending ──► paid   (reward granted)
//!                              │                  │
//!                              └──────────────────┴──────► failed (user mission reset)
//! ```
//!
//! Every transition is a compare-and-swap on the purchase status, so
//! concurrent syncs converge on one winner. The reward carries the key
//! `purchase:{invoice_id}`; re-syncing a paid purchase replays the grant and
//! the ledger turns it into a no-op.

use chrono::Duration;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::ActionEngine;
use super::error::{ActionError, Result};
use crate::model::{
    LedgerEntry, Mission, MissionKind, PaymentObservation, Purchase, PurchaseStatus, User,
    UserMissionStatus,
};
use crate::storage::StorageError;
use crate::ton::{
    classify, find_match, format_nano, parse_ton_amount, payment_comment, ChainTransaction,
    Expectation, Verdict, CONFIRMATIONS_PENDING,
};
use crate::utils::RateLimitedOp;

pub const TON_PROVIDER: &str = "ton";

/// How long wallet instructions stay valid.
pub const INTENT_TTL_SECS: i64 = 300;

/// Payment instructions returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntent {
    pub purchase: Purchase,
    /// Decimal TON form of `purchase.amount_nano`.
    pub amount_ton: String,
    /// Unix seconds after which the wallet should refuse the request.
    pub valid_until: i64,
    /// An existing purchase was returned instead of creating a new one.
    pub reused: bool,
}

/// State of a purchase after a sync or confirm call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSync {
    pub purchase: Purchase,
    /// This call moved the purchase to `paid`.
    pub newly_paid: bool,
    /// Reward entry once the purchase is paid.
    pub reward: Option<LedgerEntry>,
}

impl PaymentSync {
    pub fn status(&self) -> PurchaseStatus {
        self.purchase.status
    }
}

/// Totals of one poller sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub paid: usize,
    pub failed: usize,
    pub errors: usize,
}

impl ActionEngine {
    /// Create (or return the existing) purchase for a payment mission.
    pub async fn create_payment_intent(
        &self,
        user_id: Uuid,
        idempotency_key: Option<&str>,
        mission_id: Uuid,
    ) -> Result<PaymentIntent> {
        let key = self.require_key(idempotency_key)?;
        self.throttle(RateLimitedOp::Payment, user_id).await?;
        let user = self.load_user(user_id).await?;
        let now = self.clock.now();

        if let Some(existing) = self.stores.purchases.find_by_intent_key(key).await? {
            if existing.user_id != user.id || existing.mission_id != mission_id {
                return Err(ActionError::Conflict(
                    "idempotency key already used for another payment".to_string(),
                ));
            }
            return Ok(self.intent_view(existing, true));
        }

        let mission = self
            .stores
            .missions
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| ActionError::NotFound(format!("mission {mission_id}")))?;
        if !mission.is_available(now) {
            return Err(ActionError::NotFound(format!("mission {mission_id} is not active")));
        }
        let MissionKind::TonPayment(payload) = &mission.kind else {
            return Err(ActionError::Validation(format!(
                "mission {mission_id} is not a payment mission"
            )));
        };

        if let Some(active) = self.stores.purchases.find_active(user.id, mission.id).await? {
            debug!(%user_id, invoice_id = %active.invoice_id, status = %active.status, "Reusing purchase");
            return Ok(self.intent_view(active, true));
        }
        let progress = self
            .stores
            .missions
            .get_user_mission(user.id, mission.id)
            .await?;
        if progress.is_some_and(|p| p.status == UserMissionStatus::Completed) {
            return Err(ActionError::Conflict(format!(
                "mission {mission_id} already completed"
            )));
        }

        let receiver = payload
            .receiver
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.ton.receiver.clone());
        if receiver.is_empty() {
            return Err(ActionError::Internal("TON receiver not configured".to_string()));
        }
        let amount_raw = payload
            .amount_ton
            .as_deref()
            .unwrap_or(&self.ton.activation_amount);
        let amount_nano = parse_ton_amount(amount_raw)
            .map_err(|e| ActionError::Internal(format!("invalid payment amount: {e}")))?;

        let invoice_id = Uuid::new_v4().to_string();
        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id: user.id,
            mission_id: mission.id,
            provider: TON_PROVIDER.to_string(),
            status: PurchaseStatus::Created,
            comment: payment_comment(&user.id, &invoice_id),
            invoice_id,
            intent_key: Some(key.to_string()),
            receiver,
            sender: None,
            amount_nano,
            tx_hash: None,
            tx_lt: None,
            confirmations: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };

        match self.stores.purchases.insert(&purchase).await {
            Ok(()) => {}
            Err(StorageError::DuplicateKey(_)) => {
                // Lost a race with the same key.
                return match self.stores.purchases.find_by_intent_key(key).await? {
                    Some(existing) if existing.user_id == user.id => {
                        Ok(self.intent_view(existing, true))
                    }
                    _ => Err(ActionError::Conflict("duplicate payment intent".to_string())),
                };
            }
            Err(e) => return Err(e.into()),
        }
        self.stores
            .missions
            .mark_pending(user.id, mission.id, now)
            .await?;

        info!(%user_id, %mission_id, invoice_id = %purchase.invoice_id, amount_nano, "Payment intent created");
        Ok(self.intent_view(purchase, false))
    }

    fn intent_view(&self, purchase: Purchase, reused: bool) -> PaymentIntent {
        PaymentIntent {
            amount_ton: format_nano(purchase.amount_nano),
            valid_until: (self.clock.now() + Duration::seconds(INTENT_TTL_SECS)).timestamp(),
            purchase,
            reused,
        }
    }

    /// Look for the purchase's transfer in the receiver's recent history.
    pub async fn sync_payment(&self, user_id: Uuid, invoice_id: &str) -> Result<PaymentSync> {
        self.throttle(RateLimitedOp::Payment, user_id).await?;
        let user = self.load_user(user_id).await?;
        let purchase = self.owned_purchase(&user, invoice_id).await?;
        self.sync_purchase(&user, purchase).await
    }

    /// Validate one transaction, by hash, against the purchase.
    ///
    /// The sender must be the user's linked wallet.
    pub async fn confirm_payment(
        &self,
        user_id: Uuid,
        invoice_id: &str,
        tx_hash: &str,
    ) -> Result<PaymentSync> {
        let tx_hash = tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(ActionError::Validation("tx_hash is required".to_string()));
        }
        self.throttle(RateLimitedOp::Payment, user_id).await?;
        let user = self.load_user(user_id).await?;
        let purchase = self.owned_purchase(&user, invoice_id).await?;
        if let Some(done) = self.settled(&user, &purchase).await? {
            return Ok(done);
        }

        let wallet = user.wallet_address.clone().ok_or_else(|| {
            ActionError::PreconditionFailed("connect a TON wallet first".to_string())
        })?;

        let tx = match self.chain.get_transaction(tx_hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                debug!(invoice_id, tx_hash, "Transaction not visible yet");
                let observation = PaymentObservation {
                    tx_hash: Some(tx_hash.to_string()),
                    confirmations: purchase.confirmations,
                    ..PaymentObservation::default()
                };
                return self.keep_pending(&user, purchase, observation).await;
            }
            Err(e) => {
                warn!(invoice_id, tx_hash, error = %e, "Chain oracle unavailable, payment stays pending");
                return self.keep_pending_unchanged(&user, purchase).await;
            }
        };

        // The invoice comment is the only binding between a transfer and one
        // purchase; a transfer without it could be replayed against any invoice.
        if tx.comment.as_deref() != Some(purchase.comment.as_str()) {
            return Err(ActionError::Validation(
                "transaction is not bound to this invoice".to_string(),
            ));
        }

        let expected = Expectation {
            receiver: &purchase.receiver,
            amount_nano: purchase.amount_nano,
            sender: Some(&wallet),
            min_confirmations: self.ton.min_confirmations,
        };
        let verdict = classify(&tx, &expected);
        self.apply_verdict(&user, purchase, &tx, verdict).await
    }

    /// Sync up to `batch` open purchases, `concurrency` at a time.
    pub async fn sync_open_purchases(&self, batch: u32, concurrency: usize) -> Result<SweepReport> {
        let open = self.stores.purchases.list_open(batch).await?;
        let checked = open.len();

        let results: Vec<Result<PaymentSync>> = stream::iter(open)
            .map(|purchase| async move {
                let user = self.load_user(purchase.user_id).await?;
                self.sync_purchase(&user, purchase).await
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport {
            checked,
            ..SweepReport::default()
        };
        for result in results {
            match result {
                Ok(sync) if sync.newly_paid => report.paid += 1,
                Ok(sync) if sync.status() == PurchaseStatus::Failed => report.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Purchase sync failed");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    async fn owned_purchase(&self, user: &User, invoice_id: &str) -> Result<Purchase> {
        self.stores
            .purchases
            .get_by_invoice(invoice_id)
            .await?
            .filter(|p| p.user_id == user.id)
            .ok_or_else(|| ActionError::NotFound(format!("invoice {invoice_id}")))
    }

    async fn sync_purchase(&self, user: &User, purchase: Purchase) -> Result<PaymentSync> {
        if let Some(done) = self.settled(user, &purchase).await? {
            return Ok(done);
        }

        let transactions = match self
            .chain
            .list_transactions(&purchase.receiver, self.ton.transaction_limit)
            .await
        {
            Ok(txs) => txs,
            Err(e) => {
                warn!(invoice_id = %purchase.invoice_id, error = %e, "Chain oracle unavailable, payment stays pending");
                return self.keep_pending_unchanged(user, purchase).await;
            }
        };

        let Some(tx) = find_match(
            &transactions,
            &purchase.receiver,
            &purchase.comment,
            purchase.amount_nano,
        ) else {
            debug!(invoice_id = %purchase.invoice_id, scanned = transactions.len(), "No matching transfer yet");
            return self.keep_pending_unchanged(user, purchase).await;
        };

        let expected = Expectation {
            receiver: &purchase.receiver,
            amount_nano: purchase.amount_nano,
            sender: None,
            min_confirmations: self.ton.min_confirmations,
        };
        let verdict = classify(tx, &expected);
        let tx = tx.clone();
        self.apply_verdict(user, purchase, &tx, verdict).await
    }

    /// Terminal purchases short-circuit. A paid one replays its reward grant.
    async fn settled(&self, user: &User, purchase: &Purchase) -> Result<Option<PaymentSync>> {
        match purchase.status {
            PurchaseStatus::Paid => {
                let reward = self.grant_purchase_reward(user, purchase).await?;
                Ok(Some(PaymentSync {
                    purchase: purchase.clone(),
                    newly_paid: false,
                    reward,
                }))
            }
            PurchaseStatus::Failed => Ok(Some(PaymentSync {
                purchase: purchase.clone(),
                newly_paid: false,
                reward: None,
            })),
            PurchaseStatus::Created | PurchaseStatus::Pending => Ok(None),
        }
    }

    async fn apply_verdict(
        &self,
        user: &User,
        purchase: Purchase,
        tx: &ChainTransaction,
        verdict: Verdict,
    ) -> Result<PaymentSync> {
        let mut observation = PaymentObservation {
            tx_hash: Some(tx.hash.clone()).filter(|h| !h.is_empty()),
            tx_lt: tx.lt.clone(),
            sender: tx.sender.clone(),
            confirmations: tx.confirmations,
            reason: None,
        };

        match verdict {
            Verdict::Pending { confirmations } => {
                debug!(invoice_id = %purchase.invoice_id, confirmations, "Awaiting confirmations");
                observation.reason = Some(CONFIRMATIONS_PENDING.to_string());
                self.keep_pending(user, purchase, observation).await
            }
            Verdict::Declined(reason) => {
                observation.reason = Some(reason.as_str().to_string());
                let moved = self
                    .stores
                    .purchases
                    .transition(
                        &purchase.invoice_id,
                        &PurchaseStatus::OPEN,
                        PurchaseStatus::Failed,
                        &observation,
                        self.clock.now(),
                    )
                    .await?;
                let Some(failed) = moved else {
                    return self.reload_settled(user, &purchase.invoice_id).await;
                };

                self.stores
                    .missions
                    .clear_pending(user.id, failed.mission_id)
                    .await?;
                warn!(user_id = %user.id, invoice_id = %failed.invoice_id, reason = reason.as_str(), "Payment declined");
                self.notify_best_effort(
                    user.external_id,
                    &format!(
                        "TON payment declined ({}). You can start the mission again.",
                        reason.as_str()
                    ),
                )
                .await;
                Ok(PaymentSync {
                    purchase: failed,
                    newly_paid: false,
                    reward: None,
                })
            }
            Verdict::Confirmed => {
                let moved = match self
                    .stores
                    .purchases
                    .transition(
                        &purchase.invoice_id,
                        &PurchaseStatus::OPEN,
                        PurchaseStatus::Paid,
                        &observation,
                        self.clock.now(),
                    )
                    .await
                {
                    Ok(moved) => moved,
                    Err(StorageError::DuplicateKey(hash)) => {
                        warn!(user_id = %user.id, invoice_id = %purchase.invoice_id, tx_hash = %hash, "Transaction already paid another purchase");
                        return Err(ActionError::Conflict(
                            "transaction already paid another purchase".to_string(),
                        ));
                    }
                    Err(e) => return Err(e.into()),
                };
                let Some(paid) = moved else {
                    return self.reload_settled(user, &purchase.invoice_id).await;
                };

                info!(user_id = %user.id, invoice_id = %paid.invoice_id, tx_hash = ?paid.tx_hash, "Payment confirmed");
                let reward = self.grant_purchase_reward(user, &paid).await?;
                self.notify_best_effort(
                    user.external_id,
                    &format!(
                        "TON payment of {} TON confirmed. Mission reward granted.",
                        format_nano(paid.amount_nano)
                    ),
                )
                .await;
                Ok(PaymentSync {
                    purchase: paid,
                    newly_paid: true,
                    reward,
                })
            }
        }
    }

    /// Record the observation and stay (or move to) `pending`.
    async fn keep_pending(
        &self,
        user: &User,
        purchase: Purchase,
        observation: PaymentObservation,
    ) -> Result<PaymentSync> {
        let moved = self
            .stores
            .purchases
            .transition(
                &purchase.invoice_id,
                &PurchaseStatus::OPEN,
                PurchaseStatus::Pending,
                &observation,
                self.clock.now(),
            )
            .await?;
        match moved {
            Some(pending) => Ok(PaymentSync {
                purchase: pending,
                newly_paid: false,
                reward: None,
            }),
            None => self.reload_settled(user, &purchase.invoice_id).await,
        }
    }

    async fn keep_pending_unchanged(&self, user: &User, purchase: Purchase) -> Result<PaymentSync> {
        let observation = PaymentObservation {
            confirmations: purchase.confirmations,
            ..PaymentObservation::default()
        };
        self.keep_pending(user, purchase, observation).await
    }

    /// Another caller moved the purchase first; report what it settled on.
    async fn reload_settled(&self, user: &User, invoice_id: &str) -> Result<PaymentSync> {
        let current = self
            .stores
            .purchases
            .get_by_invoice(invoice_id)
            .await?
            .ok_or_else(|| ActionError::NotFound(format!("invoice {invoice_id}")))?;
        match self.settled(user, &current).await? {
            Some(done) => Ok(done),
            None => Ok(PaymentSync {
                purchase: current,
                newly_paid: false,
                reward: None,
            }),
        }
    }

    /// Grant the mission reward tied to a paid purchase, at most once.
    async fn grant_purchase_reward(
        &self,
        user: &User,
        purchase: &Purchase,
    ) -> Result<Option<LedgerEntry>> {
        let Some(mission) = self.stores.missions.get_mission(purchase.mission_id).await? else {
            warn!(invoice_id = %purchase.invoice_id, mission_id = %purchase.mission_id, "Paid purchase references a missing mission");
            return Ok(None);
        };
        self.grant_for_mission(user, &mission, purchase).await
    }

    async fn grant_for_mission(
        &self,
        user: &User,
        mission: &Mission,
        purchase: &Purchase,
    ) -> Result<Option<LedgerEntry>> {
        let meta = json!({
            "invoice_id": purchase.invoice_id,
            "tx_hash": purchase.tx_hash,
        });
        match self
            .grant_mission_reward(user, mission, &purchase.reward_key(), meta)
            .await
        {
            Ok(outcome) => {
                if !outcome.is_duplicate() {
                    info!(user_id = %user.id, mission_id = %mission.id, invoice_id = %purchase.invoice_id, "Payment mission reward granted");
                }
                Ok(Some(outcome.into_entry()))
            }
            Err(ActionError::Conflict(reason)) => {
                warn!(invoice_id = %purchase.invoice_id, %reason, "Mission already completed elsewhere, no reward");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
