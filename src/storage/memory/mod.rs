//! In-memory storage.
//!
//! One lock guards all tables, so [`AccountStore::commit`] is atomic in the
//! same way the SQLite transaction is. Used for the `memory` storage type and
//! as the test double for the engine; the failure switches let tests exercise
//! error paths.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccountChange, AccountStore, CommitOutcome, LedgerStore, MissionStore, PurchaseStore, Result,
    StorageError,
};
use crate::model::{
    Balances, LedgerEntry, Mission, NewLedgerEntry, NewUser, PaymentObservation, Purchase,
    PurchaseStatus, User, UserMission, UserMissionStatus, WakeState,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    ledger: Vec<LedgerEntry>,
    /// Idempotency key → index into `ledger`.
    keys: HashMap<String, usize>,
    missions: HashMap<Uuid, Mission>,
    user_missions: HashMap<(Uuid, Uuid), UserMission>,
    purchases: Vec<Purchase>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_on_commit: RwLock<bool>,
    fail_on_read: RwLock<bool>,
    stale_commits: RwLock<u32>,
}

fn unavailable() -> StorageError {
    StorageError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every commit fail with a database error.
    pub async fn set_fail_on_commit(&self, fail: bool) {
        *self.fail_on_commit.write().await = fail;
    }

    /// Make user, ledger and mission reads fail with a database error.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Make the next `count` wake commits fail with `StaleState`.
    pub async fn set_stale_commits(&self, count: u32) {
        *self.stale_commits.write().await = count;
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(unavailable());
        }
        Ok(())
    }

    /// Number of ledger entries across all users.
    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }

    /// Overwrite a user's wake state, bypassing the ledger.
    pub async fn set_wake_state(&self, user_id: Uuid, wake: WakeState) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserNotFound(user_id))?;
        user.wake = wake;
        Ok(())
    }

    /// Overwrite a user's balances, bypassing the ledger.
    pub async fn set_balances(&self, user_id: Uuid, balances: Balances) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserNotFound(user_id))?;
        user.balances = balances;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn upsert_user(&self, new: NewUser) -> Result<User> {
        let mut state = self.state.write().await;

        if let Some(user) = state
            .users
            .values_mut()
            .find(|u| u.external_id == new.claim.external_id)
        {
            user.username = new.claim.username;
            user.display_name = new.claim.display_name;
            user.locale = new.claim.locale;
            user.updated_at = new.now;
            return Ok(user.clone());
        }

        if state.users.values().any(|u| u.referral_code == new.referral_code) {
            return Err(StorageError::DuplicateKey(new.referral_code));
        }

        let user = User {
            id: new.id,
            external_id: new.claim.external_id,
            username: new.claim.username,
            display_name: new.claim.display_name,
            locale: new.claim.locale,
            referral_code: new.referral_code,
            referrer_id: new.referrer_id,
            balances: Balances::default(),
            wake: WakeState::default(),
            premium_until: None,
            wallet_address: None,
            created_at: new.now,
            updated_at: new.now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.check_read().await?;
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<User>> {
        self.check_read().await?;
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        self.check_read().await?;
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.referral_code == code)
            .cloned())
    }

    async fn set_wallet(
        &self,
        user_id: Uuid,
        address: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserNotFound(user_id))?;
        user.wallet_address = address;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn set_premium_until(
        &self,
        user_id: Uuid,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserNotFound(user_id))?;
        user.premium_until = until;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn commit(&self, entry: NewLedgerEntry, change: AccountChange) -> Result<CommitOutcome> {
        if *self.fail_on_commit.read().await {
            return Err(unavailable());
        }
        let mut state = self.state.write().await;

        if let Some(key) = &entry.idempotency_key {
            if let Some(&index) = state.keys.get(key) {
                return Ok(CommitOutcome::Duplicate(state.ledger[index].clone()));
            }
        }

        if change.wake.is_some() {
            let mut stale = self.stale_commits.write().await;
            if *stale > 0 {
                *stale -= 1;
                return Err(StorageError::StaleState);
            }
        }

        // Validate everything before touching state.
        let user = state
            .users
            .get(&entry.user_id)
            .ok_or(StorageError::UserNotFound(entry.user_id))?;

        let mut wake = user.wake;
        if let Some(transition) = change.wake {
            if user.wake != transition.expected {
                return Err(StorageError::StaleState);
            }
            wake = transition.next;
        }

        if let Some(mission_id) = change.complete_mission {
            let completed = state
                .user_missions
                .get(&(entry.user_id, mission_id))
                .is_some_and(|um| um.status == UserMissionStatus::Completed);
            if completed {
                return Err(StorageError::MissionAlreadyCompleted(mission_id));
            }
        }

        let mut balances = user.balances;
        balances
            .apply(&entry.deltas)
            .map_err(StorageError::InsufficientBalance)?;

        let now = entry.created_at;
        if let Some(mission_id) = change.complete_mission {
            state.user_missions.insert(
                (entry.user_id, mission_id),
                UserMission {
                    user_id: entry.user_id,
                    mission_id,
                    status: UserMissionStatus::Completed,
                    completed_at: Some(now),
                    updated_at: now,
                },
            );
        }

        if let Some(user) = state.users.get_mut(&entry.user_id) {
            user.balances = balances;
            user.wake = wake;
            user.updated_at = now;
        }

        let stored = entry.into_entry(Uuid::new_v4());
        if let Some(key) = &stored.idempotency_key {
            let index = state.ledger.len();
            state.keys.insert(key.clone(), index);
        }
        state.ledger.push(stored.clone());
        Ok(CommitOutcome::Applied(stored))
    }

    async fn top_by_steps(&self, limit: u32) -> Result<Vec<User>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| {
            b.balances
                .steps
                .cmp(&a.balances.steps)
                .then(a.created_at.cmp(&b.created_at))
        });
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn rank_of(&self, user_id: Uuid) -> Result<Option<u64>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let Some(user) = state.users.get(&user_id) else {
            return Ok(None);
        };
        let ahead = state
            .users
            .values()
            .filter(|u| u.balances.steps > user.balances.steps)
            .count();
        Ok(Some(ahead as u64 + 1))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_by_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        self.check_read().await?;
        let state = self.state.read().await;
        Ok(state.keys.get(key).map(|&index| state.ledger[index].clone()))
    }

    async fn history(&self, user_id: Uuid, limit: u32) -> Result<Vec<LedgerEntry>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order (newest first) among equal timestamps.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn upsert_mission(&self, mission: &Mission) -> Result<()> {
        let mut state = self.state.write().await;
        let created_at = state
            .missions
            .get(&mission.id)
            .map(|m| m.created_at)
            .unwrap_or(mission.created_at);
        state.missions.insert(
            mission.id,
            Mission {
                created_at,
                ..mission.clone()
            },
        );
        Ok(())
    }

    async fn get_mission(&self, id: Uuid) -> Result<Option<Mission>> {
        self.check_read().await?;
        Ok(self.state.read().await.missions.get(&id).cloned())
    }

    async fn list_available(&self, now: DateTime<Utc>) -> Result<Vec<Mission>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut missions: Vec<Mission> = state
            .missions
            .values()
            .filter(|m| m.is_available(now))
            .cloned()
            .collect();
        missions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(missions)
    }

    async fn get_user_mission(&self, user_id: Uuid, mission_id: Uuid) -> Result<Option<UserMission>> {
        self.check_read().await?;
        Ok(self
            .state
            .read()
            .await
            .user_missions
            .get(&(user_id, mission_id))
            .cloned())
    }

    async fn list_user_missions(&self, user_id: Uuid) -> Result<Vec<UserMission>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut missions: Vec<UserMission> = state
            .user_missions
            .values()
            .filter(|um| um.user_id == user_id)
            .cloned()
            .collect();
        missions.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(missions)
    }

    async fn mark_pending(&self, user_id: Uuid, mission_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .user_missions
            .entry((user_id, mission_id))
            .or_insert(UserMission {
                user_id,
                mission_id,
                status: UserMissionStatus::Pending,
                completed_at: None,
                updated_at: now,
            });
        Ok(())
    }

    async fn clear_pending(&self, user_id: Uuid, mission_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let pending = state
            .user_missions
            .get(&(user_id, mission_id))
            .is_some_and(|um| um.status == UserMissionStatus::Pending);
        if pending {
            state.user_missions.remove(&(user_id, mission_id));
        }
        Ok(())
    }
}

#[async_trait]
impl PurchaseStore for MemoryStore {
    async fn insert(&self, purchase: &Purchase) -> Result<()> {
        let mut state = self.state.write().await;
        let taken = state.purchases.iter().any(|p| {
            p.invoice_id == purchase.invoice_id
                || (purchase.intent_key.is_some() && p.intent_key == purchase.intent_key)
        });
        if taken {
            return Err(StorageError::DuplicateKey(purchase.invoice_id.clone()));
        }
        state.purchases.push(purchase.clone());
        Ok(())
    }

    async fn get_by_invoice(&self, invoice_id: &str) -> Result<Option<Purchase>> {
        let state = self.state.read().await;
        Ok(state
            .purchases
            .iter()
            .find(|p| p.invoice_id == invoice_id)
            .cloned())
    }

    async fn find_by_intent_key(&self, key: &str) -> Result<Option<Purchase>> {
        let state = self.state.read().await;
        Ok(state
            .purchases
            .iter()
            .find(|p| p.intent_key.as_deref() == Some(key))
            .cloned())
    }

    async fn find_active(&self, user_id: Uuid, mission_id: Uuid) -> Result<Option<Purchase>> {
        let state = self.state.read().await;
        Ok(state
            .purchases
            .iter()
            .filter(|p| {
                p.user_id == user_id
                    && p.mission_id == mission_id
                    && p.status != PurchaseStatus::Failed
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn transition(
        &self,
        invoice_id: &str,
        from: &[PurchaseStatus],
        to: PurchaseStatus,
        observation: &PaymentObservation,
        now: DateTime<Utc>,
    ) -> Result<Option<Purchase>> {
        let mut state = self.state.write().await;
        if to == PurchaseStatus::Paid {
            if let Some(hash) = &observation.tx_hash {
                let claimed = state.purchases.iter().any(|p| {
                    p.status == PurchaseStatus::Paid
                        && p.invoice_id != invoice_id
                        && p.tx_hash.as_ref() == Some(hash)
                });
                if claimed {
                    return Err(StorageError::DuplicateKey(hash.clone()));
                }
            }
        }
        let Some(purchase) = state
            .purchases
            .iter_mut()
            .find(|p| p.invoice_id == invoice_id && from.contains(&p.status))
        else {
            return Ok(None);
        };

        purchase.status = to;
        purchase.updated_at = now;
        purchase.confirmations = observation.confirmations;
        if observation.tx_hash.is_some() {
            purchase.tx_hash = observation.tx_hash.clone();
        }
        if observation.tx_lt.is_some() {
            purchase.tx_lt = observation.tx_lt.clone();
        }
        if observation.sender.is_some() {
            purchase.sender = observation.sender.clone();
        }
        if observation.reason.is_some() {
            purchase.failure_reason = observation.reason.clone();
        }
        if to == PurchaseStatus::Paid {
            purchase.paid_at = Some(now);
        }
        Ok(Some(purchase.clone()))
    }

    async fn list_open(&self, limit: u32) -> Result<Vec<Purchase>> {
        let state = self.state.read().await;
        let mut open: Vec<Purchase> = state
            .purchases
            .iter()
            .filter(|p| PurchaseStatus::OPEN.contains(&p.status))
            .cloned()
            .collect();
        open.sort_by(|a, b| {
            (a.updated_at, a.created_at).cmp(&(b.updated_at, b.created_at))
        });
        open.truncate(limit as usize);
        Ok(open)
    }
}

#[cfg(test)]
mod tests;
