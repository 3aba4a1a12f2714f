//! Mission completion and the shared reward grant.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::engine::{check_prior, ActionEngine};
use super::error::{ActionError, Result};
use crate::clients::OracleError;
use crate::model::{
    Balances, LedgerEntry, LedgerKind, Mission, MissionKind, NewLedgerEntry, User,
    UserMissionStatus,
};
use crate::storage::{AccountChange, CommitOutcome, StorageError};
use crate::utils::RateLimitedOp;

/// Result of a mission completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionOutcome {
    pub deduped: bool,
    pub entry: LedgerEntry,
    pub balances: Balances,
}

impl ActionEngine {
    /// Complete a non-payment mission and grant its reward.
    pub async fn complete_mission(
        &self,
        user_id: Uuid,
        idempotency_key: Option<&str>,
        mission_id: Uuid,
    ) -> Result<MissionOutcome> {
        let key = self.require_key(idempotency_key)?;
        self.throttle(RateLimitedOp::Mission, user_id).await?;
        let user = self.load_user(user_id).await?;

        if let Some(replayed) = self.replayed_completion(&user, key, mission_id).await? {
            return Ok(replayed);
        }

        let mission = self
            .stores
            .missions
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| ActionError::NotFound(format!("mission {mission_id}")))?;
        let now = self.clock.now();
        if !mission.is_available(now) {
            return Err(ActionError::NotFound(format!("mission {mission_id} is not active")));
        }

        let progress = self
            .stores
            .missions
            .get_user_mission(user.id, mission.id)
            .await?;
        if progress.is_some_and(|p| p.status == UserMissionStatus::Completed) {
            // The completion may be a same-key request that landed after the
            // replay lookup.
            if let Some(replayed) = self.replayed_completion(&user, key, mission_id).await? {
                return Ok(replayed);
            }
            return Err(ActionError::Conflict(format!(
                "mission {mission_id} already completed"
            )));
        }

        self.check_mission_precondition(&user, &mission).await?;

        let outcome = self
            .grant_mission_reward(&user, &mission, key, json!({}))
            .await?;
        let deduped = outcome.is_duplicate();
        let entry = check_prior(outcome.into_entry(), user.id, LedgerKind::MissionReward)?;
        if !deduped {
            info!(%user_id, %mission_id, mission_type = mission.kind.type_name(), "Mission completed");
        }

        let user = self.load_user(user_id).await?;
        Ok(MissionOutcome {
            deduped,
            entry,
            balances: user.balances,
        })
    }

    async fn replayed_completion(
        &self,
        user: &User,
        key: &str,
        mission_id: Uuid,
    ) -> Result<Option<MissionOutcome>> {
        let Some(prior) = self
            .find_prior(key, user.id, LedgerKind::MissionReward)
            .await?
        else {
            return Ok(None);
        };
        if mission_of(&prior) != Some(mission_id) {
            return Err(ActionError::Conflict(
                "idempotency key already used for another mission".to_string(),
            ));
        }
        debug!(user_id = %user.id, %mission_id, idempotency_key = key, "Mission completion replayed");
        let balances = self.load_user(user.id).await?.balances;
        Ok(Some(MissionOutcome {
            deduped: true,
            entry: prior,
            balances,
        }))
    }

    async fn check_mission_precondition(&self, user: &User, mission: &Mission) -> Result<()> {
        match &mission.kind {
            MissionKind::JoinChannel(payload) => {
                let channel = payload
                    .channel_id
                    .as_deref()
                    .or(self.telegram.required_channel_id.as_deref())
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        ActionError::PreconditionFailed("no channel configured".to_string())
                    })?;
                match self.membership.is_member(channel, user.external_id).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(ActionError::PreconditionFailed(
                        "user is not a channel member or the bot has insufficient access"
                            .to_string(),
                    )),
                    Err(OracleError::NotConfigured(what)) => Err(ActionError::PreconditionFailed(
                        format!("membership check unavailable: {what} not set"),
                    )),
                    Err(e) => Err(e.into()),
                }
            }
            MissionKind::ConnectWallet => {
                if user.wallet_address.is_none() {
                    return Err(ActionError::PreconditionFailed(
                        "connect a TON wallet first".to_string(),
                    ));
                }
                Ok(())
            }
            MissionKind::ManualConfirm => Ok(()),
            MissionKind::TonPayment(_) => Err(ActionError::PreconditionFailed(
                "payment missions complete through the payment flow".to_string(),
            )),
        }
    }

    /// Commit the mission reward together with the completion mark.
    pub(crate) async fn grant_mission_reward(
        &self,
        user: &User,
        mission: &Mission,
        key: &str,
        extra_meta: Value,
    ) -> Result<CommitOutcome> {
        let mut meta = json!({
            "mission_id": mission.id,
            "mission_type": mission.kind.type_name(),
        });
        if let (Value::Object(meta), Value::Object(extra)) = (&mut meta, extra_meta) {
            meta.extend(extra);
        }

        let entry = NewLedgerEntry::new(
            user.id,
            LedgerKind::MissionReward,
            mission.reward,
            self.clock.now(),
        )
        .with_key(key)
        .with_meta(meta);

        self.stores
            .accounts
            .commit(entry, AccountChange::complete_mission(mission.id))
            .await
            .map_err(|e| match e {
                StorageError::MissionAlreadyCompleted(id) => {
                    ActionError::Conflict(format!("mission {id} already completed"))
                }
                other => other.into(),
            })
    }
}

fn mission_of(entry: &LedgerEntry) -> Option<Uuid> {
    entry
        .meta
        .get("mission_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}
