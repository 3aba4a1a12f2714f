//! Read-only views for the request layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::engine::ActionEngine;
use super::error::Result;
use crate::model::{Balances, Deltas, LedgerEntry, UserMissionStatus};
use crate::rules::{self, Eligibility};

pub const MAX_LEADERBOARD_LIMIT: u32 = 100;
pub const MAX_HISTORY_LIMIT: u32 = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub external_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub referral_code: String,
    pub balances: Balances,
    pub eligibility: Eligibility,
    pub wallet_address: Option<String>,
    pub is_premium: bool,
    pub premium_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub mission_type: &'static str,
    pub title: String,
    pub description: String,
    pub reward: Deltas,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    /// The caller's progress, if any.
    pub status: Option<UserMissionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: u64,
    pub user_id: Uuid,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub steps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub top: Vec<LeaderboardRow>,
    /// The caller's rank by steps.
    pub my_rank: Option<u64>,
}

impl ActionEngine {
    pub async fn profile(&self, user_id: Uuid) -> Result<Profile> {
        let user = self.load_user(user_id).await?;
        let economy = self.economy().await?;
        let now = self.clock.now();
        let is_premium = user.is_premium(now);
        let (_, eligibility) = rules::evaluate_wake(now, user.wake, &economy, is_premium);

        Ok(Profile {
            user_id: user.id,
            external_id: user.external_id,
            username: user.username,
            display_name: user.display_name,
            referral_code: user.referral_code,
            balances: user.balances,
            eligibility,
            wallet_address: user.wallet_address,
            is_premium,
            premium_until: user.premium_until,
        })
    }

    /// Available missions localised to `locale`, falling back to the user's
    /// own locale and then English.
    pub async fn missions(&self, user_id: Uuid, locale: Option<&str>) -> Result<Vec<MissionView>> {
        let user = self.load_user(user_id).await?;
        let locale = locale
            .or(user.locale.as_deref())
            .map(normalize_locale)
            .unwrap_or_else(|| "en".to_string());

        let missions = self
            .stores
            .missions
            .list_available(self.clock.now())
            .await?;
        let progress = self.stores.missions.list_user_missions(user.id).await?;

        Ok(missions
            .into_iter()
            .map(|mission| {
                let status = progress
                    .iter()
                    .find(|p| p.mission_id == mission.id)
                    .map(|p| p.status);
                MissionView {
                    id: mission.id,
                    mission_type: mission.kind.type_name(),
                    title: mission.localized_title(&locale).to_string(),
                    description: mission.localized_description(&locale).to_string(),
                    reward: mission.reward,
                    starts_at: mission.starts_at,
                    ends_at: mission.ends_at,
                    status,
                }
            })
            .collect())
    }

    /// Ledger entries, newest first.
    pub async fn history(&self, user_id: Uuid, limit: u32) -> Result<Vec<LedgerEntry>> {
        self.load_user(user_id).await?;
        Ok(self
            .stores
            .ledger
            .history(user_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await?)
    }

    pub async fn leaderboard(&self, user_id: Uuid, limit: u32) -> Result<Leaderboard> {
        self.load_user(user_id).await?;
        let users = self
            .stores
            .accounts
            .top_by_steps(limit.clamp(1, MAX_LEADERBOARD_LIMIT))
            .await?;

        // Ties share a rank, matching `rank_of`.
        let mut top = Vec::with_capacity(users.len());
        let mut rank = 0;
        let mut previous_steps = None;
        for (index, user) in users.into_iter().enumerate() {
            if previous_steps != Some(user.balances.steps) {
                rank = index as u64 + 1;
                previous_steps = Some(user.balances.steps);
            }
            top.push(LeaderboardRow {
                rank,
                user_id: user.id,
                display_name: user.display_name,
                username: user.username,
                steps: user.balances.steps,
            });
        }

        let my_rank = self.stores.accounts.rank_of(user_id).await?;
        Ok(Leaderboard { top, my_rank })
    }
}

/// `"es-MX"` → `"es"`.
fn normalize_locale(raw: &str) -> String {
    raw.split(['-', '_'])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_ascii_lowercase()
}
