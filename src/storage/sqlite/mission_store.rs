//! SQLite MissionStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::rows::{mission_from_row, user_mission_from_row};
use crate::model::{Mission, UserMission, UserMissionStatus};
use crate::storage::helpers::{format_optional_timestamp, format_timestamp};
use crate::storage::schema::{Missions, UserMissions};
use crate::storage::{MissionStore, Result};

fn mission_columns() -> [Missions; 14] {
    [
        Missions::Id,
        Missions::Type,
        Missions::Payload,
        Missions::Title,
        Missions::Description,
        Missions::TitleI18n,
        Missions::DescriptionI18n,
        Missions::RewardSteps,
        Missions::RewardSandwiches,
        Missions::RewardCoffee,
        Missions::IsActive,
        Missions::StartsAt,
        Missions::EndsAt,
        Missions::CreatedAt,
    ]
}

fn user_mission_columns() -> [UserMissions; 5] {
    [
        UserMissions::UserId,
        UserMissions::MissionId,
        UserMissions::Status,
        UserMissions::CompletedAt,
        UserMissions::UpdatedAt,
    ]
}

/// SQLite implementation of MissionStore.
pub struct SqliteMissionStore {
    pool: SqlitePool,
}

impl SqliteMissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MissionStore for SqliteMissionStore {
    async fn upsert_mission(&self, mission: &Mission) -> Result<()> {
        let (kind, payload) = mission.kind.encode();
        let query = Query::insert()
            .into_table(Missions::Table)
            .columns(mission_columns())
            .values_panic([
                mission.id.to_string().into(),
                kind.into(),
                serde_json::to_string(&payload)?.into(),
                mission.title.clone().into(),
                mission.description.clone().into(),
                serde_json::to_string(&mission.title_i18n)?.into(),
                serde_json::to_string(&mission.description_i18n)?.into(),
                mission.reward.steps.into(),
                mission.reward.sandwiches.into(),
                mission.reward.coffee.into(),
                i64::from(mission.is_active).into(),
                format_optional_timestamp(mission.starts_at.as_ref()).into(),
                format_optional_timestamp(mission.ends_at.as_ref()).into(),
                format_timestamp(&mission.created_at).into(),
            ])
            .on_conflict(
                OnConflict::column(Missions::Id)
                    .update_columns([
                        Missions::Type,
                        Missions::Payload,
                        Missions::Title,
                        Missions::Description,
                        Missions::TitleI18n,
                        Missions::DescriptionI18n,
                        Missions::RewardSteps,
                        Missions::RewardSandwiches,
                        Missions::RewardCoffee,
                        Missions::IsActive,
                        Missions::StartsAt,
                        Missions::EndsAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_mission(&self, id: Uuid) -> Result<Option<Mission>> {
        let query = Query::select()
            .columns(mission_columns())
            .from(Missions::Table)
            .and_where(Expr::col(Missions::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(mission_from_row).transpose()
    }

    async fn list_available(&self, now: DateTime<Utc>) -> Result<Vec<Mission>> {
        let now = format_timestamp(&now);
        let query = Query::select()
            .columns(mission_columns())
            .from(Missions::Table)
            .and_where(Expr::col(Missions::IsActive).eq(1))
            .and_where(
                Expr::col(Missions::StartsAt)
                    .is_null()
                    .or(Expr::col(Missions::StartsAt).lte(now.clone())),
            )
            .and_where(
                Expr::col(Missions::EndsAt)
                    .is_null()
                    .or(Expr::col(Missions::EndsAt).gte(now)),
            )
            .order_by(Missions::CreatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(mission_from_row).collect()
    }

    async fn get_user_mission(&self, user_id: Uuid, mission_id: Uuid) -> Result<Option<UserMission>> {
        let query = Query::select()
            .columns(user_mission_columns())
            .from(UserMissions::Table)
            .and_where(Expr::col(UserMissions::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(UserMissions::MissionId).eq(mission_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(user_mission_from_row).transpose()
    }

    async fn list_user_missions(&self, user_id: Uuid) -> Result<Vec<UserMission>> {
        let query = Query::select()
            .columns(user_mission_columns())
            .from(UserMissions::Table)
            .and_where(Expr::col(UserMissions::UserId).eq(user_id.to_string()))
            .order_by(UserMissions::UpdatedAt, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(user_mission_from_row).collect()
    }

    async fn mark_pending(&self, user_id: Uuid, mission_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let query = Query::insert()
            .into_table(UserMissions::Table)
            .columns(user_mission_columns())
            .values_panic([
                user_id.to_string().into(),
                mission_id.to_string().into(),
                UserMissionStatus::Pending.as_str().into(),
                Option::<String>::None.into(),
                format_timestamp(&now).into(),
            ])
            .on_conflict(
                OnConflict::columns([UserMissions::UserId, UserMissions::MissionId])
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear_pending(&self, user_id: Uuid, mission_id: Uuid) -> Result<()> {
        let query = Query::delete()
            .from_table(UserMissions::Table)
            .and_where(Expr::col(UserMissions::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(UserMissions::MissionId).eq(mission_id.to_string()))
            .and_where(Expr::col(UserMissions::Status).eq(UserMissionStatus::Pending.as_str()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}
