//! SQLite AccountStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use super::rows::{fetch_entry_by_key, fetch_user, ledger_columns, user_columns, user_from_row};
use crate::model::{NewLedgerEntry, NewUser, User, UserMissionStatus};
use crate::storage::helpers::{
    format_date, format_optional_timestamp, format_timestamp, is_unique_violation,
};
use crate::storage::schema::{Ledger, UserMissions, Users};
use crate::storage::{AccountChange, AccountStore, CommitOutcome, Result, StorageError};

/// `COMMIT` the open transaction. A failed `COMMIT` leaves the transaction
/// open, so it is rolled back before the connection returns to the pool.
async fn end_transaction(conn: &mut SqliteConnection) -> Result<()> {
    if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
        rollback(conn).await;
        return Err(e.into());
    }
    Ok(())
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!(error = %e, "ROLLBACK failed");
    }
}

/// SQLite implementation of AccountStore.
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: Users, value: sea_query::Value) -> Result<Option<User>> {
        let query = Query::select()
            .columns(user_columns())
            .from(Users::Table)
            .and_where(Expr::col(column).eq(value))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn require_user(&self, id: Uuid) -> Result<User> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id)
            .await?
            .ok_or(StorageError::UserNotFound(id))
    }

    /// Body of [`AccountStore::commit`], run inside `BEGIN IMMEDIATE`.
    async fn commit_in(
        conn: &mut SqliteConnection,
        entry: NewLedgerEntry,
        change: AccountChange,
    ) -> Result<CommitOutcome> {
        if let Some(key) = &entry.idempotency_key {
            if let Some(existing) = fetch_entry_by_key(conn, key).await? {
                return Ok(CommitOutcome::Duplicate(existing));
            }
        }

        let user = fetch_user(conn, entry.user_id)
            .await?
            .ok_or(StorageError::UserNotFound(entry.user_id))?;

        let mut wake = user.wake;
        if let Some(transition) = change.wake {
            if user.wake != transition.expected {
                return Err(StorageError::StaleState);
            }
            wake = transition.next;
        }

        if let Some(mission_id) = change.complete_mission {
            Self::complete_mission_in(conn, entry.user_id, mission_id, &entry.created_at).await?;
        }

        let mut balances = user.balances;
        balances
            .apply(&entry.deltas)
            .map_err(StorageError::InsufficientBalance)?;

        let query = Query::update()
            .table(Users::Table)
            .values([
                (Users::Steps, balances.steps.into()),
                (Users::Sandwiches, balances.sandwiches.into()),
                (Users::Coffee, balances.coffee.into()),
                (
                    Users::NextAvailableAt,
                    format_optional_timestamp(wake.next_available_at.as_ref()).into(),
                ),
                (Users::DailyFreeCount, i64::from(wake.daily_free_count).into()),
                (
                    Users::DailyResetDate,
                    wake.daily_reset_date.as_ref().map(format_date).into(),
                ),
                (Users::UpdatedAt, format_timestamp(&entry.created_at).into()),
            ])
            .and_where(Expr::col(Users::Id).eq(entry.user_id.to_string()))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *conn).await?;

        let stored = entry.into_entry(Uuid::new_v4());
        let query = Query::insert()
            .into_table(Ledger::Table)
            .columns(ledger_columns())
            .values_panic([
                stored.id.to_string().into(),
                stored.user_id.to_string().into(),
                stored.kind.as_str().into(),
                stored.deltas.steps.into(),
                stored.deltas.sandwiches.into(),
                stored.deltas.coffee.into(),
                stored.idempotency_key.clone().into(),
                serde_json::to_string(&stored.meta)?.into(),
                format_timestamp(&stored.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query)
            .execute(&mut *conn)
            .await
            .map_err(|e| match (&stored.idempotency_key, is_unique_violation(&e)) {
                (Some(key), true) => StorageError::DuplicateKey(key.clone()),
                _ => StorageError::Database(e),
            })?;

        Ok(CommitOutcome::Applied(stored))
    }

    async fn complete_mission_in(
        conn: &mut SqliteConnection,
        user_id: Uuid,
        mission_id: Uuid,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        let query = Query::select()
            .column(UserMissions::Status)
            .from(UserMissions::Table)
            .and_where(Expr::col(UserMissions::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(UserMissions::MissionId).eq(mission_id.to_string()))
            .to_string(SqliteQueryBuilder);
        let status: Option<String> = sqlx::query(&query)
            .fetch_optional(&mut *conn)
            .await?
            .map(|row| row.try_get("status"))
            .transpose()?;
        if status.as_deref() == Some(UserMissionStatus::Completed.as_str()) {
            return Err(StorageError::MissionAlreadyCompleted(mission_id));
        }

        let now = format_timestamp(now);
        let query = Query::insert()
            .into_table(UserMissions::Table)
            .columns([
                UserMissions::UserId,
                UserMissions::MissionId,
                UserMissions::Status,
                UserMissions::CompletedAt,
                UserMissions::UpdatedAt,
            ])
            .values_panic([
                user_id.to_string().into(),
                mission_id.to_string().into(),
                UserMissionStatus::Completed.as_str().into(),
                now.clone().into(),
                now.into(),
            ])
            .on_conflict(
                OnConflict::columns([UserMissions::UserId, UserMissions::MissionId])
                    .update_columns([
                        UserMissions::Status,
                        UserMissions::CompletedAt,
                        UserMissions::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn upsert_user(&self, user: NewUser) -> Result<User> {
        let now = format_timestamp(&user.now);
        let query = Query::insert()
            .into_table(Users::Table)
            .columns([
                Users::Id,
                Users::ExternalId,
                Users::Username,
                Users::DisplayName,
                Users::Locale,
                Users::ReferralCode,
                Users::ReferrerId,
                Users::CreatedAt,
                Users::UpdatedAt,
            ])
            .values_panic([
                user.id.to_string().into(),
                user.claim.external_id.into(),
                user.claim.username.clone().into(),
                user.claim.display_name.clone().into(),
                user.claim.locale.clone().into(),
                user.referral_code.clone().into(),
                user.referrer_id.map(|id| id.to_string()).into(),
                now.clone().into(),
                now.into(),
            ])
            .on_conflict(
                OnConflict::column(Users::ExternalId)
                    .update_columns([
                        Users::Username,
                        Users::DisplayName,
                        Users::Locale,
                        Users::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        debug!(external_id = user.claim.external_id, "Upserted user");

        self.find_by_external_id(user.claim.external_id)
            .await?
            .ok_or_else(|| StorageError::Corrupt("upserted user not readable".to_string()))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.find_one(Users::Id, id.to_string().into()).await
    }

    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<User>> {
        self.find_one(Users::ExternalId, external_id.into()).await
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        self.find_one(Users::ReferralCode, code.into()).await
    }

    async fn set_wallet(
        &self,
        user_id: Uuid,
        address: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let query = Query::update()
            .table(Users::Table)
            .values([
                (Users::WalletAddress, address.into()),
                (Users::UpdatedAt, format_timestamp(&now).into()),
            ])
            .and_where(Expr::col(Users::Id).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(user_id));
        }
        self.require_user(user_id).await
    }

    async fn set_premium_until(
        &self,
        user_id: Uuid,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let query = Query::update()
            .table(Users::Table)
            .values([
                (
                    Users::PremiumUntil,
                    format_optional_timestamp(until.as_ref()).into(),
                ),
                (Users::UpdatedAt, format_timestamp(&now).into()),
            ])
            .and_where(Expr::col(Users::Id).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(user_id));
        }
        self.require_user(user_id).await
    }

    async fn commit(&self, entry: NewLedgerEntry, change: AccountChange) -> Result<CommitOutcome> {
        let key = entry.idempotency_key.clone();

        // BEGIN IMMEDIATE takes the write lock up front so the read-check-write
        // sequence below cannot interleave with another writer.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::commit_in(&mut conn, entry, change).await;

        match result {
            Ok(outcome) => {
                end_transaction(&mut conn).await?;
                Ok(outcome)
            }
            Err(e) => {
                rollback(&mut conn).await;
                match (e, key) {
                    (StorageError::DuplicateKey(_), Some(key)) => {
                        let existing = fetch_entry_by_key(&mut conn, &key).await?;
                        match existing {
                            Some(entry) => Ok(CommitOutcome::Duplicate(entry)),
                            None => Err(StorageError::DuplicateKey(key)),
                        }
                    }
                    (e, _) => Err(e),
                }
            }
        }
    }

    async fn top_by_steps(&self, limit: u32) -> Result<Vec<User>> {
        let query = Query::select()
            .columns(user_columns())
            .from(Users::Table)
            .order_by(Users::Steps, Order::Desc)
            .order_by(Users::CreatedAt, Order::Asc)
            .limit(u64::from(limit))
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn rank_of(&self, user_id: Uuid) -> Result<Option<u64>> {
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(None);
        };

        let query = Query::select()
            .expr(Expr::col(Users::Id).count())
            .from(Users::Table)
            .and_where(Expr::col(Users::Steps).gt(user.balances.steps))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let ahead: i64 = row.try_get(0)?;
        Ok(Some(ahead.max(0) as u64 + 1))
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::Connection;

    use super::*;

    #[tokio::test]
    async fn test_failed_commit_leaves_no_open_transaction() {
        let options: SqliteConnectOptions = "sqlite::memory:".parse().unwrap();
        let mut conn = SqliteConnection::connect_with(&options.foreign_keys(true))
            .await
            .unwrap();
        sqlx::raw_sql(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (parent_id INTEGER REFERENCES parent(id));",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        // Deferred foreign keys surface at COMMIT, which then fails.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut conn).await.unwrap();
        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO child (parent_id) VALUES (42)")
            .execute(&mut conn)
            .await
            .unwrap();
        assert!(end_transaction(&mut conn).await.is_err());

        // A new transaction can start, so the failed one was closed.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut conn).await.unwrap();
        let orphans: i64 = sqlx::query("SELECT COUNT(*) FROM child")
            .fetch_one(&mut conn)
            .await
            .unwrap()
            .try_get(0)
            .unwrap();
        assert_eq!(orphans, 0);
        end_transaction(&mut conn).await.unwrap();
    }
}
