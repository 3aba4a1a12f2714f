//! Row decoding and shared lookups for the SQLite stores.

use std::collections::BTreeMap;

use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::model::{
    Balances, Deltas, LedgerEntry, LedgerKind, Mission, MissionKind, Purchase, PurchaseStatus, User,
    UserMission, UserMissionStatus, WakeState,
};
use crate::storage::helpers::{
    parse_optional_date, parse_optional_timestamp, parse_optional_uuid, parse_timestamp, parse_uuid,
};
use crate::storage::schema::{Ledger, Users};
use crate::storage::{Result, StorageError};

pub fn user_columns() -> [Users; 17] {
    [
        Users::Id,
        Users::ExternalId,
        Users::Username,
        Users::DisplayName,
        Users::Locale,
        Users::ReferralCode,
        Users::ReferrerId,
        Users::Steps,
        Users::Sandwiches,
        Users::Coffee,
        Users::NextAvailableAt,
        Users::DailyFreeCount,
        Users::DailyResetDate,
        Users::PremiumUntil,
        Users::WalletAddress,
        Users::CreatedAt,
        Users::UpdatedAt,
    ]
}

pub fn ledger_columns() -> [Ledger; 9] {
    [
        Ledger::Id,
        Ledger::UserId,
        Ledger::Kind,
        Ledger::DeltaSteps,
        Ledger::DeltaSandwiches,
        Ledger::DeltaCoffee,
        Ledger::IdempotencyKey,
        Ledger::Meta,
        Ledger::CreatedAt,
    ]
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("{column} out of range: {value}")))
}

pub fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(row.try_get("id")?)?,
        external_id: row.try_get("external_id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        locale: row.try_get("locale")?,
        referral_code: row.try_get("referral_code")?,
        referrer_id: parse_optional_uuid(row.try_get("referrer_id")?)?,
        balances: Balances {
            steps: row.try_get("steps")?,
            sandwiches: row.try_get("sandwiches")?,
            coffee: row.try_get("coffee")?,
        },
        wake: WakeState {
            next_available_at: parse_optional_timestamp(row.try_get("next_available_at")?)?,
            daily_free_count: to_u32(row.try_get("daily_free_count")?, "daily_free_count")?,
            daily_reset_date: parse_optional_date(row.try_get("daily_reset_date")?)?,
        },
        premium_until: parse_optional_timestamp(row.try_get("premium_until")?)?,
        wallet_address: row.try_get("wallet_address")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        updated_at: parse_timestamp(row.try_get("updated_at")?)?,
    })
}

pub fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry> {
    let kind: String = row.try_get("kind")?;
    let meta: String = row.try_get("meta")?;
    Ok(LedgerEntry {
        id: parse_uuid(row.try_get("id")?)?,
        user_id: parse_uuid(row.try_get("user_id")?)?,
        kind: kind.parse::<LedgerKind>().map_err(StorageError::Corrupt)?,
        deltas: Deltas {
            steps: row.try_get("delta_steps")?,
            sandwiches: row.try_get("delta_sandwiches")?,
            coffee: row.try_get("delta_coffee")?,
        },
        idempotency_key: row.try_get("idempotency_key")?,
        meta: serde_json::from_str(&meta)?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
    })
}

pub fn mission_from_row(row: &SqliteRow) -> Result<Mission> {
    let kind: String = row.try_get("type")?;
    let payload: String = row.try_get("payload")?;
    let title_i18n: String = row.try_get("title_i18n")?;
    let description_i18n: String = row.try_get("description_i18n")?;
    Ok(Mission {
        id: parse_uuid(row.try_get("id")?)?,
        kind: MissionKind::decode(&kind, &serde_json::from_str(&payload)?)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        title_i18n: serde_json::from_str::<BTreeMap<String, String>>(&title_i18n)?,
        description_i18n: serde_json::from_str::<BTreeMap<String, String>>(&description_i18n)?,
        reward: Deltas {
            steps: row.try_get("reward_steps")?,
            sandwiches: row.try_get("reward_sandwiches")?,
            coffee: row.try_get("reward_coffee")?,
        },
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        starts_at: parse_optional_timestamp(row.try_get("starts_at")?)?,
        ends_at: parse_optional_timestamp(row.try_get("ends_at")?)?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
    })
}

pub fn user_mission_from_row(row: &SqliteRow) -> Result<UserMission> {
    let status: String = row.try_get("status")?;
    Ok(UserMission {
        user_id: parse_uuid(row.try_get("user_id")?)?,
        mission_id: parse_uuid(row.try_get("mission_id")?)?,
        status: UserMissionStatus::parse(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown mission status: {status}")))?,
        completed_at: parse_optional_timestamp(row.try_get("completed_at")?)?,
        updated_at: parse_timestamp(row.try_get("updated_at")?)?,
    })
}

pub fn purchase_from_row(row: &SqliteRow) -> Result<Purchase> {
    let status: String = row.try_get("status")?;
    let amount: String = row.try_get("amount_nano")?;
    Ok(Purchase {
        id: parse_uuid(row.try_get("id")?)?,
        user_id: parse_uuid(row.try_get("user_id")?)?,
        mission_id: parse_uuid(row.try_get("mission_id")?)?,
        provider: row.try_get("provider")?,
        status: PurchaseStatus::parse(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown purchase status: {status}")))?,
        invoice_id: row.try_get("invoice_id")?,
        intent_key: row.try_get("intent_key")?,
        receiver: row.try_get("receiver")?,
        sender: row.try_get("sender")?,
        amount_nano: amount
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("invalid amount_nano: {amount}")))?,
        comment: row.try_get("comment")?,
        tx_hash: row.try_get("tx_hash")?,
        tx_lt: row.try_get("tx_lt")?,
        confirmations: to_u32(row.try_get("confirmations")?, "confirmations")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
        updated_at: parse_timestamp(row.try_get("updated_at")?)?,
        paid_at: parse_optional_timestamp(row.try_get("paid_at")?)?,
    })
}

pub async fn fetch_user(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>> {
    let query = Query::select()
        .columns(user_columns())
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(id.to_string()))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn fetch_entry_by_key(conn: &mut SqliteConnection, key: &str) -> Result<Option<LedgerEntry>> {
    let query = Query::select()
        .columns(ledger_columns())
        .from(Ledger::Table)
        .and_where(Expr::col(Ledger::IdempotencyKey).eq(key))
        .to_string(SqliteQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    row.as_ref().map(entry_from_row).transpose()
}
