//! SQLite PurchaseStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SimpleExpr, SqliteQueryBuilder};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::rows::purchase_from_row;
use crate::model::{PaymentObservation, Purchase, PurchaseStatus};
use crate::storage::helpers::{format_optional_timestamp, format_timestamp, is_unique_violation};
use crate::storage::schema::Purchases;
use crate::storage::{PurchaseStore, Result, StorageError};

fn purchase_columns() -> [Purchases; 18] {
    [
        Purchases::Id,
        Purchases::UserId,
        Purchases::MissionId,
        Purchases::Provider,
        Purchases::Status,
        Purchases::InvoiceId,
        Purchases::IntentKey,
        Purchases::Receiver,
        Purchases::Sender,
        Purchases::AmountNano,
        Purchases::Comment,
        Purchases::TxHash,
        Purchases::TxLt,
        Purchases::Confirmations,
        Purchases::FailureReason,
        Purchases::CreatedAt,
        Purchases::UpdatedAt,
        Purchases::PaidAt,
    ]
}

fn status_names(statuses: &[PurchaseStatus]) -> Vec<&'static str> {
    statuses.iter().map(PurchaseStatus::as_str).collect()
}

/// SQLite implementation of PurchaseStore.
pub struct SqlitePurchaseStore {
    pool: SqlitePool,
}

impl SqlitePurchaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: Purchases, value: String) -> Result<Option<Purchase>> {
        let query = Query::select()
            .columns(purchase_columns())
            .from(Purchases::Table)
            .and_where(Expr::col(column).eq(value))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(purchase_from_row).transpose()
    }
}

#[async_trait]
impl PurchaseStore for SqlitePurchaseStore {
    async fn insert(&self, purchase: &Purchase) -> Result<()> {
        let query = Query::insert()
            .into_table(Purchases::Table)
            .columns(purchase_columns())
            .values_panic([
                purchase.id.to_string().into(),
                purchase.user_id.to_string().into(),
                purchase.mission_id.to_string().into(),
                purchase.provider.clone().into(),
                purchase.status.as_str().into(),
                purchase.invoice_id.clone().into(),
                purchase.intent_key.clone().into(),
                purchase.receiver.clone().into(),
                purchase.sender.clone().into(),
                purchase.amount_nano.to_string().into(),
                purchase.comment.clone().into(),
                purchase.tx_hash.clone().into(),
                purchase.tx_lt.clone().into(),
                i64::from(purchase.confirmations).into(),
                purchase.failure_reason.clone().into(),
                format_timestamp(&purchase.created_at).into(),
                format_timestamp(&purchase.updated_at).into(),
                format_optional_timestamp(purchase.paid_at.as_ref()).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::DuplicateKey(purchase.invoice_id.clone())
                } else {
                    StorageError::Database(e)
                }
            })?;
        Ok(())
    }

    async fn get_by_invoice(&self, invoice_id: &str) -> Result<Option<Purchase>> {
        self.find_one(Purchases::InvoiceId, invoice_id.to_string()).await
    }

    async fn find_by_intent_key(&self, key: &str) -> Result<Option<Purchase>> {
        self.find_one(Purchases::IntentKey, key.to_string()).await
    }

    async fn find_active(&self, user_id: Uuid, mission_id: Uuid) -> Result<Option<Purchase>> {
        let query = Query::select()
            .columns(purchase_columns())
            .from(Purchases::Table)
            .and_where(Expr::col(Purchases::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(Purchases::MissionId).eq(mission_id.to_string()))
            .and_where(Expr::col(Purchases::Status).is_in(status_names(&[
                PurchaseStatus::Created,
                PurchaseStatus::Pending,
                PurchaseStatus::Paid,
            ])))
            .order_by(Purchases::CreatedAt, Order::Desc)
            .limit(1)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(purchase_from_row).transpose()
    }

    async fn transition(
        &self,
        invoice_id: &str,
        from: &[PurchaseStatus],
        to: PurchaseStatus,
        observation: &PaymentObservation,
        now: DateTime<Utc>,
    ) -> Result<Option<Purchase>> {
        // `SimpleExpr` is not `Send`; render the statement before awaiting.
        let query = {
            let mut values: Vec<(Purchases, SimpleExpr)> = vec![
                (Purchases::Status, to.as_str().into()),
                (Purchases::UpdatedAt, format_timestamp(&now).into()),
                (
                    Purchases::Confirmations,
                    i64::from(observation.confirmations).into(),
                ),
            ];
            if let Some(hash) = &observation.tx_hash {
                values.push((Purchases::TxHash, hash.clone().into()));
            }
            if let Some(lt) = &observation.tx_lt {
                values.push((Purchases::TxLt, lt.clone().into()));
            }
            if let Some(sender) = &observation.sender {
                values.push((Purchases::Sender, sender.clone().into()));
            }
            if let Some(reason) = &observation.reason {
                values.push((Purchases::FailureReason, reason.clone().into()));
            }
            if to == PurchaseStatus::Paid {
                values.push((Purchases::PaidAt, format_timestamp(&now).into()));
            }

            // Compare-and-swap on status: concurrent syncs race here and exactly
            // one of them moves the row.
            Query::update()
                .table(Purchases::Table)
                .values(values)
                .and_where(Expr::col(Purchases::InvoiceId).eq(invoice_id))
                .and_where(Expr::col(Purchases::Status).is_in(status_names(from)))
                .to_string(SqliteQueryBuilder)
        };

        // A paid purchase owns its transaction hash (partial unique index).
        let result = sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::DuplicateKey(observation.tx_hash.clone().unwrap_or_default())
                } else {
                    StorageError::Database(e)
                }
            })?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_invoice(invoice_id).await
    }

    async fn list_open(&self, limit: u32) -> Result<Vec<Purchase>> {
        let query = Query::select()
            .columns(purchase_columns())
            .from(Purchases::Table)
            .and_where(Expr::col(Purchases::Status).is_in(status_names(&PurchaseStatus::OPEN)))
            .order_by(Purchases::UpdatedAt, Order::Asc)
            .order_by(Purchases::CreatedAt, Order::Asc)
            .limit(u64::from(limit))
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(purchase_from_row).collect()
    }
}
