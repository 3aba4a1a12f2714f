//! SQLite LedgerStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::rows::{entry_from_row, fetch_entry_by_key, ledger_columns};
use crate::model::LedgerEntry;
use crate::storage::schema::Ledger;
use crate::storage::{LedgerStore, Result};

/// SQLite implementation of LedgerStore.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn find_by_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_entry_by_key(&mut conn, key).await
    }

    async fn history(&self, user_id: Uuid, limit: u32) -> Result<Vec<LedgerEntry>> {
        let query = Query::select()
            .columns(ledger_columns())
            .from(Ledger::Table)
            .and_where(Expr::col(Ledger::UserId).eq(user_id.to_string()))
            .order_by(Ledger::CreatedAt, Order::Desc)
            .order_by_expr(Expr::cust("rowid"), Order::Desc)
            .limit(u64::from(limit))
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }
}
