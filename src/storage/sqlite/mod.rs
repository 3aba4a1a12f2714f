//! SQLite implementations of storage interfaces.

mod account_store;
mod config_source;
mod ledger_store;
mod mission_store;
mod purchase_store;
mod rows;

pub use account_store::SqliteAccountStore;
pub use config_source::SqliteConfigSource;
pub use ledger_store::SqliteLedgerStore;
pub use mission_store::SqliteMissionStore;
pub use purchase_store::SqlitePurchaseStore;

use sqlx::SqlitePool;

use super::schema::ALL_TABLES;
use super::Result;

/// Create all tables if they don't exist.
pub async fn init(pool: &SqlitePool) -> Result<()> {
    for ddl in ALL_TABLES {
        sqlx::raw_sql(ddl).execute(pool).await?;
    }
    Ok(())
}
