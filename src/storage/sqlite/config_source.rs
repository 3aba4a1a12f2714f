//! Economy parameters stored in SQLite.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::config::{ConfigSource, ConfigSourceError, EconomyConfig};
use crate::storage::schema::EconomySettings;

/// Reads `economy_settings` on every load. Missing or unparseable keys fall
/// back to the static configuration.
pub struct SqliteConfigSource {
    pool: SqlitePool,
    fallback: EconomyConfig,
}

impl SqliteConfigSource {
    pub fn new(pool: SqlitePool, fallback: EconomyConfig) -> Self {
        Self { pool, fallback }
    }

    /// Store an override for one key.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ConfigSourceError> {
        let query = Query::insert()
            .into_table(EconomySettings::Table)
            .columns([EconomySettings::Key, EconomySettings::Value])
            .values_panic([key.into(), value.into()])
            .on_conflict(
                OnConflict::column(EconomySettings::Key)
                    .update_column(EconomySettings::Value)
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    /// Remove an override so the static value applies again.
    pub async fn unset(&self, key: &str) -> Result<(), ConfigSourceError> {
        let query = Query::delete()
            .from_table(EconomySettings::Table)
            .and_where(Expr::col(EconomySettings::Key).eq(key))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigSource for SqliteConfigSource {
    async fn load(&self) -> Result<EconomyConfig, ConfigSourceError> {
        let query = Query::select()
            .columns([EconomySettings::Key, EconomySettings::Value])
            .from(EconomySettings::Table)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut config = self.fallback.clone();
        for row in rows {
            let key: String = row.try_get("key")?;
            let value: String = row.try_get("value")?;
            if !config.apply_override(&key, &value) {
                warn!(key = %key, value = %value, "Ignoring invalid economy setting");
            }
        }
        Ok(config)
    }
}
