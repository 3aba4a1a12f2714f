//! Storage implementations.
//!
//! Four stores back the engine: accounts (users and balances), the ledger,
//! missions and purchases. The account store owns the only multi-row write,
//! [`AccountStore::commit`], which applies a ledger entry and everything that
//! must change with it in one transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::{ConfigSource, EconomyConfig, StaticConfigSource, StorageConfig, StorageType};
use crate::model::{
    Currency, LedgerEntry, Mission, MissionDecodeError, NewLedgerEntry, NewUser, PaymentObservation,
    Purchase, PurchaseStatus, User, UserMission, WakeState,
};

pub mod helpers;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{
    SqliteAccountStore, SqliteConfigSource, SqliteLedgerStore, SqliteMissionStore,
    SqlitePurchaseStore,
};

/// Errors raised by the stores.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Insufficient {0} balance")]
    InsufficientBalance(Currency),

    #[error("Wake state changed concurrently")]
    StaleState,

    #[error("Mission {0} already completed")]
    MissionAlreadyCompleted(Uuid),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<MissionDecodeError> for StorageError {
    fn from(err: MissionDecodeError) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Compare-and-swap on a user's wake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTransition {
    /// State the caller evaluated eligibility against.
    pub expected: WakeState,
    pub next: WakeState,
}

/// Side effects committed together with a ledger entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountChange {
    pub wake: Option<WakeTransition>,
    /// Mark this mission completed for the entry's user.
    pub complete_mission: Option<Uuid>,
}

impl AccountChange {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn wake(expected: WakeState, next: WakeState) -> Self {
        Self {
            wake: Some(WakeTransition { expected, next }),
            ..Self::default()
        }
    }

    pub fn complete_mission(mission_id: Uuid) -> Self {
        Self {
            complete_mission: Some(mission_id),
            ..Self::default()
        }
    }
}

/// Result of [`AccountStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The entry was appended and balances changed.
    Applied(LedgerEntry),
    /// An entry with the same idempotency key already exists; nothing changed.
    Duplicate(LedgerEntry),
}

impl CommitOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            CommitOutcome::Applied(entry) | CommitOutcome::Duplicate(entry) => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            CommitOutcome::Applied(entry) | CommitOutcome::Duplicate(entry) => entry,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CommitOutcome::Duplicate(_))
    }
}

/// Users, balances and wake state.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert the user if `external_id` is unknown, otherwise refresh the
    /// profile fields. Referral code and referrer are only written on insert.
    async fn upsert_user(&self, user: NewUser) -> Result<User>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<User>>;

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>>;

    async fn set_wallet(
        &self,
        user_id: Uuid,
        address: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<User>;

    async fn set_premium_until(
        &self,
        user_id: Uuid,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<User>;

    /// Atomically append `entry`, apply its deltas to the user's balances and
    /// perform `change`.
    ///
    /// When the entry's idempotency key already exists the stored entry is
    /// returned as [`CommitOutcome::Duplicate`] and nothing is written, even
    /// if it belongs to another user.
    async fn commit(&self, entry: NewLedgerEntry, change: AccountChange) -> Result<CommitOutcome>;

    /// Users ordered by steps descending, then by creation time.
    async fn top_by_steps(&self, limit: u32) -> Result<Vec<User>>;

    /// 1-based rank by steps. Ties share a rank.
    async fn rank_of(&self, user_id: Uuid) -> Result<Option<u64>>;
}

/// Read access to the append-only ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_key(&self, key: &str) -> Result<Option<LedgerEntry>>;

    /// Most recent entries first.
    async fn history(&self, user_id: Uuid, limit: u32) -> Result<Vec<LedgerEntry>>;
}

/// Mission definitions and per-user progress.
#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn upsert_mission(&self, mission: &Mission) -> Result<()>;

    async fn get_mission(&self, id: Uuid) -> Result<Option<Mission>>;

    /// Missions that are active and inside their window at `now`.
    async fn list_available(&self, now: DateTime<Utc>) -> Result<Vec<Mission>>;

    async fn get_user_mission(&self, user_id: Uuid, mission_id: Uuid) -> Result<Option<UserMission>>;

    async fn list_user_missions(&self, user_id: Uuid) -> Result<Vec<UserMission>>;

    /// Record a pending attempt. Never downgrades a completed mission.
    async fn mark_pending(&self, user_id: Uuid, mission_id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Drop a pending attempt so the user can start over.
    async fn clear_pending(&self, user_id: Uuid, mission_id: Uuid) -> Result<()>;
}

/// Payment attempts.
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Fails with [`StorageError::DuplicateKey`] when the invoice id or
    /// intent key is taken.
    async fn insert(&self, purchase: &Purchase) -> Result<()>;

    async fn get_by_invoice(&self, invoice_id: &str) -> Result<Option<Purchase>>;

    async fn find_by_intent_key(&self, key: &str) -> Result<Option<Purchase>>;

    /// Most recent purchase for (user, mission) that is open or paid.
    async fn find_active(&self, user_id: Uuid, mission_id: Uuid) -> Result<Option<Purchase>>;

    /// Move the purchase to `to` if its status is one of `from`.
    ///
    /// Returns the updated purchase, or `None` when the status did not match.
    /// Moving to `paid` with a transaction hash another paid purchase already
    /// holds fails with [`StorageError::DuplicateKey`].
    async fn transition(
        &self,
        invoice_id: &str,
        from: &[PurchaseStatus],
        to: PurchaseStatus,
        observation: &PaymentObservation,
        now: DateTime<Utc>,
    ) -> Result<Option<Purchase>>;

    /// Open purchases, least recently updated first, so repeated sweeps
    /// rotate through a backlog larger than `limit`.
    async fn list_open(&self, limit: u32) -> Result<Vec<Purchase>>;
}

/// Handles to every store the engine needs.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub missions: Arc<dyn MissionStore>,
    pub purchases: Arc<dyn PurchaseStore>,
    pub config: Arc<dyn ConfigSource>,
}

impl Stores {
    /// All stores backed by one in-memory instance.
    pub fn memory(economy: EconomyConfig) -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let stores = Self {
            accounts: store.clone(),
            ledger: store.clone(),
            missions: store.clone(),
            purchases: store.clone(),
            config: Arc::new(StaticConfigSource::new(economy)),
        };
        (stores, store)
    }

    /// All stores backed by one SQLite pool. Creates tables if missing.
    pub async fn sqlite(pool: sqlx::SqlitePool, economy: EconomyConfig) -> Result<Self> {
        sqlite::init(&pool).await?;
        Ok(Self {
            accounts: Arc::new(SqliteAccountStore::new(pool.clone())),
            ledger: Arc::new(SqliteLedgerStore::new(pool.clone())),
            missions: Arc::new(SqliteMissionStore::new(pool.clone())),
            purchases: Arc::new(SqlitePurchaseStore::new(pool.clone())),
            config: Arc::new(SqliteConfigSource::new(pool, economy)),
        })
    }
}

/// Initialize storage based on configuration.
///
/// `economy` is the fallback for economy keys the store does not override.
pub async fn init_storage(config: &StorageConfig, economy: &EconomyConfig) -> Result<Stores> {
    info!(storage = %config.storage_type, path = %config.path, "Initializing storage");

    match config.storage_type {
        StorageType::Sqlite => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Database(sqlx::Error::Io(e)))?;
                }
            }
            let options = sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .foreign_keys(true);
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options)
                .await?;
            Stores::sqlite(pool, economy.clone()).await
        }
        StorageType::Memory => Ok(Stores::memory(economy.clone()).0),
    }
}
