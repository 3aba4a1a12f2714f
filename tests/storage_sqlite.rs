//! SQLite storage integration tests.
//!
//! Run with: cargo test --test storage_sqlite --features test-utils
//!
//! Each test gets its own database file in a temp directory, so pooled
//! connections share one database and no external service is needed.

mod storage;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use koth_ledger::config::{ConfigSource, EconomyConfig, StorageConfig, StorageType};
use koth_ledger::storage::{init_storage, SqliteConfigSource, Stores};

async fn connect(dir: &tempfile::TempDir) -> sqlx::SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("koth.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("Failed to open SQLite database")
}

async fn sqlite_stores(dir: &tempfile::TempDir) -> Stores {
    Stores::sqlite(connect(dir).await, EconomyConfig::default())
        .await
        .expect("Failed to create tables")
}

#[tokio::test]
async fn test_sqlite_account_store() {
    println!("=== SQLite AccountStore Tests ===");
    let dir = tempfile::tempdir().unwrap();
    let stores = sqlite_stores(&dir).await;

    run_account_store_tests!(&stores);

    println!("=== All SQLite AccountStore tests PASSED ===");
}

#[tokio::test]
async fn test_sqlite_mission_store() {
    println!("=== SQLite MissionStore Tests ===");
    let dir = tempfile::tempdir().unwrap();
    let stores = sqlite_stores(&dir).await;

    run_mission_store_tests!(&stores);

    println!("=== All SQLite MissionStore tests PASSED ===");
}

#[tokio::test]
async fn test_sqlite_purchase_store() {
    println!("=== SQLite PurchaseStore Tests ===");
    let dir = tempfile::tempdir().unwrap();
    let stores = sqlite_stores(&dir).await;

    run_purchase_store_tests!(&stores);

    println!("=== All SQLite PurchaseStore tests PASSED ===");
}

#[tokio::test]
async fn test_memory_store_contract() {
    println!("=== MemoryStore contract Tests ===");
    let (stores, _) = Stores::memory(EconomyConfig::default());

    run_account_store_tests!(&stores);
    run_mission_store_tests!(&stores);
    run_purchase_store_tests!(&stores);

    println!("=== All MemoryStore contract tests PASSED ===");
}

#[tokio::test]
async fn test_sqlite_tables_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pool = connect(&dir).await;

    koth_ledger::storage::sqlite::init(&pool).await.unwrap();
    koth_ledger::storage::sqlite::init(&pool).await.unwrap();
}

#[tokio::test]
async fn test_sqlite_config_source_overrides_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let pool = connect(&dir).await;
    koth_ledger::storage::sqlite::init(&pool).await.unwrap();

    let fallback = EconomyConfig::default();
    let source = SqliteConfigSource::new(pool, fallback.clone());
    assert_eq!(source.load().await.unwrap(), fallback);

    source.set("cooldown_ms", "60000").await.unwrap();
    source.set("not_a_key", "1").await.unwrap();
    let economy = source.load().await.unwrap();
    assert_eq!(economy.cooldown_ms, 60_000);
    assert_eq!(economy.steps_per_wake, fallback.steps_per_wake);

    source.unset("cooldown_ms").await.unwrap();
    assert_eq!(source.load().await.unwrap(), fallback);
}

#[tokio::test]
async fn test_init_storage_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("koth.db");
    let config = StorageConfig {
        storage_type: StorageType::Sqlite,
        path: path.to_string_lossy().into_owned(),
        ..StorageConfig::default()
    };

    let stores = init_storage(&config, &EconomyConfig::default())
        .await
        .expect("init_storage should succeed");
    assert!(path.exists());
    assert_eq!(
        stores.config.load().await.unwrap(),
        EconomyConfig::default()
    );
}
