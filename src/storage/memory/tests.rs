use chrono::Utc;
use uuid::Uuid;

use crate::model::{Deltas, LedgerKind, NewLedgerEntry, WakeState};
use crate::storage::{AccountChange, AccountStore, CommitOutcome, LedgerStore, StorageError};
use crate::test_utils::new_user;

use super::*;

#[tokio::test]
async fn test_commit_applies_entry_and_balances() {
    let store = MemoryStore::new();
    let user = store.upsert_user(new_user(1, None)).await.unwrap();

    let entry = NewLedgerEntry::new(user.id, LedgerKind::Wake, Deltas::steps(2), Utc::now())
        .with_key("k1");
    let outcome = store.commit(entry, AccountChange::none()).await.unwrap();

    assert!(matches!(outcome, CommitOutcome::Applied(_)));
    let user = store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(user.balances.steps, 2);
    assert_eq!(store.ledger_len().await, 1);
}

#[tokio::test]
async fn test_commit_duplicate_key_changes_nothing() {
    let store = MemoryStore::new();
    let user = store.upsert_user(new_user(1, None)).await.unwrap();

    let entry = NewLedgerEntry::new(user.id, LedgerKind::Wake, Deltas::steps(1), Utc::now())
        .with_key("k1");
    let first = store
        .commit(entry.clone(), AccountChange::none())
        .await
        .unwrap();
    let second = store.commit(entry, AccountChange::none()).await.unwrap();

    assert!(second.is_duplicate());
    assert_eq!(second.entry().id, first.entry().id);
    let user = store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(user.balances.steps, 1);
}

#[tokio::test]
async fn test_commit_rejects_stale_wake_state() {
    let store = MemoryStore::new();
    let user = store.upsert_user(new_user(1, None)).await.unwrap();
    let stale = WakeState {
        daily_free_count: 2,
        ..WakeState::default()
    };

    let entry = NewLedgerEntry::new(user.id, LedgerKind::Wake, Deltas::steps(1), Utc::now());
    let result = store
        .commit(entry, AccountChange::wake(stale, WakeState::default()))
        .await;

    assert!(matches!(result, Err(StorageError::StaleState)));
    assert_eq!(store.ledger_len().await, 0);
}

#[tokio::test]
async fn test_commit_rejects_overdraft_without_side_effects() {
    let store = MemoryStore::new();
    let user = store.upsert_user(new_user(1, None)).await.unwrap();
    let mission_id = Uuid::new_v4();

    let entry = NewLedgerEntry::new(user.id, LedgerKind::ItemUse, Deltas::coffee(-1), Utc::now());
    let result = store
        .commit(entry, AccountChange::complete_mission(mission_id))
        .await;

    assert!(matches!(
        result,
        Err(StorageError::InsufficientBalance(crate::model::Currency::Coffee))
    ));
    assert!(store
        .get_user_mission(user.id, mission_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_injected_failures() {
    let store = MemoryStore::new();
    let user = store.upsert_user(new_user(1, None)).await.unwrap();

    store.set_fail_on_read(true).await;
    assert!(store.find_by_key("k").await.is_err());
    store.set_fail_on_read(false).await;

    store.set_fail_on_commit(true).await;
    let entry = NewLedgerEntry::new(user.id, LedgerKind::Wake, Deltas::steps(1), Utc::now());
    assert!(store.commit(entry, AccountChange::none()).await.is_err());
}
