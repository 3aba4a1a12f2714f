//! AccountStore and LedgerStore interface tests.
//!
//! The atomic commit is the heart of the ledger: these pin down key
//! uniqueness, the balance guard and the wake compare-and-swap.

use chrono::{Duration, Utc};

use koth_ledger::model::{
    Currency, Deltas, IdentityClaim, LedgerKind, MissionKind, NewLedgerEntry, NewUser,
    UserMissionStatus, WakeState,
};
use koth_ledger::storage::{
    AccountChange, AccountStore, CommitOutcome, LedgerStore, MissionStore, StorageError, Stores,
};
use koth_ledger::test_utils::{mission_fixture, WALLET_ADDRESS};

use super::{make_user, make_user_at};

fn entry(user_id: uuid::Uuid, deltas: Deltas, key: &str) -> NewLedgerEntry {
    NewLedgerEntry::new(user_id, LedgerKind::Wake, deltas, Utc::now()).with_key(key)
}

// =============================================================================
// Users
// =============================================================================

pub async fn test_upsert_keeps_identity_and_referrer(stores: &Stores) {
    let referrer = make_user(stores).await;
    let other = make_user(stores).await;
    let user = make_user(stores).await;

    let again = stores
        .accounts
        .upsert_user(NewUser {
            id: uuid::Uuid::new_v4(),
            claim: IdentityClaim {
                external_id: user.external_id,
                username: Some("renamed".to_string()),
                display_name: None,
                locale: Some("es".to_string()),
            },
            referral_code: "other-code".to_string(),
            referrer_id: Some(other.id),
            now: Utc::now(),
        })
        .await
        .expect("upsert should succeed");

    assert_eq!(again.id, user.id, "id must not change on re-login");
    assert_eq!(again.username.as_deref(), Some("renamed"));
    assert_eq!(again.locale.as_deref(), Some("es"));
    assert_eq!(again.referral_code, user.referral_code);
    assert_eq!(again.referrer_id, None, "referrer is only set on insert");

    let found = stores
        .accounts
        .find_by_referral_code(&referrer.referral_code)
        .await
        .expect("lookup should succeed")
        .expect("referrer should exist");
    assert_eq!(found.id, referrer.id);
}

pub async fn test_wallet_and_premium(stores: &Stores) {
    let user = make_user(stores).await;
    let now = Utc::now();

    let linked = stores
        .accounts
        .set_wallet(user.id, Some(WALLET_ADDRESS.to_string()), now)
        .await
        .expect("set_wallet should succeed");
    assert_eq!(linked.wallet_address.as_deref(), Some(WALLET_ADDRESS));

    let premium = stores
        .accounts
        .set_premium_until(user.id, Some(now + Duration::days(1)), now)
        .await
        .expect("set_premium_until should succeed");
    assert!(premium.is_premium(now));
    assert!(!premium.is_premium(now + Duration::days(2)));

    let missing = stores
        .accounts
        .set_wallet(uuid::Uuid::new_v4(), None, now)
        .await;
    assert!(matches!(missing, Err(StorageError::UserNotFound(_))));
}

// =============================================================================
// Commit
// =============================================================================

pub async fn test_commit_applies_deltas(stores: &Stores) {
    let user = make_user(stores).await;
    let key = format!("acct-apply-{}", user.id);

    let outcome = stores
        .accounts
        .commit(
            entry(user.id, Deltas::steps(3).plus(Deltas::coffee(1)), &key),
            AccountChange::none(),
        )
        .await
        .expect("commit should succeed");
    assert!(matches!(outcome, CommitOutcome::Applied(_)));

    let user = stores.accounts.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(user.balances.steps, 3);
    assert_eq!(user.balances.coffee, 1);

    let stored = stores
        .ledger
        .find_by_key(&key)
        .await
        .expect("find_by_key should succeed")
        .expect("entry should exist");
    assert_eq!(stored.id, outcome.entry().id);
    assert_eq!(stored.kind, LedgerKind::Wake);
}

pub async fn test_commit_duplicate_key_is_noop(stores: &Stores) {
    let owner = make_user(stores).await;
    let intruder = make_user(stores).await;
    let key = format!("acct-dup-{}", owner.id);

    let first = stores
        .accounts
        .commit(entry(owner.id, Deltas::steps(1), &key), AccountChange::none())
        .await
        .expect("first commit should succeed");

    let second = stores
        .accounts
        .commit(entry(intruder.id, Deltas::steps(5), &key), AccountChange::none())
        .await
        .expect("duplicate commit should not error");
    assert!(second.is_duplicate());
    assert_eq!(second.entry().id, first.entry().id);
    assert_eq!(second.entry().user_id, owner.id);

    let intruder = stores.accounts.get_user(intruder.id).await.unwrap().unwrap();
    assert_eq!(intruder.balances.steps, 0);
}

pub async fn test_commit_rejects_negative_balance(stores: &Stores) {
    let user = make_user(stores).await;
    let key = format!("acct-neg-{}", user.id);

    let result = stores
        .accounts
        .commit(entry(user.id, Deltas::coffee(-1), &key), AccountChange::none())
        .await;
    assert!(matches!(
        result,
        Err(StorageError::InsufficientBalance(Currency::Coffee))
    ));

    assert!(stores.ledger.find_by_key(&key).await.unwrap().is_none());
    let user = stores.accounts.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(user.balances.coffee, 0);
}

pub async fn test_commit_wake_compare_and_swap(stores: &Stores) {
    let user = make_user(stores).await;
    let now = Utc::now();
    let next = WakeState {
        next_available_at: Some(now + Duration::hours(8)),
        daily_free_count: 1,
        daily_reset_date: Some(now.date_naive()),
    };

    stores
        .accounts
        .commit(
            entry(user.id, Deltas::steps(1), &format!("acct-cas1-{}", user.id)),
            AccountChange::wake(user.wake, next),
        )
        .await
        .expect("first wake should apply");

    // A writer that read the old state loses.
    let stale = stores
        .accounts
        .commit(
            entry(user.id, Deltas::steps(1), &format!("acct-cas2-{}", user.id)),
            AccountChange::wake(user.wake, next),
        )
        .await;
    assert!(matches!(stale, Err(StorageError::StaleState)));

    let user = stores.accounts.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(user.balances.steps, 1);
    assert_eq!(user.wake.daily_free_count, 1);
    assert_eq!(user.wake.daily_reset_date, next.daily_reset_date);
}

pub async fn test_commit_completes_mission_once(stores: &Stores) {
    let user = make_user(stores).await;
    let mission = mission_fixture(MissionKind::ManualConfirm, Deltas::sandwiches(2));
    stores.missions.upsert_mission(&mission).await.unwrap();

    let reward = |key: String| {
        NewLedgerEntry::new(user.id, LedgerKind::MissionReward, mission.reward, Utc::now())
            .with_key(key)
    };

    stores
        .accounts
        .commit(
            reward(format!("acct-m1-{}", user.id)),
            AccountChange::complete_mission(mission.id),
        )
        .await
        .expect("first completion should apply");

    let again = stores
        .accounts
        .commit(
            reward(format!("acct-m2-{}", user.id)),
            AccountChange::complete_mission(mission.id),
        )
        .await;
    assert!(matches!(again, Err(StorageError::MissionAlreadyCompleted(id)) if id == mission.id));

    let progress = stores
        .missions
        .get_user_mission(user.id, mission.id)
        .await
        .unwrap()
        .expect("progress should exist");
    assert_eq!(progress.status, UserMissionStatus::Completed);
    let user = stores.accounts.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(user.balances.sandwiches, 2);
}

// =============================================================================
// Reads
// =============================================================================

pub async fn test_history_newest_first(stores: &Stores) {
    let user = make_user(stores).await;
    let start = Utc::now();

    for i in 0..3 {
        let entry = NewLedgerEntry::new(
            user.id,
            LedgerKind::Wake,
            Deltas::steps(1),
            start + Duration::seconds(i),
        )
        .with_key(format!("acct-hist-{}-{i}", user.id));
        stores
            .accounts
            .commit(entry, AccountChange::none())
            .await
            .unwrap();
    }

    let history = stores.ledger.history(user.id, 2).await.unwrap();
    assert_eq!(history.len(), 2);
    let expected = format!("acct-hist-{}-2", user.id);
    assert_eq!(history[0].idempotency_key.as_deref(), Some(expected.as_str()));
    assert!(history[0].created_at > history[1].created_at);
}

pub async fn test_rank_ties_share_position(stores: &Stores) {
    let base = Utc::now();
    let leader = make_user_at(stores, base).await;
    let tied_a = make_user_at(stores, base + Duration::seconds(1)).await;
    let tied_b = make_user_at(stores, base + Duration::seconds(2)).await;

    for (user, steps) in [(&leader, 5_000_000), (&tied_a, 4_000_000), (&tied_b, 4_000_000)] {
        stores
            .accounts
            .commit(
                entry(user.id, Deltas::steps(steps), &format!("acct-rank-{}", user.id)),
                AccountChange::none(),
            )
            .await
            .unwrap();
    }

    let top = stores.accounts.top_by_steps(3).await.unwrap();
    assert_eq!(top[0].id, leader.id);
    assert_eq!(top[1].id, tied_a.id, "ties break on creation order");
    assert_eq!(top[2].id, tied_b.id);

    assert_eq!(stores.accounts.rank_of(leader.id).await.unwrap(), Some(1));
    assert_eq!(stores.accounts.rank_of(tied_a.id).await.unwrap(), Some(2));
    assert_eq!(stores.accounts.rank_of(tied_b.id).await.unwrap(), Some(2));
    assert_eq!(
        stores.accounts.rank_of(uuid::Uuid::new_v4()).await.unwrap(),
        None
    );
}

/// Run all AccountStore/LedgerStore contract tests.
#[macro_export]
macro_rules! run_account_store_tests {
    ($stores:expr) => {
        use $crate::storage::account_store_tests::*;

        test_upsert_keeps_identity_and_referrer($stores).await;
        println!("  test_upsert_keeps_identity_and_referrer: PASSED");

        test_wallet_and_premium($stores).await;
        println!("  test_wallet_and_premium: PASSED");

        test_commit_applies_deltas($stores).await;
        println!("  test_commit_applies_deltas: PASSED");

        test_commit_duplicate_key_is_noop($stores).await;
        println!("  test_commit_duplicate_key_is_noop: PASSED");

        test_commit_rejects_negative_balance($stores).await;
        println!("  test_commit_rejects_negative_balance: PASSED");

        test_commit_wake_compare_and_swap($stores).await;
        println!("  test_commit_wake_compare_and_swap: PASSED");

        test_commit_completes_mission_once($stores).await;
        println!("  test_commit_completes_mission_once: PASSED");

        test_history_newest_first($stores).await;
        println!("  test_history_newest_first: PASSED");

        test_rank_ties_share_position($stores).await;
        println!("  test_rank_ties_share_position: PASSED");
    };
}
