//! Shared storage integration tests.
//!
//! Tests the store interfaces against every implementation. Each
//! implementation module runs these contract functions through the macros.

pub mod account_store_tests;
pub mod mission_store_tests;
pub mod purchase_store_tests;

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use koth_ledger::model::User;
use koth_ledger::storage::{AccountStore, Stores};
use koth_ledger::test_utils::new_user;

static NEXT_EXTERNAL_ID: AtomicI64 = AtomicI64::new(10_000);

/// Insert a user with a fresh external id.
pub async fn make_user(stores: &Stores) -> User {
    make_user_at(stores, Utc::now()).await
}

/// Insert a user created at `now`.
pub async fn make_user_at(stores: &Stores, now: DateTime<Utc>) -> User {
    let external_id = NEXT_EXTERNAL_ID.fetch_add(1, Ordering::Relaxed);
    let mut user = new_user(external_id, None);
    user.now = now;
    stores
        .accounts
        .upsert_user(user)
        .await
        .expect("upsert_user should succeed")
}
