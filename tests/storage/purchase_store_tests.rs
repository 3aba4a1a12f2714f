//! PurchaseStore interface tests.

use chrono::{Duration, Utc};
use uuid::Uuid;

use koth_ledger::model::{
    Deltas, MissionKind, PaymentObservation, Purchase, PurchaseStatus, TonPaymentPayload, User,
};
use koth_ledger::storage::{MissionStore, PurchaseStore, StorageError, Stores};
use koth_ledger::test_utils::{mission_fixture, RECEIVER_ADDRESS};
use koth_ledger::ton::{payment_comment, NANO_PER_TON};

use super::make_user;

async fn payment_mission(stores: &Stores) -> Uuid {
    let mission = mission_fixture(
        MissionKind::TonPayment(TonPaymentPayload::default()),
        Deltas::steps(10),
    );
    stores.missions.upsert_mission(&mission).await.unwrap();
    mission.id
}

fn purchase(user: &User, mission_id: Uuid, intent_key: &str) -> Purchase {
    let now = Utc::now();
    let invoice_id = Uuid::new_v4().to_string();
    Purchase {
        id: Uuid::new_v4(),
        user_id: user.id,
        mission_id,
        provider: "ton".to_string(),
        status: PurchaseStatus::Created,
        comment: payment_comment(&user.id, &invoice_id),
        invoice_id,
        intent_key: Some(intent_key.to_string()),
        receiver: RECEIVER_ADDRESS.to_string(),
        sender: None,
        amount_nano: NANO_PER_TON,
        tx_hash: None,
        tx_lt: None,
        confirmations: 0,
        failure_reason: None,
        created_at: now,
        updated_at: now,
        paid_at: None,
    }
}

pub async fn test_insert_and_lookup(stores: &Stores) {
    let user = make_user(stores).await;
    let mission_id = payment_mission(stores).await;
    let key = format!("intent-{}", user.id);
    let created = purchase(&user, mission_id, &key);
    stores.purchases.insert(&created).await.unwrap();

    let by_invoice = stores
        .purchases
        .get_by_invoice(&created.invoice_id)
        .await
        .unwrap()
        .expect("purchase should exist");
    assert_eq!(by_invoice.id, created.id);
    assert_eq!(by_invoice.amount_nano, NANO_PER_TON);
    assert_eq!(by_invoice.comment, created.comment);
    assert_eq!(by_invoice.status, PurchaseStatus::Created);

    let by_key = stores
        .purchases
        .find_by_intent_key(&key)
        .await
        .unwrap()
        .expect("purchase should be found by intent key");
    assert_eq!(by_key.invoice_id, created.invoice_id);

    // Same intent key, new invoice.
    let duplicate = purchase(&user, mission_id, &key);
    let result = stores.purchases.insert(&duplicate).await;
    assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
}

pub async fn test_transition_is_compare_and_swap(stores: &Stores) {
    let user = make_user(stores).await;
    let mission_id = payment_mission(stores).await;
    let created = purchase(&user, mission_id, &format!("cas-{}", user.id));
    stores.purchases.insert(&created).await.unwrap();
    let now = Utc::now();

    let observation = PaymentObservation {
        tx_hash: Some("tx-cas".to_string()),
        tx_lt: Some("42".to_string()),
        sender: Some("EQsender".to_string()),
        confirmations: 3,
        reason: None,
    };
    let paid = stores
        .purchases
        .transition(
            &created.invoice_id,
            &PurchaseStatus::OPEN,
            PurchaseStatus::Paid,
            &observation,
            now,
        )
        .await
        .unwrap()
        .expect("first transition should win");
    assert_eq!(paid.status, PurchaseStatus::Paid);
    assert_eq!(paid.tx_hash.as_deref(), Some("tx-cas"));
    assert_eq!(paid.tx_lt.as_deref(), Some("42"));
    assert_eq!(paid.sender.as_deref(), Some("EQsender"));
    assert_eq!(paid.confirmations, 3);
    assert!(paid.paid_at.is_some());

    let lost = stores
        .purchases
        .transition(
            &created.invoice_id,
            &PurchaseStatus::OPEN,
            PurchaseStatus::Failed,
            &PaymentObservation::default(),
            now,
        )
        .await
        .unwrap();
    assert!(lost.is_none(), "terminal purchases never move");

    let stored = stores
        .purchases
        .get_by_invoice(&created.invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PurchaseStatus::Paid);
}

pub async fn test_find_active_skips_failed(stores: &Stores) {
    let user = make_user(stores).await;
    let mission_id = payment_mission(stores).await;
    let first = purchase(&user, mission_id, &format!("active1-{}", user.id));
    stores.purchases.insert(&first).await.unwrap();

    let active = stores
        .purchases
        .find_active(user.id, mission_id)
        .await
        .unwrap()
        .expect("created purchase is active");
    assert_eq!(active.invoice_id, first.invoice_id);

    stores
        .purchases
        .transition(
            &first.invoice_id,
            &PurchaseStatus::OPEN,
            PurchaseStatus::Failed,
            &PaymentObservation {
                reason: Some("insufficient_amount".to_string()),
                ..PaymentObservation::default()
            },
            Utc::now(),
        )
        .await
        .unwrap()
        .expect("transition should apply");
    assert!(stores
        .purchases
        .find_active(user.id, mission_id)
        .await
        .unwrap()
        .is_none());

    let failed = stores
        .purchases
        .get_by_invoice(&first.invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.failure_reason.as_deref(), Some("insufficient_amount"));
}

pub async fn test_list_open_least_recently_updated_first(stores: &Stores) {
    let user = make_user(stores).await;
    let mission_id = payment_mission(stores).await;
    let base = Utc::now() - Duration::days(3650);

    let mut older = purchase(&user, mission_id, &format!("open1-{}", user.id));
    older.created_at = base;
    older.updated_at = base;
    let mut newer = purchase(&user, mission_id, &format!("open2-{}", user.id));
    newer.created_at = base + Duration::seconds(1);
    newer.updated_at = base + Duration::seconds(1);
    newer.status = PurchaseStatus::Pending;
    let mut settled = purchase(&user, mission_id, &format!("open3-{}", user.id));
    settled.created_at = base - Duration::seconds(1);
    settled.updated_at = base - Duration::seconds(1);
    settled.status = PurchaseStatus::Paid;

    for p in [&newer, &settled, &older] {
        stores.purchases.insert(p).await.unwrap();
    }

    let open = stores.purchases.list_open(2).await.unwrap();
    let invoices: Vec<_> = open.iter().map(|p| p.invoice_id.as_str()).collect();
    assert_eq!(
        invoices,
        vec![older.invoice_id.as_str(), newer.invoice_id.as_str()]
    );

    // Touching a purchase sends it to the back of the queue.
    stores
        .purchases
        .transition(
            &older.invoice_id,
            &PurchaseStatus::OPEN,
            PurchaseStatus::Pending,
            &PaymentObservation::default(),
            Utc::now(),
        )
        .await
        .unwrap()
        .expect("open purchase should move");
    let open = stores.purchases.list_open(1).await.unwrap();
    assert_eq!(open[0].invoice_id, newer.invoice_id);
}

pub async fn test_paid_transaction_hash_is_unique(stores: &Stores) {
    let user = make_user(stores).await;
    let mission_id = payment_mission(stores).await;
    let first = purchase(&user, mission_id, &format!("txu1-{}", user.id));
    let second = purchase(&user, mission_id, &format!("txu2-{}", user.id));
    stores.purchases.insert(&first).await.unwrap();
    stores.purchases.insert(&second).await.unwrap();

    let observation = PaymentObservation {
        tx_hash: Some(format!("tx-once-{}", user.id)),
        confirmations: 1,
        ..PaymentObservation::default()
    };

    // An unpaid purchase may carry the hash; only one may be paid by it.
    stores
        .purchases
        .transition(
            &second.invoice_id,
            &PurchaseStatus::OPEN,
            PurchaseStatus::Pending,
            &observation,
            Utc::now(),
        )
        .await
        .unwrap()
        .expect("pending transition should apply");
    stores
        .purchases
        .transition(
            &first.invoice_id,
            &PurchaseStatus::OPEN,
            PurchaseStatus::Paid,
            &observation,
            Utc::now(),
        )
        .await
        .unwrap()
        .expect("first payment should apply");

    let reused = stores
        .purchases
        .transition(
            &second.invoice_id,
            &PurchaseStatus::OPEN,
            PurchaseStatus::Paid,
            &observation,
            Utc::now(),
        )
        .await;
    assert!(matches!(reused, Err(StorageError::DuplicateKey(_))));

    let stored = stores
        .purchases
        .get_by_invoice(&second.invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PurchaseStatus::Pending);
}

/// Run all PurchaseStore contract tests.
#[macro_export]
macro_rules! run_purchase_store_tests {
    ($stores:expr) => {
        use $crate::storage::purchase_store_tests::*;

        test_insert_and_lookup($stores).await;
        println!("  test_insert_and_lookup: PASSED");

        test_transition_is_compare_and_swap($stores).await;
        println!("  test_transition_is_compare_and_swap: PASSED");

        test_find_active_skips_failed($stores).await;
        println!("  test_find_active_skips_failed: PASSED");

        test_list_open_least_recently_updated_first($stores).await;
        println!("  test_list_open_least_recently_updated_first: PASSED");

        test_paid_transaction_hash_is_unique($stores).await;
        println!("  test_paid_transaction_hash_is_unique: PASSED");
    };
}
