//! Fixtures and an in-memory engine harness for tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::clients::mock::{MockChainOracle, MockMembershipOracle, RecordingNotifier};
use crate::clock::FixedClock;
use crate::config::{EconomyConfig, TelegramConfig, TonConfig};
use crate::model::{
    referral_code_for, Balances, Deltas, IdentityClaim, Mission, MissionKind, NewUser,
    TonPaymentPayload, User, WakeState,
};
use crate::services::ActionEngine;
use crate::storage::{MissionStore, Stores};
use crate::storage::memory::MemoryStore;
use crate::ton::ChainTransaction;

/// A valid user-friendly TON address.
pub const RECEIVER_ADDRESS: &str = "UQBEGqJqonCwu_jO2IazkJoXTj53F4v2PtuHFaALEtM7CJcX";
/// A second valid address, used as a player wallet.
pub const WALLET_ADDRESS: &str = "EQCD39VS5jcptHL8vMjEXrzGaRcCVYto7HUn4bpAOg8xqB2N";

/// Start of the harness clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn claim(external_id: i64) -> IdentityClaim {
    IdentityClaim {
        external_id,
        username: Some(format!("player{external_id}")),
        display_name: Some(format!("Player {external_id}")),
        locale: Some("en".to_string()),
    }
}

pub fn new_user(external_id: i64, referrer_id: Option<Uuid>) -> NewUser {
    NewUser {
        id: Uuid::new_v4(),
        claim: claim(external_id),
        referral_code: referral_code_for(external_id),
        referrer_id,
        now: Utc::now(),
    }
}

pub fn user_fixture(external_id: i64) -> User {
    let now = Utc::now();
    let claim = claim(external_id);
    User {
        id: Uuid::new_v4(),
        external_id,
        username: claim.username,
        display_name: claim.display_name,
        locale: claim.locale,
        referral_code: referral_code_for(external_id),
        referrer_id: None,
        balances: Balances::default(),
        wake: WakeState::default(),
        premium_until: None,
        wallet_address: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn mission_fixture(kind: MissionKind, reward: Deltas) -> Mission {
    Mission {
        id: Uuid::new_v4(),
        title: format!("{} mission", kind.type_name()),
        description: "Complete it".to_string(),
        kind,
        title_i18n: BTreeMap::new(),
        description_i18n: BTreeMap::new(),
        reward,
        is_active: true,
        starts_at: None,
        ends_at: None,
        created_at: Utc::now(),
    }
}

/// Incoming transfer to [`RECEIVER_ADDRESS`].
pub fn transfer(hash: &str, value_nano: u64, comment: &str, confirmations: u32) -> ChainTransaction {
    ChainTransaction {
        hash: hash.to_string(),
        lt: Some("1000".to_string()),
        sender: Some(WALLET_ADDRESS.to_string()),
        receiver: RECEIVER_ADDRESS.to_string(),
        value_nano,
        comment: Some(comment.to_string()),
        confirmations,
    }
}

/// Engine wired to in-memory stores and mock collaborators.
pub struct Harness {
    pub engine: ActionEngine,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub chain: Arc<MockChainOracle>,
    pub membership: Arc<MockMembershipOracle>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_economy(EconomyConfig::default())
    }

    pub fn with_economy(economy: EconomyConfig) -> Self {
        let (stores, store) = Stores::memory(economy);
        Self::with_stores(stores, store)
    }

    /// Harness over `stores`, where `store` is the memory store behind them.
    pub fn with_stores(stores: Stores, store: Arc<MemoryStore>) -> Self {
        let clock = Arc::new(FixedClock::new(t0()));
        let chain = Arc::new(MockChainOracle::new());
        let membership = Arc::new(MockMembershipOracle::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let engine = ActionEngine::builder(stores, chain.clone(), membership.clone())
            .with_clock(clock.clone())
            .with_notifier(notifier.clone())
            .with_ton_config(TonConfig {
                receiver: RECEIVER_ADDRESS.to_string(),
                activation_amount: "1".to_string(),
                min_confirmations: 1,
                ..TonConfig::default()
            })
            .with_telegram_config(TelegramConfig {
                required_channel_id: Some("@koth".to_string()),
                ..TelegramConfig::default()
            })
            .build();

        Self {
            engine,
            store,
            clock,
            chain,
            membership,
            notifier,
        }
    }

    pub async fn register(&self, external_id: i64, referral_code: Option<&str>) -> User {
        self.engine
            .register(claim(external_id), referral_code)
            .await
            .unwrap_or_else(|e| panic!("register {external_id}: {e}"))
    }

    pub async fn add_mission(&self, kind: MissionKind, reward: Deltas) -> Mission {
        let mission = mission_fixture(kind, reward);
        self.store
            .upsert_mission(&mission)
            .await
            .unwrap_or_else(|e| panic!("upsert mission: {e}"));
        mission
    }

    pub async fn add_payment_mission(&self, reward: Deltas) -> Mission {
        self.add_mission(MissionKind::TonPayment(TonPaymentPayload::default()), reward)
            .await
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
