//! The action engine.
//!
//! [`ActionEngine`] composes the stores, the pure rules and the external
//! oracles. Each mutating operation takes a caller-supplied idempotency key
//! and is applied at most once per key:
//!
//! - [`ActionEngine::wake`] with the referral cascade
//! - [`ActionEngine::complete_mission`]
//! - [`ActionEngine::use_item`]
//! - [`ActionEngine::create_payment_intent`], then [`ActionEngine::sync_payment`]
//!   or [`ActionEngine::confirm_payment`]

mod accounts;
mod engine;
mod error;
mod items;
mod missions;
mod payments;
mod read_models;
mod wake;

pub use engine::{ActionEngine, ActionEngineBuilder, MAX_IDEMPOTENCY_KEY_LEN};
pub use error::{ActionError, Result};
pub use items::{ItemKey, ItemOutcome, UseMode};
pub use missions::MissionOutcome;
pub use payments::{PaymentIntent, PaymentSync, SweepReport, INTENT_TTL_SECS, TON_PROVIDER};
pub use read_models::{
    Leaderboard, LeaderboardRow, MissionView, Profile, MAX_HISTORY_LIMIT, MAX_LEADERBOARD_LIMIT,
};
pub use wake::WakeOutcome;
