//! KOTH ledger - reward ledger and idempotent action engine
//!
//! The economy of the King of the Hill game: wakes gated by cooldown and a
//! daily cap, missions, consumable items, a two-level referral cascade and
//! TON payment verification. Every balance change is a ledger entry keyed by
//! a caller-supplied idempotency key and applied at most once.

pub mod clients;
pub mod clock;
pub mod config;
pub mod model;
pub mod rules;
pub mod services;
pub mod storage;
pub mod ton;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
