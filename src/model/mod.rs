//! Domain types shared by the rules, the stores and the engine.

mod currency;
mod ledger;
mod mission;
mod purchase;
mod user;

pub use currency::{Balances, Currency, Deltas};
pub use ledger::{LedgerEntry, LedgerKind, NewLedgerEntry};
pub use mission::{
    JoinChannelPayload, Mission, MissionDecodeError, MissionKind, TonPaymentPayload, UserMission,
    UserMissionStatus,
};
pub use purchase::{PaymentObservation, Purchase, PurchaseStatus};
pub use user::{referral_code_for, IdentityClaim, NewUser, User, WakeState};
