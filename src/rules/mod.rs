//! Pure economy rules. No I/O.

pub mod eligibility;
pub mod referral;

pub use eligibility::{
    advance, evaluate, evaluate_wake, reset_daily_count_if_needed, Eligibility,
    EligibilityReason,
};
pub use referral::{compute_referral_grants, is_derived_key, CascadeLevel, ReferralGrants};
