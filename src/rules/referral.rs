//! Referral cascade resolution.
//!
//! Level 1 is the acting user's direct referrer, level 2 that referrer's own
//! referrer. There is no level 3. The engine reads the graph and passes
//! presence flags; this module does no lookups.

use serde::{Deserialize, Serialize};

use crate::model::{Deltas, LedgerKind};

/// Upstream grants produced by one action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralGrants {
    pub level1_sandwiches: i64,
    pub level2_coffee: i64,
}

/// Cascade level, used to derive per-level idempotency keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeLevel {
    Level1,
    Level2,
}

impl CascadeLevel {
    pub fn ledger_kind(&self) -> LedgerKind {
        match self {
            CascadeLevel::Level1 => LedgerKind::RefRewardLvl1,
            CascadeLevel::Level2 => LedgerKind::RefRewardLvl2,
        }
    }

    /// Deterministic key for the grant triggered by `source_key`.
    pub fn derive_key(&self, source_key: &str) -> String {
        format!("{source_key}{}", self.suffix())
    }
}

impl CascadeLevel {
    const ALL: [CascadeLevel; 2] = [CascadeLevel::Level1, CascadeLevel::Level2];

    fn suffix(&self) -> &'static str {
        match self {
            CascadeLevel::Level1 => ":lvl1",
            CascadeLevel::Level2 => ":lvl2",
        }
    }
}

/// Whether `key` has the shape of a derived cascade key. Such keys are
/// reserved for grants and never accepted from callers.
pub fn is_derived_key(key: &str) -> bool {
    CascadeLevel::ALL
        .iter()
        .any(|level| key.ends_with(level.suffix()))
}

pub fn compute_referral_grants(
    sandwich_per_ref_action: i64,
    coffee_per_ref2_action: i64,
    has_level1: bool,
    has_level2: bool,
) -> ReferralGrants {
    ReferralGrants {
        level1_sandwiches: if has_level1 { sandwich_per_ref_action } else { 0 },
        level2_coffee: if has_level2 { coffee_per_ref2_action } else { 0 },
    }
}

impl ReferralGrants {
    /// Non-zero grants as (level, deltas) pairs, level 1 first.
    pub fn non_zero(&self) -> Vec<(CascadeLevel, Deltas)> {
        let mut grants = Vec::with_capacity(2);
        if self.level1_sandwiches > 0 {
            grants.push((CascadeLevel::Level1, Deltas::sandwiches(self.level1_sandwiches)));
        }
        if self.level2_coffee > 0 {
            grants.push((CascadeLevel::Level2, Deltas::coffee(self.level2_coffee)));
        }
        grants
    }
}
