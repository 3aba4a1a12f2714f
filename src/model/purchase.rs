//! Payment-mission attempts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purchase lifecycle: `created → pending → paid | failed`.
///
/// `paid` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Created,
    Pending,
    Paid,
    Failed,
}

impl PurchaseStatus {
    pub const OPEN: [PurchaseStatus; 2] = [PurchaseStatus::Created, PurchaseStatus::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Created => "created",
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(PurchaseStatus::Created),
            "pending" => Some(PurchaseStatus::Pending),
            // Single-shot confirm variant used confirmed/declined.
            "paid" | "confirmed" => Some(PurchaseStatus::Paid),
            "failed" | "declined" => Some(PurchaseStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStatus::Paid | PurchaseStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(&self, next: PurchaseStatus) -> bool {
        match (self, next) {
            (PurchaseStatus::Created, PurchaseStatus::Pending) => true,
            (PurchaseStatus::Created | PurchaseStatus::Pending, PurchaseStatus::Paid) => true,
            (PurchaseStatus::Created | PurchaseStatus::Pending, PurchaseStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A TON payment attempt bound to a mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mission_id: Uuid,
    pub provider: String,
    pub status: PurchaseStatus,
    /// Correlation token handed to the client.
    pub invoice_id: String,
    /// Idempotency key of the request that created the intent.
    pub intent_key: Option<String>,
    pub receiver: String,
    pub sender: Option<String>,
    /// Required amount in nano-TON.
    pub amount_nano: u64,
    /// Comment the on-chain transfer must carry.
    pub comment: String,
    pub tx_hash: Option<String>,
    pub tx_lt: Option<String>,
    pub confirmations: u32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Purchase {
    /// Idempotency key of the reward grant tied to this purchase.
    pub fn reward_key(&self) -> String {
        format!("purchase:{}", self.invoice_id)
    }
}

/// Observed on-chain facts recorded with a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentObservation {
    pub tx_hash: Option<String>,
    pub tx_lt: Option<String>,
    pub sender: Option<String>,
    pub confirmations: u32,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_never_move() {
        for terminal in [PurchaseStatus::Paid, PurchaseStatus::Failed] {
            for next in [
                PurchaseStatus::Created,
                PurchaseStatus::Pending,
                PurchaseStatus::Paid,
                PurchaseStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(PurchaseStatus::Created.can_transition_to(PurchaseStatus::Pending));
        assert!(PurchaseStatus::Pending.can_transition_to(PurchaseStatus::Paid));
        assert!(PurchaseStatus::Created.can_transition_to(PurchaseStatus::Failed));
        assert!(!PurchaseStatus::Pending.can_transition_to(PurchaseStatus::Created));
        assert!(!PurchaseStatus::Pending.can_transition_to(PurchaseStatus::Pending));
    }

    #[test]
    fn test_parse_accepts_single_shot_names() {
        assert_eq!(PurchaseStatus::parse("confirmed"), Some(PurchaseStatus::Paid));
        assert_eq!(PurchaseStatus::parse("declined"), Some(PurchaseStatus::Failed));
        assert_eq!(PurchaseStatus::parse("refunded"), None);
    }
}
