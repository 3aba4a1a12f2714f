//! Classification of on-chain transfers against a purchase.
//!
//! Checks run in a fixed order: sender, recipient, amount, confirmations.
//! The first failing identity or amount check declines the payment; too few
//! confirmations leave it pending.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::address::same_address;

/// A transfer as reported by the chain oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub hash: String,
    pub lt: Option<String>,
    pub sender: Option<String>,
    pub receiver: String,
    pub value_nano: u64,
    pub comment: Option<String>,
    pub confirmations: u32,
}

/// What the purchase expects to see on chain.
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'a> {
    pub receiver: &'a str,
    pub amount_nano: u64,
    /// Checked only when present (the linked wallet in the single-shot flow).
    pub sender: Option<&'a str>,
    pub min_confirmations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    InvalidSender,
    InvalidRecipient,
    InsufficientAmount,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::InvalidSender => "invalid_sender",
            DeclineReason::InvalidRecipient => "invalid_recipient",
            DeclineReason::InsufficientAmount => "insufficient_amount",
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Confirmed,
    /// Valid transfer, not yet deep enough.
    Pending { confirmations: u32 },
    Declined(DeclineReason),
}

/// Reason recorded while a matched transfer waits for confirmations.
pub const CONFIRMATIONS_PENDING: &str = "confirmations_pending";

pub fn classify(tx: &ChainTransaction, expected: &Expectation<'_>) -> Verdict {
    if let Some(sender) = expected.sender {
        let matches = tx
            .sender
            .as_deref()
            .is_some_and(|actual| same_address(actual, sender));
        if !matches {
            return Verdict::Declined(DeclineReason::InvalidSender);
        }
    }

    if !same_address(&tx.receiver, expected.receiver) {
        return Verdict::Declined(DeclineReason::InvalidRecipient);
    }

    if tx.value_nano < expected.amount_nano {
        return Verdict::Declined(DeclineReason::InsufficientAmount);
    }

    if tx.confirmations < expected.min_confirmations {
        return Verdict::Pending {
            confirmations: tx.confirmations,
        };
    }

    Verdict::Confirmed
}

/// Pick the transfer that pays a purchase from a receiver's recent history.
///
/// A transfer matches when it went to `receiver` carrying exactly `comment`
/// and covers `amount_nano`. Short transfers never match, so the purchase
/// stays open until a full one shows up.
pub fn find_match<'a>(
    transactions: &'a [ChainTransaction],
    receiver: &str,
    comment: &str,
    amount_nano: u64,
) -> Option<&'a ChainTransaction> {
    transactions.iter().find(|tx| {
        tx.comment.as_deref() == Some(comment)
            && same_address(&tx.receiver, receiver)
            && tx.value_nano >= amount_nano
    })
}
