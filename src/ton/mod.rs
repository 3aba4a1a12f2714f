//! TON payment primitives: amounts, addresses and transfer classification.

mod address;
mod amount;
mod verify;

pub use address::{normalize_address, same_address, validate_address, AddressError};
pub use amount::{
    format_nano, parse_nano, parse_ton_amount, AmountError, NANO_PER_TON, TON_DECIMALS,
};
pub use verify::{
    classify, find_match, ChainTransaction, DeclineReason, Expectation, Verdict,
    CONFIRMATIONS_PENDING,
};

/// Comment a payer must attach to bind a transfer to an invoice.
pub fn payment_comment(user_id: &uuid::Uuid, invoice_id: &str) -> String {
    format!("KOTH_ACTIVATE:{user_id}:{invoice_id}")
}
