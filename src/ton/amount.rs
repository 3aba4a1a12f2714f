//! Decimal TON ↔ nano-TON conversion. Integer arithmetic only.

/// Nano-TON per TON.
pub const NANO_PER_TON: u64 = 1_000_000_000;
/// Fractional digits a TON amount can carry.
pub const TON_DECIMALS: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Invalid TON amount format: {0:?}")]
    InvalidFormat(String),

    #[error("TON amount supports up to 9 decimal places: {0:?}")]
    TooManyDecimals(String),

    #[error("TON amount out of range: {0:?}")]
    Overflow(String),
}

/// Parse a human decimal amount such as `"1"`, `"0.25"` or `" 12.000000001 "`
/// into nano-TON.
///
/// Signs, exponents, empty parts (`".5"`, `"5."`) and more than nine
/// fractional digits are rejected.
pub fn parse_ton_amount(raw: &str) -> Result<u64, AmountError> {
    let trimmed = raw.trim();
    let invalid = || AmountError::InvalidFormat(raw.to_string());

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (trimmed, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !fraction.map_or(true, all_digits) {
        return Err(invalid());
    }

    let fraction = fraction.unwrap_or("");
    if fraction.len() > TON_DECIMALS {
        return Err(AmountError::TooManyDecimals(raw.to_string()));
    }

    let overflow = || AmountError::Overflow(raw.to_string());
    let whole: u64 = whole.parse().map_err(|_| overflow())?;
    let fraction: u64 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<width$}", width = TON_DECIMALS);
        padded.parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(NANO_PER_TON)
        .and_then(|nano| nano.checked_add(fraction))
        .ok_or_else(overflow)
}

/// Parse an integer nano-TON value as reported by an indexer.
pub fn parse_nano(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

/// Render nano-TON as a decimal TON string without trailing zeros.
pub fn format_nano(nano: u64) -> String {
    let whole = nano / NANO_PER_TON;
    let fraction = nano % NANO_PER_TON;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:0width$}", width = TON_DECIMALS);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
