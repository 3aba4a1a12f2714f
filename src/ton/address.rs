//! TON user-friendly address handling.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid TON wallet address: {0:?}")]
    InvalidFormat(String),
}

/// Accept `EQ`/`UQ` followed by 46 to 48 base64url characters.
///
/// Returns the trimmed address.
pub fn validate_address(raw: &str) -> Result<String, AddressError> {
    let trimmed = raw.trim();
    let invalid = || AddressError::InvalidFormat(raw.to_string());

    let body = trimmed
        .strip_prefix("EQ")
        .or_else(|| trimmed.strip_prefix("UQ"))
        .ok_or_else(invalid)?;

    let base64url = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if !(46..=48).contains(&body.len()) || !body.chars().all(base64url) {
        return Err(invalid());
    }
    Ok(trimmed.to_string())
}

/// Comparison form: trimmed and lowercased.
pub fn normalize_address(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn same_address(a: &str, b: &str) -> bool {
    normalize_address(a) == normalize_address(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "UQBEGqJqonCwu_jO2IazkJoXTj53F4v2PtuHFaALEtM7CJcX";

    #[test]
    fn test_validate_accepts_user_friendly_forms() {
        assert_eq!(validate_address(VALID).unwrap(), VALID);
        let bounceable = format!("EQ{}", &VALID[2..]);
        assert!(validate_address(&bounceable).is_ok());
        assert_eq!(validate_address(&format!("  {VALID} ")).unwrap(), VALID);
    }

    #[test]
    fn test_validate_rejects_bad_addresses() {
        let too_short = &VALID[..40];
        let bad_char = format!("{}+", &VALID[..VALID.len() - 1]);
        for raw in ["", "0:abcdef", too_short, bad_char.as_str(), "XQBEGqJqonCwu_jO2IazkJoXTj53F4v2PtuHFaALEtM7CJcX"] {
            assert!(validate_address(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_same_address_ignores_case_and_whitespace() {
        assert!(same_address(VALID, &format!(" {} ", VALID.to_lowercase())));
        assert!(!same_address(VALID, "UQother"));
    }
}
