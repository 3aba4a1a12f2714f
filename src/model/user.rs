//! Player accounts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Balances;

/// Cooldown and daily-limit state for the wake action.
///
/// `next_available_at == None` means the user has never acted and is
/// eligible immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeState {
    pub next_available_at: Option<DateTime<Utc>>,
    pub daily_free_count: u32,
    pub daily_reset_date: Option<NaiveDate>,
}

/// A player account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Identity-provider (Telegram) user id.
    pub external_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub locale: Option<String>,
    pub referral_code: String,
    /// Direct referrer. Set once at creation, never reassigned.
    pub referrer_id: Option<Uuid>,
    pub balances: Balances,
    pub wake: WakeState,
    pub premium_until: Option<DateTime<Utc>>,
    pub wallet_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_premium(&self, now: DateTime<Utc>) -> bool {
        self.premium_until.is_some_and(|until| until > now)
    }
}

/// Verified identity tuple supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub external_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub locale: Option<String>,
}

/// Insert-or-refresh request for the account store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub claim: IdentityClaim,
    pub referral_code: String,
    pub referrer_id: Option<Uuid>,
    pub now: DateTime<Utc>,
}

/// Referral code derived from the external id (lowercase base 36).
pub fn referral_code_for(external_id: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let negative = external_id < 0;
    let mut n = external_id.unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
