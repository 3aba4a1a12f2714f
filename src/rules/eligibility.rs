//! Wake eligibility evaluation.
//!
//! Counter-based policy: a wake is allowed once `next_available_at` has
//! passed and the user still has free actions left today (premium users
//! bypass the daily cap). The daily counter resets whenever the current UTC
//! date differs from the stored reset date.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EconomyConfig;
use crate::model::WakeState;

/// Why a wake is (not) available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    None,
    Cooldown,
    DailyLimit,
}

/// Eligibility snapshot returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub available: bool,
    pub reason: EligibilityReason,
    pub next_available_at: DateTime<Utc>,
    /// Never negative, even when the counter exceeds a lowered cap.
    pub remaining_free_actions: u32,
    pub requires_premium: bool,
}

/// Reset the daily counter when `now` falls on a different UTC date.
pub fn reset_daily_count_if_needed(state: WakeState, now: DateTime<Utc>) -> WakeState {
    let today = now.date_naive();
    if state.daily_reset_date == Some(today) {
        return state;
    }
    WakeState {
        daily_free_count: 0,
        daily_reset_date: Some(today),
        ..state
    }
}

/// Evaluate eligibility against a state whose daily counter is current.
///
/// Callers normally go through [`evaluate_wake`], which performs the reset.
pub fn evaluate(
    now: DateTime<Utc>,
    state: &WakeState,
    config: &EconomyConfig,
    is_premium: bool,
) -> Eligibility {
    let remaining = config
        .max_free_actions_per_day
        .saturating_sub(state.daily_free_count);

    if let Some(next) = state.next_available_at {
        if now < next {
            return Eligibility {
                available: false,
                reason: EligibilityReason::Cooldown,
                next_available_at: next,
                remaining_free_actions: remaining,
                requires_premium: false,
            };
        }
    }

    if remaining == 0 && !is_premium {
        return Eligibility {
            available: false,
            reason: EligibilityReason::DailyLimit,
            next_available_at: next_utc_midnight(now.date_naive()).unwrap_or(now),
            remaining_free_actions: 0,
            requires_premium: true,
        };
    }

    Eligibility {
        available: true,
        reason: EligibilityReason::None,
        next_available_at: now,
        remaining_free_actions: remaining,
        requires_premium: false,
    }
}

/// Apply the daily reset and evaluate. Returns the reset state alongside the
/// verdict so callers can persist it.
pub fn evaluate_wake(
    now: DateTime<Utc>,
    state: WakeState,
    config: &EconomyConfig,
    is_premium: bool,
) -> (WakeState, Eligibility) {
    let state = reset_daily_count_if_needed(state, now);
    let eligibility = evaluate(now, &state, config, is_premium);
    (state, eligibility)
}

/// State after a successful wake at `now`.
///
/// Only wakes that consume a free slot bump the counter; premium wakes past
/// the cap leave it unchanged.
pub fn advance(now: DateTime<Utc>, state: WakeState, config: &EconomyConfig) -> WakeState {
    let state = reset_daily_count_if_needed(state, now);
    let consumes_free_slot = state.daily_free_count < config.max_free_actions_per_day;
    WakeState {
        next_available_at: Some(add_cooldown(now, config.cooldown_ms)),
        daily_free_count: if consumes_free_slot {
            state.daily_free_count + 1
        } else {
            state.daily_free_count
        },
        daily_reset_date: state.daily_reset_date,
    }
}

fn add_cooldown(now: DateTime<Utc>, cooldown_ms: u64) -> DateTime<Utc> {
    let millis = i64::try_from(cooldown_ms).unwrap_or(i64::MAX);
    Duration::try_milliseconds(millis)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn next_utc_midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.succ_opt()?.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, m, s).unwrap()
    }

    fn config() -> EconomyConfig {
        EconomyConfig {
            cooldown_ms: 60 * 60 * 1000,
            ..EconomyConfig::default()
        }
    }

    #[test]
    fn test_new_user_is_eligible_immediately() {
        let (state, e) = evaluate_wake(at(0, 0, 0), WakeState::default(), &config(), false);
        assert!(e.available);
        assert_eq!(e.reason, EligibilityReason::None);
        assert_eq!(e.remaining_free_actions, 3);
        assert_eq!(state.daily_reset_date, Some(at(0, 0, 0).date_naive()));
    }

    #[test]
    fn test_blocks_during_cooldown() {
        let state = WakeState {
            next_available_at: Some(at(1, 30, 0)),
            daily_free_count: 1,
            daily_reset_date: Some(at(0, 0, 0).date_naive()),
        };
        let (_, e) = evaluate_wake(at(1, 0, 0), state, &config(), false);
        assert!(!e.available);
        assert_eq!(e.reason, EligibilityReason::Cooldown);
        assert_eq!(e.next_available_at, at(1, 30, 0));
        assert_eq!(e.remaining_free_actions, 2);
        assert!(!e.requires_premium);
    }

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let next = at(1, 30, 0);
        let state = WakeState {
            next_available_at: Some(next),
            daily_free_count: 0,
            daily_reset_date: Some(next.date_naive()),
        };
        let just_before = next - Duration::milliseconds(1);
        assert!(!evaluate_wake(just_before, state, &config(), false).1.available);
        assert!(evaluate_wake(next, state, &config(), false).1.available);
    }

    #[test]
    fn test_daily_limit_requires_premium() {
        let state = WakeState {
            next_available_at: Some(at(0, 0, 0)),
            daily_free_count: 3,
            daily_reset_date: Some(at(0, 0, 0).date_naive()),
        };
        let (_, e) = evaluate_wake(at(12, 0, 0), state, &config(), false);
        assert!(!e.available);
        assert_eq!(e.reason, EligibilityReason::DailyLimit);
        assert!(e.requires_premium);
        assert_eq!(e.remaining_free_actions, 0);
        assert_eq!(
            e.next_available_at,
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
        );

        let (_, premium) = evaluate_wake(at(12, 0, 0), state, &config(), true);
        assert!(premium.available);
        assert_eq!(premium.remaining_free_actions, 0);
    }

    #[test]
    fn test_counter_resets_on_new_utc_day() {
        let state = WakeState {
            next_available_at: Some(at(0, 0, 0)),
            daily_free_count: 3,
            daily_reset_date: Some(at(0, 0, 0).date_naive()),
        };
        let next_day = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 1).unwrap();
        let (reset, e) = evaluate_wake(next_day, state, &config(), false);
        assert_eq!(reset.daily_free_count, 0);
        assert_eq!(reset.daily_reset_date, Some(next_day.date_naive()));
        assert!(e.available);
        assert_eq!(e.remaining_free_actions, 3);
    }

    #[test]
    fn test_remaining_is_clamped_after_cap_decrease() {
        let state = WakeState {
            next_available_at: None,
            daily_free_count: 5,
            daily_reset_date: Some(at(0, 0, 0).date_naive()),
        };
        let (_, e) = evaluate_wake(at(3, 0, 0), state, &config(), true);
        assert_eq!(e.remaining_free_actions, 0);
    }

    #[test]
    fn test_advance_sets_cooldown_and_counts_free_slot() {
        let now = at(2, 0, 0);
        let next = advance(now, WakeState::default(), &config());
        assert_eq!(next.next_available_at, Some(at(3, 0, 0)));
        assert_eq!(next.daily_free_count, 1);
        assert_eq!(next.daily_reset_date, Some(now.date_naive()));
    }

    #[test]
    fn test_advance_past_cap_does_not_count() {
        let now = at(2, 0, 0);
        let state = WakeState {
            next_available_at: None,
            daily_free_count: 3,
            daily_reset_date: Some(now.date_naive()),
        };
        assert_eq!(advance(now, state, &config()).daily_free_count, 3);
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let cfg = EconomyConfig {
            cooldown_ms: u64::MAX,
            ..EconomyConfig::default()
        };
        let next = advance(at(0, 0, 0), WakeState::default(), &cfg);
        assert!(next.next_available_at.unwrap() > at(0, 0, 0));
    }
}
