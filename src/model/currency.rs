//! In-game currencies and balance arithmetic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three game currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Steps,
    Sandwiches,
    Coffee,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Steps => "steps",
            Currency::Sandwiches => "sandwiches",
            Currency::Coffee => "coffee",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-negative per-user balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub steps: i64,
    pub sandwiches: i64,
    pub coffee: i64,
}

impl Balances {
    pub fn get(&self, currency: Currency) -> i64 {
        match currency {
            Currency::Steps => self.steps,
            Currency::Sandwiches => self.sandwiches,
            Currency::Coffee => self.coffee,
        }
    }

    /// Apply a signed delta.
    ///
    /// Returns the first currency that would go negative, leaving `self`
    /// untouched in that case.
    pub fn apply(&mut self, deltas: &Deltas) -> Result<(), Currency> {
        let next = Balances {
            steps: self.steps + deltas.steps,
            sandwiches: self.sandwiches + deltas.sandwiches,
            coffee: self.coffee + deltas.coffee,
        };
        if next.steps < 0 {
            return Err(Currency::Steps);
        }
        if next.sandwiches < 0 {
            return Err(Currency::Sandwiches);
        }
        if next.coffee < 0 {
            return Err(Currency::Coffee);
        }
        *self = next;
        Ok(())
    }
}

/// Signed per-currency change carried by a ledger entry.
///
/// Mission rewards are expressed with the same shape (all components
/// non-negative).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deltas {
    pub steps: i64,
    pub sandwiches: i64,
    pub coffee: i64,
}

impl Deltas {
    pub fn steps(amount: i64) -> Self {
        Self {
            steps: amount,
            ..Self::default()
        }
    }

    pub fn sandwiches(amount: i64) -> Self {
        Self {
            sandwiches: amount,
            ..Self::default()
        }
    }

    pub fn coffee(amount: i64) -> Self {
        Self {
            coffee: amount,
            ..Self::default()
        }
    }

    pub fn single(currency: Currency, amount: i64) -> Self {
        match currency {
            Currency::Steps => Self::steps(amount),
            Currency::Sandwiches => Self::sandwiches(amount),
            Currency::Coffee => Self::coffee(amount),
        }
    }

    pub fn plus(self, other: Deltas) -> Self {
        Self {
            steps: self.steps + other.steps,
            sandwiches: self.sandwiches + other.sandwiches,
            coffee: self.coffee + other.coffee,
        }
    }
}
