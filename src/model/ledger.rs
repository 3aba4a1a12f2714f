//! Immutable ledger entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Deltas;

/// What caused a currency change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Wake,
    RefRewardLvl1,
    RefRewardLvl2,
    MissionReward,
    ItemUse,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Wake => "wake",
            LedgerKind::RefRewardLvl1 => "ref_reward_lvl1",
            LedgerKind::RefRewardLvl2 => "ref_reward_lvl2",
            LedgerKind::MissionReward => "mission_reward",
            LedgerKind::ItemUse => "item_use",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wake" => Ok(LedgerKind::Wake),
            "ref_reward_lvl1" => Ok(LedgerKind::RefRewardLvl1),
            "ref_reward_lvl2" => Ok(LedgerKind::RefRewardLvl2),
            "mission_reward" => Ok(LedgerKind::MissionReward),
            "item_use" => Ok(LedgerKind::ItemUse),
            other => Err(format!("unknown ledger kind: {other}")),
        }
    }
}

/// A recorded currency-affecting event. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: LedgerKind,
    pub deltas: Deltas,
    /// Unique across the whole store when present.
    pub idempotency_key: Option<String>,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Entry to append as part of an atomic commit.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub kind: LedgerKind,
    pub deltas: Deltas,
    pub idempotency_key: Option<String>,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    pub fn new(user_id: Uuid, kind: LedgerKind, deltas: Deltas, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            kind,
            deltas,
            idempotency_key: None,
            meta: serde_json::Value::Object(Default::default()),
            created_at,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    /// Materialise the stored entry under a freshly assigned id.
    pub fn into_entry(self, id: Uuid) -> LedgerEntry {
        LedgerEntry {
            id,
            user_id: self.user_id,
            kind: self.kind,
            deltas: self.deltas,
            idempotency_key: self.idempotency_key,
            meta: self.meta,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_string_forms_match() {
        for kind in [
            LedgerKind::Wake,
            LedgerKind::RefRewardLvl1,
            LedgerKind::RefRewardLvl2,
            LedgerKind::MissionReward,
            LedgerKind::ItemUse,
        ] {
            assert_eq!(kind.as_str().parse::<LedgerKind>(), Ok(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.to_string())
            );
        }
        assert!("bonus".parse::<LedgerKind>().is_err());
    }
}
