//! Missions and per-user mission progress.
//!
//! A mission's payload depends on its type. The store keeps the type name and
//! a JSON payload side by side; [`MissionKind::decode`] turns them into a
//! typed variant at the storage boundary so the engine never inspects raw
//! JSON.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Deltas;

/// Payload of a `join_channel` mission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinChannelPayload {
    /// Channel to check membership in. Falls back to the configured
    /// required channel when absent.
    pub channel_id: Option<String>,
}

/// Payload of a `ton_payment` / `activate_web3` mission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TonPaymentPayload {
    /// Receiver override; the configured receiver is used when absent.
    pub receiver: Option<String>,
    /// Decimal TON amount override; the configured activation amount is used when absent.
    pub amount_ton: Option<String>,
}

/// Mission type with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionKind {
    JoinChannel(JoinChannelPayload),
    ConnectWallet,
    ManualConfirm,
    TonPayment(TonPaymentPayload),
}

/// Raised when a stored mission cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum MissionDecodeError {
    #[error("Unknown mission type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for mission type {kind}: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MissionKind {
    pub const JOIN_CHANNEL: &'static str = "join_channel";
    pub const CONNECT_WALLET: &'static str = "connect_wallet";
    pub const MANUAL_CONFIRM: &'static str = "manual_confirm";
    pub const TON_PAYMENT: &'static str = "ton_payment";
    /// Legacy name of the TON payment mission.
    pub const ACTIVATE_WEB3: &'static str = "activate_web3";

    pub fn type_name(&self) -> &'static str {
        match self {
            MissionKind::JoinChannel(_) => Self::JOIN_CHANNEL,
            MissionKind::ConnectWallet => Self::CONNECT_WALLET,
            MissionKind::ManualConfirm => Self::MANUAL_CONFIRM,
            MissionKind::TonPayment(_) => Self::TON_PAYMENT,
        }
    }

    /// Decode a stored `(type, payload)` pair.
    ///
    /// A `null` payload is treated as an empty object.
    pub fn decode(kind: &str, payload: &serde_json::Value) -> Result<Self, MissionDecodeError> {
        let payload = if payload.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            payload.clone()
        };
        let invalid = |source| MissionDecodeError::InvalidPayload {
            kind: kind.to_string(),
            source,
        };

        match kind {
            Self::JOIN_CHANNEL => Ok(MissionKind::JoinChannel(
                serde_json::from_value(payload).map_err(invalid)?,
            )),
            Self::CONNECT_WALLET => Ok(MissionKind::ConnectWallet),
            Self::MANUAL_CONFIRM => Ok(MissionKind::ManualConfirm),
            Self::TON_PAYMENT | Self::ACTIVATE_WEB3 => Ok(MissionKind::TonPayment(
                serde_json::from_value(payload).map_err(invalid)?,
            )),
            other => Err(MissionDecodeError::UnknownType(other.to_string())),
        }
    }

    /// Encode into the stored `(type, payload)` pair.
    pub fn encode(&self) -> (&'static str, serde_json::Value) {
        let payload = match self {
            MissionKind::JoinChannel(p) => serde_json::to_value(p),
            MissionKind::TonPayment(p) => serde_json::to_value(p),
            MissionKind::ConnectWallet | MissionKind::ManualConfirm => {
                Ok(serde_json::Value::Object(Default::default()))
            }
        }
        .unwrap_or(serde_json::Value::Null);
        (self.type_name(), payload)
    }

    /// Payment missions are completed by the payment flow only.
    pub fn is_payment(&self) -> bool {
        matches!(self, MissionKind::TonPayment(_))
    }
}

/// A mission definition. Read-only to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    pub id: Uuid,
    pub kind: MissionKind,
    pub title: String,
    pub description: String,
    /// Locale → title.
    pub title_i18n: BTreeMap<String, String>,
    /// Locale → description.
    pub description_i18n: BTreeMap<String, String>,
    pub reward: Deltas,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Mission {
    /// Active and inside its (inclusive) activity window.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |starts| starts <= now)
            && self.ends_at.map_or(true, |ends| ends >= now)
    }

    pub fn localized_title(&self, locale: &str) -> &str {
        localize(&self.title_i18n, locale, &self.title)
    }

    pub fn localized_description(&self, locale: &str) -> &str {
        localize(&self.description_i18n, locale, &self.description)
    }
}

fn localize<'a>(map: &'a BTreeMap<String, String>, locale: &str, fallback: &'a str) -> &'a str {
    map.get(locale)
        .or_else(|| map.get("en"))
        .map(String::as_str)
        .unwrap_or(fallback)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserMissionStatus {
    Pending,
    Completed,
}

impl UserMissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserMissionStatus::Pending => "pending",
            UserMissionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UserMissionStatus::Pending),
            "completed" => Some(UserMissionStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for UserMissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one user on one mission. Unique per (user, mission).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMission {
    pub user_id: Uuid,
    pub mission_id: Uuid,
    pub status: UserMissionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_join_channel_payload() {
        let kind = MissionKind::decode("join_channel", &json!({"channel_id": "@koth"})).unwrap();
        assert_eq!(
            kind,
            MissionKind::JoinChannel(JoinChannelPayload {
                channel_id: Some("@koth".to_string())
            })
        );
    }

    #[test]
    fn test_decode_activate_web3_alias() {
        let kind = MissionKind::decode("activate_web3", &serde_json::Value::Null).unwrap();
        assert_eq!(kind, MissionKind::TonPayment(TonPaymentPayload::default()));
        assert!(kind.is_payment());
        assert_eq!(kind.type_name(), "ton_payment");
    }

    #[test]
    fn test_decode_rejects_unknown_type_and_bad_payload() {
        assert!(matches!(
            MissionKind::decode("spin_wheel", &json!({})),
            Err(MissionDecodeError::UnknownType(_))
        ));
        assert!(matches!(
            MissionKind::decode("join_channel", &json!({"channel_id": 42})),
            Err(MissionDecodeError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_encode_then_decode_preserves_payload() {
        let kind = MissionKind::TonPayment(TonPaymentPayload {
            receiver: Some("UQ-receiver".to_string()),
            amount_ton: Some("0.5".to_string()),
        });
        let (name, payload) = kind.encode();
        assert_eq!(MissionKind::decode(name, &payload).unwrap(), kind);
    }

    #[test]
    fn test_window_and_localization() {
        let now = Utc::now();
        let mut mission = crate::test_utils::mission_fixture(MissionKind::ManualConfirm, Deltas::steps(1));
        mission.title_i18n.insert("en".into(), "Join".into());
        mission.title_i18n.insert("es".into(), "Unirse".into());
        assert_eq!(mission.localized_title("es"), "Unirse");
        assert_eq!(mission.localized_title("de"), "Join");
        assert_eq!(mission.localized_description("es"), mission.description);

        assert!(mission.is_available(now));
        mission.starts_at = Some(now + chrono::Duration::minutes(1));
        assert!(!mission.is_available(now));
        mission.starts_at = None;
        mission.ends_at = Some(now - chrono::Duration::minutes(1));
        assert!(!mission.is_available(now));
        mission.ends_at = None;
        mission.is_active = false;
        assert!(!mission.is_available(now));
    }
}
