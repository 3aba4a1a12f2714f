//! HTTP chain oracle.
//!
//! Lists a receiver's transactions through a toncenter-style v2 indexer
//! (`/v2/getTransactions`) and fetches single transactions through a
//! tonapi-style endpoint (`/v2/blockchain/transactions/{hash}`).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{status_error, ChainOracle, OracleError};
use crate::config::TonConfig;
use crate::ton::{parse_nano, ChainTransaction};

/// Indexed transactions sit in committed blocks; indexers that do not report
/// a depth are taken as one confirmation deep.
const DEFAULT_CONFIRMATIONS: u32 = 1;

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    ok: Option<bool>,
    #[serde(default)]
    result: Option<Vec<V2Transaction>>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V2Transaction {
    transaction_id: V2TransactionId,
    in_msg: V2Message,
    confirmations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V2TransactionId {
    lt: Option<String>,
    hash: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V2Message {
    source: Option<String>,
    destination: Option<String>,
    value: Option<String>,
    message: Option<String>,
    msg_data: Option<V2MessageData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V2MessageData {
    text: Option<String>,
}

impl V2Transaction {
    /// `None` for transactions without a usable incoming transfer.
    fn into_chain_transaction(self) -> Option<ChainTransaction> {
        let receiver = self.in_msg.destination.filter(|d| !d.is_empty())?;
        let value_nano = self.in_msg.value.as_deref().and_then(parse_nano)?;
        let comment = self
            .in_msg
            .message
            .filter(|m| !m.is_empty())
            .or_else(|| self.in_msg.msg_data.and_then(|d| d.text));
        Some(ChainTransaction {
            hash: self.transaction_id.hash.unwrap_or_default(),
            lt: self.transaction_id.lt,
            sender: self.in_msg.source.filter(|s| !s.is_empty()),
            receiver,
            value_nano,
            comment,
            confirmations: self.confirmations.unwrap_or(DEFAULT_CONFIRMATIONS),
        })
    }
}

/// Read a string field that may be a plain string or an `{ "address": .. }`
/// account object.
fn address_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj.get("address").and_then(address_field),
        _ => None,
    }
}

fn integer_field(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_nano(s),
        _ => None,
    }
}

/// Decode a single-transaction lookup. Field names vary between indexers.
fn decode_single(hash: &str, body: &Value) -> Result<ChainTransaction, OracleError> {
    let in_msg = body
        .get("in_msg")
        .or_else(|| body.get("inMessage"))
        .cloned()
        .unwrap_or(Value::Null);
    let pick = |keys: &[&str], from: &Value| -> Option<Value> {
        keys.iter().find_map(|k| from.get(*k).filter(|v| !v.is_null()).cloned())
    };

    let value_nano = pick(&["value", "amount"], &in_msg)
        .or_else(|| pick(&["value", "amount"], body))
        .as_ref()
        .and_then(integer_field)
        .ok_or_else(|| OracleError::Decode(format!("transaction {hash} has no amount")))?;

    let sender = pick(&["source", "src"], &in_msg)
        .or_else(|| pick(&["account"], body))
        .as_ref()
        .and_then(address_field);
    let receiver = pick(&["destination", "dst"], &in_msg)
        .or_else(|| pick(&["address"], body))
        .as_ref()
        .and_then(address_field)
        .unwrap_or_default();

    let confirmations = pick(&["confirmations", "confirmation_count"], body)
        .as_ref()
        .and_then(integer_field)
        .map(|c| u32::try_from(c).unwrap_or(u32::MAX))
        .unwrap_or(0);

    let comment = in_msg
        .get("decoded_body")
        .and_then(|b| b.get("text"))
        .or_else(|| in_msg.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ChainTransaction {
        hash: hash.to_string(),
        lt: pick(&["lt"], body).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        }),
        sender,
        receiver,
        value_nano,
        comment,
        confirmations,
    })
}

fn normalize_endpoint(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}

/// reqwest-backed [`ChainOracle`].
pub struct TonHttpOracle {
    client: Client,
    config: TonConfig,
}

impl TonHttpOracle {
    pub fn new(config: TonConfig) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChainOracle for TonHttpOracle {
    async fn get_transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, OracleError> {
        let url = format!(
            "{}/v2/blockchain/transactions/{}",
            normalize_endpoint(&self.config.api_base),
            hash
        );
        let mut request = self.client.get(&url);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(hash, "Transaction not indexed yet");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: Value = response.json().await?;
        decode_single(hash, &body).map(Some)
    }

    async fn list_transactions(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<ChainTransaction>, OracleError> {
        let url = format!(
            "{}/v2/getTransactions",
            normalize_endpoint(&self.config.indexer_endpoint)
        );
        let limit = limit.to_string();
        let mut request = self
            .client
            .get(&url)
            .query(&[("address", address), ("limit", limit.as_str())]);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: TransactionsResponse = response.json().await?;
        if body.ok == Some(false) {
            return Err(OracleError::Unavailable(
                body.error.unwrap_or_else(|| "indexer returned ok=false".to_string()),
            ));
        }

        let transactions: Vec<ChainTransaction> = body
            .result
            .unwrap_or_default()
            .into_iter()
            .filter_map(V2Transaction::into_chain_transaction)
            .collect();
        debug!(address, count = transactions.len(), "Listed transactions");
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_v2_transaction_decodes_comment_and_value() {
        let raw: V2Transaction = serde_json::from_value(json!({
            "transaction_id": {"lt": "42", "hash": "abc="},
            "in_msg": {
                "source": "UQsender",
                "destination": "UQreceiver",
                "value": "1500000000",
                "message": "",
                "msg_data": {"text": "KOTH_ACTIVATE:u:i"}
            }
        }))
        .unwrap();

        let tx = raw.into_chain_transaction().unwrap();
        assert_eq!(tx.hash, "abc=");
        assert_eq!(tx.lt.as_deref(), Some("42"));
        assert_eq!(tx.value_nano, 1_500_000_000);
        assert_eq!(tx.comment.as_deref(), Some("KOTH_ACTIVATE:u:i"));
        assert_eq!(tx.confirmations, DEFAULT_CONFIRMATIONS);
    }

    #[test]
    fn test_v2_transaction_without_incoming_value_is_skipped() {
        let raw: V2Transaction = serde_json::from_value(json!({
            "transaction_id": {"lt": "1", "hash": "x"},
            "in_msg": {"destination": "UQreceiver"}
        }))
        .unwrap();
        assert!(raw.into_chain_transaction().is_none());
    }

    #[test]
    fn test_decode_single_handles_account_objects() {
        let body = json!({
            "lt": 77,
            "confirmations": 2,
            "in_msg": {
                "value": 1000000000u64,
                "source": {"address": "UQsender"},
                "destination": {"address": "UQreceiver"},
                "decoded_body": {"text": "hello"}
            }
        });
        let tx = decode_single("h", &body).unwrap();
        assert_eq!(tx.sender.as_deref(), Some("UQsender"));
        assert_eq!(tx.receiver, "UQreceiver");
        assert_eq!(tx.value_nano, 1_000_000_000);
        assert_eq!(tx.confirmations, 2);
        assert_eq!(tx.lt.as_deref(), Some("77"));
        assert_eq!(tx.comment.as_deref(), Some("hello"));
    }

    #[test]
    fn test_decode_single_requires_amount() {
        assert!(matches!(
            decode_single("h", &json!({"in_msg": {}})),
            Err(OracleError::Decode(_))
        ));
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("https://x/api/"), "https://x/api");
    }
}
