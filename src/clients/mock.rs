//! In-memory collaborators for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ChainOracle, MembershipOracle, Notifier, OracleError};
use crate::ton::{same_address, ChainTransaction};

/// Chain oracle backed by a list of transactions.
#[derive(Default)]
pub struct MockChainOracle {
    transactions: RwLock<Vec<ChainTransaction>>,
    fail: RwLock<bool>,
    calls: AtomicUsize,
}

impl MockChainOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace (by hash) a transaction.
    pub async fn put(&self, tx: ChainTransaction) {
        let mut txs = self.transactions.write().await;
        txs.retain(|t| t.hash != tx.hash);
        txs.insert(0, tx);
    }

    pub async fn set_confirmations(&self, hash: &str, confirmations: u32) {
        let mut txs = self.transactions.write().await;
        if let Some(tx) = txs.iter_mut().find(|t| t.hash == hash) {
            tx.confirmations = confirmations;
        }
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// Number of oracle calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn check(&self) -> Result<(), OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.read().await {
            return Err(OracleError::Unavailable("mock oracle down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainOracle for MockChainOracle {
    async fn get_transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, OracleError> {
        self.check().await?;
        Ok(self
            .transactions
            .read()
            .await
            .iter()
            .find(|t| t.hash == hash)
            .cloned())
    }

    async fn list_transactions(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<ChainTransaction>, OracleError> {
        self.check().await?;
        Ok(self
            .transactions
            .read()
            .await
            .iter()
            .filter(|t| same_address(&t.receiver, address))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Membership oracle backed by a set of (channel, user) pairs.
#[derive(Default)]
pub struct MockMembershipOracle {
    members: RwLock<HashSet<(String, i64)>>,
    fail: RwLock<bool>,
}

impl MockMembershipOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, channel_id: &str, external_user_id: i64) {
        self.members
            .write()
            .await
            .insert((channel_id.to_string(), external_user_id));
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }
}

#[async_trait]
impl MembershipOracle for MockMembershipOracle {
    async fn is_member(&self, channel_id: &str, external_user_id: i64) -> Result<bool, OracleError> {
        if *self.fail.read().await {
            return Err(OracleError::Unavailable("mock membership down".to_string()));
        }
        Ok(self
            .members
            .read()
            .await
            .contains(&(channel_id.to_string(), external_user_id)))
    }
}

/// Notifier that records messages per user.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<HashMap<i64, Vec<String>>>,
    fail: RwLock<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn messages_for(&self, external_user_id: i64) -> Vec<String> {
        self.sent
            .read()
            .await
            .get(&external_user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, external_user_id: i64, text: &str) -> Result<(), OracleError> {
        if *self.fail.read().await {
            return Err(OracleError::Unavailable("mock notifier down".to_string()));
        }
        self.sent
            .write()
            .await
            .entry(external_user_id)
            .or_default()
            .push(text.to_string());
        Ok(())
    }
}
