//! Scripted in-memory chain for tests and local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ChainClient, TxStatus};
use crate::domain::ids::{TxHash, WalletAddress};
use crate::domain::merkle::Digest;
use crate::domain::stake::TransferEvent;
use crate::error::EngineError;

#[derive(Debug, Default)]
struct MockState {
    latest_block: u64,
    tx_statuses: HashMap<String, TxStatus>,
    logs: Vec<TransferEvent>,
    claimed: HashSet<(String, u64)>,
    published_roots: Vec<(String, String)>,
    transient_failures: u32,
    next_nonce: u64,
}

/// [`ChainClient`] backed by scripted in-memory state.
///
/// Tests seed receipt statuses and transfer logs, optionally inject a run
/// of transient failures, and inspect published roots and executed claims
/// afterwards.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    /// Creates an empty mock chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latest block number.
    pub async fn set_latest_block(&self, block: u64) {
        self.state.lock().await.latest_block = block;
    }

    /// Scripts the receipt status for a transaction hash.
    pub async fn set_tx_status(&self, tx_hash: &TxHash, status: TxStatus) {
        self.state
            .lock()
            .await
            .tx_statuses
            .insert(tx_hash.as_str().to_string(), status);
    }

    /// Appends a transfer log.
    pub async fn push_log(&self, event: TransferEvent) {
        self.state.lock().await.logs.push(event);
    }

    /// Marks a leaf index as claimed on the contract's bitmap.
    pub async fn set_claimed(&self, contract: &WalletAddress, leaf_index: u64) {
        self.state
            .lock()
            .await
            .claimed
            .insert((contract.as_str().to_string(), leaf_index));
    }

    /// Makes the next `count` calls fail with a transient error.
    pub async fn fail_times(&self, count: u32) {
        self.state.lock().await.transient_failures = count;
    }

    /// Roots published so far, as `(contract, root_hex)` pairs.
    pub async fn published_roots(&self) -> Vec<(String, String)> {
        self.state.lock().await.published_roots.clone()
    }

    async fn check_transient(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(EngineError::ChainError("scripted transient failure".to_string()));
        }
        Ok(())
    }

    async fn next_hash(&self) -> Result<TxHash, EngineError> {
        let mut state = self.state.lock().await;
        state.next_nonce += 1;
        TxHash::parse(&format!("0x{:064x}", state.next_nonce))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_block(&self, _chain_id: u64) -> Result<u64, EngineError> {
        self.check_transient().await?;
        Ok(self.state.lock().await.latest_block)
    }

    async fn tx_status(&self, _chain_id: u64, tx_hash: &TxHash) -> Result<TxStatus, EngineError> {
        self.check_transient().await?;
        Ok(self
            .state
            .lock()
            .await
            .tx_statuses
            .get(tx_hash.as_str())
            .copied()
            .unwrap_or(TxStatus::Pending))
    }

    async fn transfer_logs(
        &self,
        _chain_id: u64,
        _contract: &WalletAddress,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, EngineError> {
        self.check_transient().await?;
        Ok(self
            .state
            .lock()
            .await
            .logs
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn publish_payout_root(
        &self,
        _chain_id: u64,
        contract: &WalletAddress,
        root: &Digest,
        _total_amount: u64,
        _expires_at_unix: u64,
    ) -> Result<TxHash, EngineError> {
        self.check_transient().await?;
        let root_hex = crate::domain::merkle::digest_hex(root);
        self.state
            .lock()
            .await
            .published_roots
            .push((contract.as_str().to_string(), root_hex));
        self.next_hash().await
    }

    async fn is_leaf_claimed(
        &self,
        _chain_id: u64,
        contract: &WalletAddress,
        leaf_index: u64,
    ) -> Result<bool, EngineError> {
        self.check_transient().await?;
        Ok(self
            .state
            .lock()
            .await
            .claimed
            .contains(&(contract.as_str().to_string(), leaf_index)))
    }

    async fn execute_claim(
        &self,
        _chain_id: u64,
        contract: &WalletAddress,
        leaf_index: u64,
        _recipient: &WalletAddress,
        _amount: u64,
        _proof: &[Digest],
    ) -> Result<TxHash, EngineError> {
        self.check_transient().await?;
        let key = (contract.as_str().to_string(), leaf_index);
        let mut state = self.state.lock().await;
        if state.claimed.contains(&key) {
            return Err(EngineError::ChainReverted("already claimed".to_string()));
        }
        state.claimed.insert(key);
        state.next_nonce += 1;
        TxHash::parse(&format!("0x{:064x}", state.next_nonce))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_statuses_and_failures() {
        let chain = MockChain::new();
        let hash = TxHash::parse(&format!("0x{}", "77".repeat(32))).ok();
        let Some(hash) = hash else {
            panic!("valid hash");
        };
        assert_eq!(chain.tx_status(1, &hash).await.ok(), Some(TxStatus::Pending));

        chain.set_tx_status(&hash, TxStatus::Confirmed).await;
        assert_eq!(chain.tx_status(1, &hash).await.ok(), Some(TxStatus::Confirmed));

        chain.fail_times(1).await;
        assert!(chain.tx_status(1, &hash).await.is_err());
        assert!(chain.tx_status(1, &hash).await.is_ok());
    }

    #[tokio::test]
    async fn double_claim_reverts() {
        let chain = MockChain::new();
        let contract = WalletAddress::zero();
        let recipient = WalletAddress::zero();
        assert!(
            chain
                .execute_claim(1, &contract, 0, &recipient, 10, &[])
                .await
                .is_ok()
        );
        let second = chain.execute_claim(1, &contract, 0, &recipient, 10, &[]).await;
        assert!(matches!(second, Err(EngineError::ChainReverted(_))));
    }
}
