//! On-chain access layer.
//!
//! [`ChainClient`] is the seam between the settlement engine and the
//! EVM-compatible chains it reads from and writes to. The payout and
//! claim-token contracts are opaque oracles: the engine only needs receipt
//! status, transfer logs, claim-status reads, root publication, and claim
//! execution. [`rpc::JsonRpcChainClient`] talks to real nodes;
//! [`mock::MockChain`] is a scripted in-memory chain for tests and local
//! runs.

pub mod mock;
pub mod rpc;

use async_trait::async_trait;

use crate::domain::ids::{TxHash, WalletAddress};
use crate::domain::merkle::Digest;
use crate::domain::stake::TransferEvent;
use crate::error::EngineError;

/// Confirmation status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet mined (or unknown to the node).
    Pending,
    /// Mined with a success status.
    Confirmed,
    /// Mined with a failure status.
    Reverted,
}

/// Read/write access to an EVM-compatible chain.
///
/// Log delivery is at-least-once and possibly reordered; callers must rely
/// on idempotency keys, never on ordering. Transient transport failures
/// surface as [`EngineError::ChainError`] and are retried with bounded
/// backoff by the caller; reverted calls surface as
/// [`EngineError::ChainReverted`] and are terminal.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number on the given chain.
    async fn latest_block(&self, chain_id: u64) -> Result<u64, EngineError>;

    /// Confirmation status of a transaction.
    async fn tx_status(&self, chain_id: u64, tx_hash: &TxHash) -> Result<TxStatus, EngineError>;

    /// Claim-token transfer logs for a block range.
    async fn transfer_logs(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, EngineError>;

    /// Publishes a merkle payout root to a payout contract. Returns the
    /// publication transaction hash.
    async fn publish_payout_root(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        root: &Digest,
        total_amount: u64,
        expires_at_unix: u64,
    ) -> Result<TxHash, EngineError>;

    /// Whether the contract's claimed bitmap marks the leaf index as paid.
    async fn is_leaf_claimed(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        leaf_index: u64,
    ) -> Result<bool, EngineError>;

    /// Executes an on-chain claim for a leaf. Returns the claim transaction
    /// hash.
    async fn execute_claim(
        &self,
        chain_id: u64,
        contract: &WalletAddress,
        leaf_index: u64,
        recipient: &WalletAddress,
        amount: u64,
        proof: &[Digest],
    ) -> Result<TxHash, EngineError>;
}
