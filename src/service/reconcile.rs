//! Claim-token purchase reconciliation.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::ChainClient;
use crate::domain::{LedgerStore, Season, TransferEvent, TransferOutcome, WalletAddress};
use crate::error::EngineError;

/// Counters for one reconciliation batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    /// Events examined.
    pub processed: usize,
    /// Mints applied (new stake credited).
    pub minted: usize,
    /// Wallet-to-wallet moves applied.
    pub transferred: usize,
    /// Burns applied.
    pub burned: usize,
    /// Events whose composite key was already reconciled.
    pub duplicates: usize,
    /// Events skipped with a warning (unknown claim id, bad quantity).
    pub skipped: usize,
}

/// Matches on-chain claim-token transfers to off-chain stake records.
///
/// Reconciliation is idempotent over the composite transfer key: re-running
/// the same block range produces only duplicates, never a second credit.
/// Malformed or unmatchable events are skipped with a warning so one bad
/// log cannot wedge the batch.
#[derive(Debug, Clone)]
pub struct PurchaseReconciler {
    ledger: Arc<LedgerStore>,
}

impl PurchaseReconciler {
    /// Creates a reconciler over the given ledger.
    #[must_use]
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Applies a batch of transfer events to the stake table.
    pub async fn reconcile(&self, events: &[TransferEvent], season: Season) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for event in events {
            summary.processed += 1;
            match self.ledger.apply_transfer(event, season).await {
                Ok(TransferOutcome::Minted) => summary.minted += 1,
                Ok(TransferOutcome::Transferred) => summary.transferred += 1,
                Ok(TransferOutcome::Burned) => summary.burned += 1,
                Ok(TransferOutcome::Duplicate) => {
                    debug!(tx_hash = %event.tx_hash, log_index = event.log_index, "duplicate transfer");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!(
                        tx_hash = %event.tx_hash,
                        log_index = event.log_index,
                        claim_id = %event.claim_id,
                        error = %e,
                        "transfer skipped"
                    );
                    summary.skipped += 1;
                }
            }
        }
        info!(
            processed = summary.processed,
            minted = summary.minted,
            transferred = summary.transferred,
            burned = summary.burned,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            "reconciliation batch applied"
        );
        summary
    }

    /// Scans a block range of the claim-token contract and reconciles every
    /// transfer log found.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ChainError`] if the log scan itself fails;
    /// individual bad events are skipped, not propagated.
    pub async fn scan_range(
        &self,
        chain: &dyn ChainClient,
        chain_id: u64,
        contract: &WalletAddress,
        from_block: u64,
        to_block: u64,
        season: Season,
    ) -> Result<ReconcileSummary, EngineError> {
        let events = chain
            .transfer_logs(chain_id, contract, from_block, to_block)
            .await?;
        Ok(self.reconcile(&events, season).await)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::domain::{BuilderAccount, BuilderId, ClaimId, TxHash};
    use chrono::Utc;

    fn wallet(c: char) -> WalletAddress {
        let addr = WalletAddress::parse(&format!("0x{}", c.to_string().repeat(40))).ok();
        let Some(addr) = addr else {
            panic!("valid wallet");
        };
        addr
    }

    fn transfer(
        claim: u64,
        from: WalletAddress,
        to: WalletAddress,
        quantity: u64,
        nonce: u8,
    ) -> TransferEvent {
        let hash = TxHash::parse(&format!("0x{:064x}", u128::from(nonce) + 1)).ok();
        let Some(tx_hash) = hash else {
            panic!("valid hash");
        };
        TransferEvent {
            tx_hash,
            log_index: 0,
            from,
            to,
            claim_id: ClaimId(claim),
            quantity,
            block_number: 10,
        }
    }

    async fn seed_builder(ledger: &LedgerStore, claim: u64) {
        let account = BuilderAccount {
            id: BuilderId::new(),
            wallet: wallet('b'),
            claim_id: ClaimId(claim),
            season: Season(1),
            email: "builder@example.com".to_string(),
            registered_at: Utc::now(),
        };
        let Ok(()) = ledger.register_builder(account).await else {
            panic!("registration failed");
        };
    }

    #[tokio::test]
    async fn batch_replay_is_idempotent() {
        let ledger = Arc::new(LedgerStore::new());
        seed_builder(&ledger, 7).await;
        let reconciler = PurchaseReconciler::new(Arc::clone(&ledger));

        let batch = vec![
            transfer(7, WalletAddress::zero(), wallet('a'), 3, 1),
            transfer(7, WalletAddress::zero(), wallet('c'), 2, 2),
        ];
        let first = reconciler.reconcile(&batch, Season(1)).await;
        assert_eq!(first.minted, 2);
        assert_eq!(first.duplicates, 0);

        let second = reconciler.reconcile(&batch, Season(1)).await;
        assert_eq!(second.minted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(ledger.stake_quantity(&wallet('a'), ClaimId(7)).await, 3);
        assert_eq!(ledger.stake_quantity(&wallet('c'), ClaimId(7)).await, 2);
    }

    #[tokio::test]
    async fn unknown_claim_is_skipped_not_fatal() {
        let ledger = Arc::new(LedgerStore::new());
        seed_builder(&ledger, 7).await;
        let reconciler = PurchaseReconciler::new(Arc::clone(&ledger));

        let batch = vec![
            transfer(99, WalletAddress::zero(), wallet('a'), 1, 1),
            transfer(7, WalletAddress::zero(), wallet('a'), 1, 2),
        ];
        let summary = reconciler.reconcile(&batch, Season(1)).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.minted, 1);
        assert_eq!(ledger.stake_quantity(&wallet('a'), ClaimId(7)).await, 1);
    }

    #[tokio::test]
    async fn scan_range_applies_chain_logs() {
        let ledger = Arc::new(LedgerStore::new());
        seed_builder(&ledger, 7).await;
        let reconciler = PurchaseReconciler::new(Arc::clone(&ledger));
        let chain = MockChain::new();
        chain
            .push_log(transfer(7, WalletAddress::zero(), wallet('a'), 4, 1))
            .await;

        let contract = wallet('e');
        let summary = reconciler
            .scan_range(&chain, 8453, &contract, 1, 100, Season(1))
            .await;
        let Ok(summary) = summary else {
            panic!("scan failed");
        };
        assert_eq!(summary.minted, 1);
        assert_eq!(ledger.stake_quantity(&wallet('a'), ClaimId(7)).await, 4);
    }
}
