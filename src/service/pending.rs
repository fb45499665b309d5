//! Pending bridge/mint transaction orchestration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::{ChainClient, TxStatus};
use crate::domain::{
    ClaimId, LedgerStore, PendingTransaction, PendingTxState, Season, TransferEvent, TxHash,
    WalletAddress,
};
use crate::error::EngineError;
use crate::notify::Notifier;
use crate::service::reconcile::PurchaseReconciler;

/// Orchestrator knobs.
#[derive(Debug, Clone)]
pub struct PendingTxConfig {
    /// Chain the claim token lives on.
    pub dest_chain_id: u64,
    /// Claim-token contract scanned for destination mints.
    pub claim_contract: WalletAddress,
    /// Wall-clock seconds before a non-terminal transaction fails.
    pub timeout_secs: u64,
    /// Blocks scanned back from the destination tip per cycle.
    pub scan_blocks: u64,
    /// Attempts per chain call before giving up for the cycle.
    pub retry_attempts: u32,
    /// Base backoff delay, doubled per retry.
    pub retry_base_ms: u64,
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollSummary {
    /// Open transactions examined.
    pub polled: usize,
    /// Transactions that moved at least one state forward.
    pub advanced: usize,
    /// Transactions that reached `reconciled` this cycle.
    pub reconciled: usize,
    /// Transactions that reached `failed` this cycle.
    pub failed: usize,
    /// Transactions left in place because a chain call kept failing.
    pub errors: usize,
}

/// Drives pending purchases through their state machine.
///
/// Each poll cycle examines every non-terminal transaction: timeouts fail
/// first, then the source receipt is checked, then the destination chain is
/// scanned for the matching mint, which is fed through the reconciler.
/// A terminal failure notifies the backer exactly once; the atomic
/// check-and-set on the state transition is what makes overlapping cycles
/// safe.
pub struct PendingTxOrchestrator {
    ledger: Arc<LedgerStore>,
    chain: Arc<dyn ChainClient>,
    reconciler: PurchaseReconciler,
    notifier: Arc<dyn Notifier>,
    config: PendingTxConfig,
}

impl std::fmt::Debug for PendingTxOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTxOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PendingTxOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        ledger: Arc<LedgerStore>,
        chain: Arc<dyn ChainClient>,
        notifier: Arc<dyn Notifier>,
        config: PendingTxConfig,
    ) -> Self {
        let reconciler = PurchaseReconciler::new(Arc::clone(&ledger));
        Self {
            ledger,
            chain,
            reconciler,
            notifier,
            config,
        }
    }

    /// Records a newly submitted purchase and returns its tracking id.
    pub async fn submit(
        &self,
        backer_wallet: WalletAddress,
        backer_email: String,
        claim_id: ClaimId,
        quantity: u64,
        season: Season,
        source_chain_id: u64,
        source_tx_hash: TxHash,
    ) -> Uuid {
        let now = Utc::now();
        let tx = PendingTransaction {
            id: Uuid::new_v4(),
            backer_wallet,
            backer_email,
            claim_id,
            quantity,
            season,
            source_chain_id,
            dest_chain_id: self.config.dest_chain_id,
            source_tx_hash,
            dest_tx_hash: None,
            state: PendingTxState::Submitted,
            created_at: now,
            updated_at: now,
        };
        let id = self.ledger.insert_pending(tx).await;
        info!(pending_tx = %id, %claim_id, quantity, "purchase submitted");
        id
    }

    /// Runs one poll cycle over every open transaction.
    pub async fn run_poll_cycle(&self) -> PollSummary {
        let open = self.ledger.pending_open().await;
        let mut summary = PollSummary {
            polled: open.len(),
            ..PollSummary::default()
        };
        let now = Utc::now();
        for tx in open {
            if tx.timed_out(now, self.config.timeout_secs) {
                if self.fail(&tx, "timed out waiting for confirmation").await {
                    summary.failed += 1;
                    continue;
                }
                // A destination-confirmed mint past the deadline is a real
                // on-chain fact; it still gets reconciled below.
            }
            match self.advance(&tx).await {
                Ok(Advanced::None) => {}
                Ok(Advanced::Forward) => summary.advanced += 1,
                Ok(Advanced::Reconciled) => {
                    summary.advanced += 1;
                    summary.reconciled += 1;
                }
                Ok(Advanced::Failed) => summary.failed += 1,
                Err(e) => {
                    warn!(pending_tx = %tx.id, error = %e, "poll left transaction in place");
                    summary.errors += 1;
                }
            }
        }
        summary
    }

    async fn advance(&self, tx: &PendingTransaction) -> Result<Advanced, EngineError> {
        match tx.state {
            PendingTxState::Submitted => self.poll_source(tx).await,
            PendingTxState::Bridging | PendingTxState::DestinationConfirmed => {
                self.poll_destination(tx).await
            }
            PendingTxState::Reconciled | PendingTxState::Failed => Ok(Advanced::None),
        }
    }

    async fn poll_source(&self, tx: &PendingTransaction) -> Result<Advanced, EngineError> {
        let status = with_retry(
            self.config.retry_attempts,
            self.config.retry_base_ms,
            || self.chain.tx_status(tx.source_chain_id, &tx.source_tx_hash),
        )
        .await?;
        match status {
            TxStatus::Pending => Ok(Advanced::None),
            TxStatus::Confirmed => {
                self.ledger
                    .transition_pending(tx.id, PendingTxState::Bridging)
                    .await?;
                debug!(pending_tx = %tx.id, "source confirmed; bridging");
                Ok(Advanced::Forward)
            }
            TxStatus::Reverted => {
                if self.fail(tx, "source transaction reverted").await {
                    Ok(Advanced::Failed)
                } else {
                    Ok(Advanced::None)
                }
            }
        }
    }

    async fn poll_destination(&self, tx: &PendingTransaction) -> Result<Advanced, EngineError> {
        let latest = with_retry(self.config.retry_attempts, self.config.retry_base_ms, || {
            self.chain.latest_block(tx.dest_chain_id)
        })
        .await?;
        let from_block = latest.saturating_sub(self.config.scan_blocks);
        let logs = with_retry(self.config.retry_attempts, self.config.retry_base_ms, || {
            self.chain.transfer_logs(
                tx.dest_chain_id,
                &self.config.claim_contract,
                from_block,
                latest,
            )
        })
        .await?;
        let Some(event) = logs.iter().find(|e| Self::matches(tx, e)) else {
            return Ok(Advanced::None);
        };

        if tx.state == PendingTxState::Bridging {
            self.ledger
                .set_pending_dest_hash(tx.id, event.tx_hash.clone())
                .await?;
            self.ledger
                .transition_pending(tx.id, PendingTxState::DestinationConfirmed)
                .await?;
        }
        // Stake credit and terminal state commit in this order so a crash
        // between them leaves a replayable duplicate, never a lost credit.
        let applied = self
            .reconciler
            .reconcile(std::slice::from_ref(event), tx.season)
            .await;
        if applied.minted == 0 && applied.duplicates == 0 {
            // The mint is visible but could not be credited (the claim id
            // resolves to no builder, say). Leave the transaction open so a
            // later cycle can retry once the precondition is met.
            warn!(pending_tx = %tx.id, dest_tx = %event.tx_hash, "destination mint not credited; left open");
            return Ok(if tx.state == PendingTxState::Bridging {
                Advanced::Forward
            } else {
                Advanced::None
            });
        }
        self.ledger
            .transition_pending(tx.id, PendingTxState::Reconciled)
            .await?;
        info!(pending_tx = %tx.id, dest_tx = %event.tx_hash, "purchase reconciled");
        Ok(Advanced::Reconciled)
    }

    fn matches(tx: &PendingTransaction, event: &TransferEvent) -> bool {
        event.is_mint()
            && event.to == tx.backer_wallet
            && event.claim_id == tx.claim_id
            && event.quantity == tx.quantity
    }

    /// Moves a transaction to `failed` and notifies the backer. Returns
    /// `true` only for the caller that actually applied the transition, so
    /// the notification goes out exactly once.
    async fn fail(&self, tx: &PendingTransaction, reason: &str) -> bool {
        match self
            .ledger
            .transition_pending(tx.id, PendingTxState::Failed)
            .await
        {
            Ok(failed) => {
                warn!(pending_tx = %tx.id, reason, "pending transaction failed");
                if let Err(e) = self.notifier.pending_tx_failed(&failed, reason).await {
                    warn!(pending_tx = %tx.id, error = %e, "failure notification not delivered");
                }
                true
            }
            Err(_) => false,
        }
    }
}

enum Advanced {
    None,
    Forward,
    Reconciled,
    Failed,
}

/// Retries a transient-failing chain call with bounded exponential backoff.
/// Non-transient errors propagate immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    attempts: u32,
    base_delay_ms: u64,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut delay = base_delay_ms;
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts.max(1) => {
                debug!(attempt, error = %e, "transient chain failure; backing off");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::domain::{BuilderAccount, BuilderId};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingNotifier {
        sent: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Notifier for CountingNotifier {
        async fn pending_tx_failed(
            &self,
            _tx: &PendingTransaction,
            _reason: &str,
        ) -> Result<(), EngineError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wallet(c: char) -> WalletAddress {
        let addr = WalletAddress::parse(&format!("0x{}", c.to_string().repeat(40))).ok();
        let Some(addr) = addr else {
            panic!("valid wallet");
        };
        addr
    }

    fn tx_hash(nonce: u8) -> TxHash {
        let hash = TxHash::parse(&format!("0x{:064x}", u128::from(nonce) + 1)).ok();
        let Some(hash) = hash else {
            panic!("valid hash");
        };
        hash
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

    fn config() -> PendingTxConfig {
        PendingTxConfig {
            dest_chain_id: 8453,
            claim_contract: wallet('e'),
            timeout_secs: 3600,
            scan_blocks: 1000,
            retry_attempts: 3,
            retry_base_ms: 1,
        }
    }

    struct Harness {
        ledger: Arc<LedgerStore>,
        chain: Arc<MockChain>,
        notifier: Arc<CountingNotifier>,
        orchestrator: PendingTxOrchestrator,
    }

    async fn harness(cfg: PendingTxConfig) -> Harness {
        let ledger = Arc::new(LedgerStore::new());
        seed_builder(&ledger, 7).await;
        let chain = Arc::new(MockChain::new());
        chain.set_latest_block(100).await;
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicU32::new(0),
        });
        let orchestrator = PendingTxOrchestrator::new(
            Arc::clone(&ledger),
            Arc::clone(&chain) as Arc<dyn ChainClient>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            cfg,
        );
        Harness {
            ledger,
            chain,
            notifier,
            orchestrator,
        }
    }

    fn dest_mint(backer: WalletAddress, quantity: u64) -> TransferEvent {
        TransferEvent {
            tx_hash: tx_hash(9),
            log_index: 0,
            from: WalletAddress::zero(),
            to: backer,
            claim_id: ClaimId(7),
            quantity,
            block_number: 95,
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_reconciled_with_stake_credited_once() {
        let h = harness(config()).await;
        let backer = wallet('a');
        let source = tx_hash(1);
        let id = h
            .orchestrator
            .submit(
                backer.clone(),
                "backer@example.com".to_string(),
                ClaimId(7),
                2,
                Season(1),
                1,
                source.clone(),
            )
            .await;

        h.chain.set_tx_status(&source, TxStatus::Confirmed).await;
        h.chain.push_log(dest_mint(backer.clone(), 2)).await;

        // Cycle 1: submitted -> bridging. Cycle 2: bridging -> reconciled.
        let first = h.orchestrator.run_poll_cycle().await;
        assert_eq!(first.advanced, 1);
        let second = h.orchestrator.run_poll_cycle().await;
        assert_eq!(second.reconciled, 1);

        let tx = h.ledger.pending_tx(id).await;
        let Ok(tx) = tx else {
            panic!("pending tx missing");
        };
        assert_eq!(tx.state, PendingTxState::Reconciled);
        assert!(tx.dest_tx_hash.is_some());
        assert_eq!(h.ledger.stake_quantity(&backer, ClaimId(7)).await, 2);

        // Further cycles touch nothing.
        let third = h.orchestrator.run_poll_cycle().await;
        assert_eq!(third.polled, 0);
        assert_eq!(h.ledger.stake_quantity(&backer, ClaimId(7)).await, 2);
        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn source_revert_fails_with_one_notification() {
        let h = harness(config()).await;
        let source = tx_hash(1);
        let id = h
            .orchestrator
            .submit(
                wallet('a'),
                "backer@example.com".to_string(),
                ClaimId(7),
                1,
                Season(1),
                1,
                source.clone(),
            )
            .await;
        h.chain.set_tx_status(&source, TxStatus::Reverted).await;

        let summary = h.orchestrator.run_poll_cycle().await;
        assert_eq!(summary.failed, 1);
        let tx = h.ledger.pending_tx(id).await;
        let Ok(tx) = tx else {
            panic!("pending tx missing");
        };
        assert_eq!(tx.state, PendingTxState::Failed);
        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 1);
        assert_eq!(h.ledger.stake_quantity(&wallet('a'), ClaimId(7)).await, 0);

        // Already terminal: no second failure, no second notification.
        let again = h.orchestrator.run_poll_cycle().await;
        assert_eq!(again.polled, 0);
        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_fails_exactly_once() {
        let mut cfg = config();
        cfg.timeout_secs = 0;
        let h = harness(cfg).await;
        let _ = h
            .orchestrator
            .submit(
                wallet('a'),
                "backer@example.com".to_string(),
                ClaimId(7),
                1,
                Season(1),
                1,
                tx_hash(1),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let summary = h.orchestrator.run_poll_cycle().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 1);

        let again = h.orchestrator.run_poll_cycle().await;
        assert_eq!(again.failed, 0);
        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn destination_confirmed_past_timeout_still_reconciles() {
        let mut cfg = config();
        cfg.timeout_secs = 0;
        let h = harness(cfg).await;
        let backer = wallet('a');
        let now = Utc::now();
        let id = h
            .ledger
            .insert_pending(PendingTransaction {
                id: Uuid::new_v4(),
                backer_wallet: backer.clone(),
                backer_email: "backer@example.com".to_string(),
                claim_id: ClaimId(7),
                quantity: 2,
                season: Season(1),
                source_chain_id: 1,
                dest_chain_id: 8453,
                source_tx_hash: tx_hash(1),
                dest_tx_hash: Some(tx_hash(9)),
                state: PendingTxState::DestinationConfirmed,
                created_at: now - chrono::Duration::seconds(600),
                updated_at: now,
            })
            .await;
        h.chain.push_log(dest_mint(backer.clone(), 2)).await;

        // Past the deadline, but the mint already landed on-chain: the
        // cycle must finish the reconciliation instead of failing it.
        let summary = h.orchestrator.run_poll_cycle().await;
        assert_eq!(summary.reconciled, 1);
        assert_eq!(summary.failed, 0);
        let tx = h.ledger.pending_tx(id).await;
        let Ok(tx) = tx else {
            panic!("pending tx missing");
        };
        assert_eq!(tx.state, PendingTxState::Reconciled);
        assert_eq!(h.ledger.stake_quantity(&backer, ClaimId(7)).await, 2);
        assert_eq!(h.notifier.sent.load(Ordering::SeqCst), 0);

        let again = h.orchestrator.run_poll_cycle().await;
        assert_eq!(again.polled, 0);
    }

    #[tokio::test]
    async fn uncreditable_mint_leaves_transaction_open() {
        let h = harness(config()).await;
        let backer = wallet('a');
        let source = tx_hash(1);
        // Claim 99 is not registered yet.
        let id = h
            .orchestrator
            .submit(
                backer.clone(),
                "backer@example.com".to_string(),
                ClaimId(99),
                2,
                Season(1),
                1,
                source.clone(),
            )
            .await;
        h.chain.set_tx_status(&source, TxStatus::Confirmed).await;
        let mut log = dest_mint(backer.clone(), 2);
        log.claim_id = ClaimId(99);
        h.chain.push_log(log).await;

        let first = h.orchestrator.run_poll_cycle().await;
        assert_eq!(first.advanced, 1);
        let second = h.orchestrator.run_poll_cycle().await;
        assert_eq!(second.reconciled, 0);
        let tx = h.ledger.pending_tx(id).await;
        let Ok(tx) = tx else {
            panic!("pending tx missing");
        };
        assert_eq!(tx.state, PendingTxState::DestinationConfirmed);
        assert_eq!(h.ledger.stake_quantity(&backer, ClaimId(99)).await, 0);

        // Once the claim registers, the next cycle credits and completes.
        seed_builder(&h.ledger, 99).await;
        let third = h.orchestrator.run_poll_cycle().await;
        assert_eq!(third.reconciled, 1);
        assert_eq!(h.ledger.stake_quantity(&backer, ClaimId(99)).await, 2);
    }

    #[tokio::test]
    async fn transient_chain_failures_are_retried() {
        let h = harness(config()).await;
        let source = tx_hash(1);
        let _ = h
            .orchestrator
            .submit(
                wallet('a'),
                "backer@example.com".to_string(),
                ClaimId(7),
                1,
                Season(1),
                1,
                source.clone(),
            )
            .await;
        h.chain.set_tx_status(&source, TxStatus::Confirmed).await;
        h.chain.fail_times(2).await;

        let summary = h.orchestrator.run_poll_cycle().await;
        assert_eq!(summary.advanced, 1);
        assert_eq!(summary.errors, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_transaction_in_place() {
        let mut cfg = config();
        cfg.retry_attempts = 1;
        let h = harness(cfg).await;
        let source = tx_hash(1);
        let id = h
            .orchestrator
            .submit(
                wallet('a'),
                "backer@example.com".to_string(),
                ClaimId(7),
                1,
                Season(1),
                1,
                source.clone(),
            )
            .await;
        h.chain.set_tx_status(&source, TxStatus::Confirmed).await;
        h.chain.fail_times(1).await;

        let summary = h.orchestrator.run_poll_cycle().await;
        assert_eq!(summary.errors, 1);
        let tx = h.ledger.pending_tx(id).await;
        let Ok(tx) = tx else {
            panic!("pending tx missing");
        };
        assert_eq!(tx.state, PendingTxState::Submitted);
    }
}
