//! Authoritative in-memory ledger behind a single `RwLock`.
//!
//! [`LedgerStore`] holds the immutable event log (contributions, purchase
//! matches) and every derived aggregate (gem receipts, points receipts,
//! stakes, balances, payout trees). One write lock guards all of it: each
//! mutating method is the "single database transaction" of the settlement
//! model, so a stake decrement and the paired increment, or a receipt batch
//! and its balance credits, are applied atomically or not at all.
//!
//! Idempotency lives in the data, not in locks: contribution ids,
//! reconciliation keys, live-receipt checks and leaf `claimed_at` markers
//! make overlapping task invocations converge on the same state.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::contribution::{BuilderAccount, ContributionEvent};
use super::ids::{BuilderId, ClaimId, Season, WalletAddress, Week};
use super::payout::{PayoutCohort, PayoutTree};
use super::pending::{PendingTransaction, PendingTxState};
use super::receipts::{GemReceipt, PointsReceipt};
use super::stake::{BackerStake, NftPurchaseEvent, TransferEvent};
use crate::error::EngineError;

/// How the ledger applied one transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The composite key was already reconciled; nothing changed.
    Duplicate,
    /// Mint from the zero address; the receiver's stake was incremented.
    Minted,
    /// Wallet-to-wallet move; sender decremented, receiver incremented.
    Transferred,
    /// Burn to the zero address; the sender's stake was decremented.
    Burned,
}

#[derive(Debug, Default)]
struct LedgerInner {
    builders: HashMap<BuilderId, BuilderAccount>,
    claims: HashMap<ClaimId, BuilderId>,
    contributions: HashMap<Uuid, ContributionEvent>,
    gem_receipts: HashMap<(BuilderId, Week), GemReceipt>,
    points_receipts: Vec<PointsReceipt>,
    stakes: HashMap<(WalletAddress, ClaimId), BackerStake>,
    purchases: HashMap<super::stake::ReconciliationKey, NftPurchaseEvent>,
    pending: HashMap<Uuid, PendingTransaction>,
    balances: HashMap<WalletAddress, u64>,
    unclaimed: HashMap<(WalletAddress, PayoutCohort), u64>,
    trees: HashMap<Uuid, PayoutTree>,
}

/// Central transactional store for all settlement state.
#[derive(Debug, Default)]
pub struct LedgerStore {
    inner: RwLock<LedgerInner>,
}

impl LedgerStore {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Builders ────────────────────────────────────────────────────────

    /// Registers a builder account and its claim-token mapping.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRequest`] if the builder id or claim
    /// id is already registered to someone else.
    pub async fn register_builder(&self, account: BuilderAccount) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        if inner.builders.contains_key(&account.id) {
            return Err(EngineError::InvalidRequest(format!(
                "builder {} already registered",
                account.id
            )));
        }
        if let Some(existing) = inner.claims.get(&account.claim_id)
            && *existing != account.id
        {
            return Err(EngineError::InvalidRequest(format!(
                "claim id {} already registered to builder {existing}",
                account.claim_id
            )));
        }
        inner.claims.insert(account.claim_id, account.id);
        inner.builders.insert(account.id, account);
        Ok(())
    }

    /// Looks up a builder account.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownBuilder`] if not registered.
    pub async fn builder(&self, id: BuilderId) -> Result<BuilderAccount, EngineError> {
        self.inner
            .read()
            .await
            .builders
            .get(&id)
            .cloned()
            .ok_or(EngineError::UnknownBuilder(id))
    }

    /// Resolves a claim-token id to its builder, if registered.
    pub async fn builder_by_claim(&self, claim_id: ClaimId) -> Option<BuilderId> {
        self.inner.read().await.claims.get(&claim_id).copied()
    }

    // ── Contribution events ─────────────────────────────────────────────

    /// Appends a contribution event. Duplicate ids are a no-op.
    ///
    /// Returns `true` if the event was newly inserted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownBuilder`] if the builder is not
    /// registered.
    pub async fn append_contribution(
        &self,
        event: ContributionEvent,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.write().await;
        if !inner.builders.contains_key(&event.builder_id) {
            return Err(EngineError::UnknownBuilder(event.builder_id));
        }
        if inner.contributions.contains_key(&event.id) {
            return Ok(false);
        }
        inner.contributions.insert(event.id, event);
        Ok(true)
    }

    /// All contribution events for one builder-week.
    pub async fn contributions_for(
        &self,
        builder_id: BuilderId,
        week: Week,
    ) -> Vec<ContributionEvent> {
        self.inner
            .read()
            .await
            .contributions
            .values()
            .filter(|e| e.builder_id == builder_id && e.week == week)
            .cloned()
            .collect()
    }

    /// Builders that have at least one event in the given week.
    pub async fn builders_with_events(&self, week: Week) -> Vec<BuilderId> {
        let inner = self.inner.read().await;
        let mut ids: Vec<BuilderId> = inner
            .contributions
            .values()
            .filter(|e| e.week == week)
            .map(|e| e.builder_id)
            .collect();
        ids.sort_unstable_by_key(|id| *id.as_uuid());
        ids.dedup();
        ids
    }

    // ── Gem receipts ────────────────────────────────────────────────────

    /// Creates or replaces the gem receipt for a builder-week.
    ///
    /// The receipt id is stable across recomputes so points receipts keep a
    /// valid link to their originating aggregate.
    pub async fn upsert_gem_receipt(
        &self,
        builder_id: BuilderId,
        week: Week,
        season: Season,
        total_gems: u64,
        event_count: usize,
    ) -> GemReceipt {
        let mut inner = self.inner.write().await;
        let id = inner
            .gem_receipts
            .get(&(builder_id, week))
            .map_or_else(Uuid::new_v4, |existing| existing.id);
        let receipt = GemReceipt {
            id,
            builder_id,
            week,
            season,
            total_gems,
            event_count,
            recomputed_at: Utc::now(),
        };
        inner.gem_receipts.insert((builder_id, week), receipt.clone());
        receipt
    }

    /// The gem receipt for a builder-week, if it has been computed.
    pub async fn gem_receipt(&self, builder_id: BuilderId, week: Week) -> Option<GemReceipt> {
        self.inner
            .read()
            .await
            .gem_receipts
            .get(&(builder_id, week))
            .cloned()
    }

    // ── Points receipts & balances ──────────────────────────────────────

    /// Returns `true` if the builder-week has non-voided points receipts.
    pub async fn has_live_distribution(&self, builder_id: BuilderId, week: Week) -> bool {
        self.inner
            .read()
            .await
            .points_receipts
            .iter()
            .any(|r| r.builder_id == builder_id && r.week == week && r.is_live())
    }

    /// Atomically records a distribution: rejects if live receipts already
    /// exist for the builder-week, otherwise appends every receipt and
    /// credits each recipient's running balance and season unclaimed
    /// balance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyDistributed`] without any writes if a
    /// live distribution exists.
    pub async fn insert_distribution(
        &self,
        builder_id: BuilderId,
        week: Week,
        receipts: Vec<PointsReceipt>,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        if inner
            .points_receipts
            .iter()
            .any(|r| r.builder_id == builder_id && r.week == week && r.is_live())
        {
            return Err(EngineError::AlreadyDistributed {
                builder: builder_id,
                week,
            });
        }
        for receipt in receipts {
            let cohort = PayoutCohort::Season {
                season: receipt.season,
            };
            *inner.balances.entry(receipt.recipient.clone()).or_insert(0) += receipt.value;
            *inner
                .unclaimed
                .entry((receipt.recipient.clone(), cohort))
                .or_insert(0) += receipt.value;
            inner.points_receipts.push(receipt);
        }
        Ok(())
    }

    /// Voids every live receipt for a builder-week and reverses the balance
    /// credits. Returns the number of receipts voided.
    pub async fn void_distribution(&self, builder_id: BuilderId, week: Week) -> usize {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut reversals: Vec<(WalletAddress, Season, u64)> = Vec::new();
        for receipt in inner
            .points_receipts
            .iter_mut()
            .filter(|r| r.builder_id == builder_id && r.week == week && r.is_live())
        {
            receipt.voided_at = Some(now);
            reversals.push((receipt.recipient.clone(), receipt.season, receipt.value));
        }
        for (wallet, season, value) in &reversals {
            if let Some(balance) = inner.balances.get_mut(wallet) {
                *balance = balance.saturating_sub(*value);
            }
            let cohort = PayoutCohort::Season { season: *season };
            if let Some(unclaimed) = inner.unclaimed.get_mut(&(wallet.clone(), cohort)) {
                *unclaimed = unclaimed.saturating_sub(*value);
            }
        }
        reversals.len()
    }

    /// All receipts (live and voided) for a builder-week.
    pub async fn receipts_for(&self, builder_id: BuilderId, week: Week) -> Vec<PointsReceipt> {
        self.inner
            .read()
            .await
            .points_receipts
            .iter()
            .filter(|r| r.builder_id == builder_id && r.week == week)
            .cloned()
            .collect()
    }

    /// Running points balance of a wallet.
    pub async fn balance(&self, wallet: &WalletAddress) -> u64 {
        self.inner
            .read()
            .await
            .balances
            .get(wallet)
            .copied()
            .unwrap_or(0)
    }

    /// Unclaimed balance of a wallet within one cohort.
    pub async fn unclaimed(&self, wallet: &WalletAddress, cohort: &PayoutCohort) -> u64 {
        self.inner
            .read()
            .await
            .unclaimed
            .get(&(wallet.clone(), cohort.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Credits a partner-sponsored reward to a wallet's unclaimed balance.
    pub async fn credit_partner_reward(
        &self,
        partner_id: &str,
        season: Season,
        wallet: WalletAddress,
        amount: u64,
    ) {
        let cohort = PayoutCohort::Partner {
            partner_id: partner_id.to_string(),
            season,
        };
        let mut inner = self.inner.write().await;
        *inner.balances.entry(wallet.clone()).or_insert(0) += amount;
        *inner.unclaimed.entry((wallet, cohort)).or_insert(0) += amount;
    }

    /// Positive unclaimed balances for a cohort, sorted by wallet.
    pub async fn unclaimed_for_cohort(
        &self,
        cohort: &PayoutCohort,
    ) -> Vec<(WalletAddress, u64)> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(WalletAddress, u64)> = inner
            .unclaimed
            .iter()
            .filter(|((_, c), amount)| c == cohort && **amount > 0)
            .map(|((wallet, _), amount)| (wallet.clone(), *amount))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    // ── Stakes & reconciliation ─────────────────────────────────────────

    /// Applies one transfer event to the stake table, exactly once.
    ///
    /// Mint → increment receiver; wallet-to-wallet → decrement sender and
    /// increment receiver; burn → decrement sender. The purchase record and
    /// both stake mutations commit under one lock.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownClaim`] if the claim id maps to no builder;
    /// [`EngineError::InvalidRequest`] if a sender lacks the quantity being
    /// moved. Neither error writes anything.
    pub async fn apply_transfer(
        &self,
        event: &TransferEvent,
        season: Season,
    ) -> Result<TransferOutcome, EngineError> {
        let key = event.reconciliation_key();
        let mut inner = self.inner.write().await;
        if !inner.claims.contains_key(&event.claim_id) {
            return Err(EngineError::UnknownClaim(event.claim_id));
        }
        if inner.purchases.contains_key(&key) {
            return Ok(TransferOutcome::Duplicate);
        }

        let outcome = if event.is_mint() {
            Self::add_stake(&mut inner, &event.to, event.claim_id, season, event.quantity);
            TransferOutcome::Minted
        } else {
            let sender_quantity = inner
                .stakes
                .get(&(event.from.clone(), event.claim_id))
                .map_or(0, |s| s.quantity);
            if sender_quantity < event.quantity {
                return Err(EngineError::InvalidRequest(format!(
                    "sender {} holds {sender_quantity} of claim {}, transfer moves {}",
                    event.from, event.claim_id, event.quantity
                )));
            }
            if let Some(stake) = inner.stakes.get_mut(&(event.from.clone(), event.claim_id)) {
                stake.quantity -= event.quantity;
                stake.updated_at = Utc::now();
            }
            if event.is_burn() {
                TransferOutcome::Burned
            } else {
                Self::add_stake(&mut inner, &event.to, event.claim_id, season, event.quantity);
                TransferOutcome::Transferred
            }
        };

        inner.purchases.insert(
            key.clone(),
            NftPurchaseEvent {
                id: Uuid::new_v4(),
                key,
                season,
                reconciled_at: Utc::now(),
            },
        );
        Ok(outcome)
    }

    fn add_stake(
        inner: &mut LedgerInner,
        wallet: &WalletAddress,
        claim_id: ClaimId,
        season: Season,
        quantity: u64,
    ) {
        let entry = inner
            .stakes
            .entry((wallet.clone(), claim_id))
            .or_insert_with(|| BackerStake {
                backer_wallet: wallet.clone(),
                claim_id,
                season,
                quantity: 0,
                updated_at: Utc::now(),
            });
        entry.quantity += quantity;
        entry.updated_at = Utc::now();
    }

    /// Snapshot of all positive stakes against one claim token. This is the
    /// stake snapshot the distributor uses at the weekly fairness cutoff.
    pub async fn stakes_for_claim(&self, claim_id: ClaimId) -> Vec<BackerStake> {
        let inner = self.inner.read().await;
        let mut stakes: Vec<BackerStake> = inner
            .stakes
            .values()
            .filter(|s| s.claim_id == claim_id && s.quantity > 0)
            .cloned()
            .collect();
        stakes.sort_by(|a, b| a.backer_wallet.cmp(&b.backer_wallet));
        stakes
    }

    /// Current stake quantity of one wallet against one claim token.
    pub async fn stake_quantity(&self, wallet: &WalletAddress, claim_id: ClaimId) -> u64 {
        self.inner
            .read()
            .await
            .stakes
            .get(&(wallet.clone(), claim_id))
            .map_or(0, |s| s.quantity)
    }

    // ── Pending transactions ────────────────────────────────────────────

    /// Inserts a new pending transaction.
    pub async fn insert_pending(&self, tx: PendingTransaction) -> Uuid {
        let id = tx.id;
        self.inner.write().await.pending.insert(id, tx);
        id
    }

    /// Looks up a pending transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PendingTxNotFound`] if absent.
    pub async fn pending_tx(&self, id: Uuid) -> Result<PendingTransaction, EngineError> {
        self.inner
            .read()
            .await
            .pending
            .get(&id)
            .cloned()
            .ok_or(EngineError::PendingTxNotFound(id))
    }

    /// Snapshot of every non-terminal pending transaction.
    pub async fn pending_open(&self) -> Vec<PendingTransaction> {
        self.inner
            .read()
            .await
            .pending
            .values()
            .filter(|tx| !tx.state.is_terminal())
            .cloned()
            .collect()
    }

    /// Transitions a pending transaction under the write lock, validating
    /// against the state machine. Because the check-and-set is atomic,
    /// overlapping poll cycles cannot apply the same transition twice: the
    /// second caller gets [`EngineError::IllegalTransition`].
    ///
    /// # Errors
    ///
    /// [`EngineError::PendingTxNotFound`] or
    /// [`EngineError::IllegalTransition`].
    pub async fn transition_pending(
        &self,
        id: Uuid,
        next: PendingTxState,
    ) -> Result<PendingTransaction, EngineError> {
        let mut inner = self.inner.write().await;
        let tx = inner
            .pending
            .get_mut(&id)
            .ok_or(EngineError::PendingTxNotFound(id))?;
        tx.transition(next)?;
        Ok(tx.clone())
    }

    /// Records the destination-chain transaction hash once it is visible.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PendingTxNotFound`] if absent.
    pub async fn set_pending_dest_hash(
        &self,
        id: Uuid,
        dest_tx_hash: crate::domain::ids::TxHash,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        let tx = inner
            .pending
            .get_mut(&id)
            .ok_or(EngineError::PendingTxNotFound(id))?;
        tx.dest_tx_hash = Some(dest_tx_hash);
        tx.updated_at = Utc::now();
        Ok(())
    }

    // ── Payout trees & claims ───────────────────────────────────────────

    /// Stores a published payout tree.
    pub async fn insert_tree(&self, tree: PayoutTree) {
        self.inner.write().await.trees.insert(tree.id, tree);
    }

    /// Looks up a payout tree.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TreeNotFound`] if absent.
    pub async fn tree(&self, id: Uuid) -> Result<PayoutTree, EngineError> {
        self.inner
            .read()
            .await
            .trees
            .get(&id)
            .cloned()
            .ok_or(EngineError::TreeNotFound(id))
    }

    /// Marks a leaf claimed and decrements the recipient's unclaimed
    /// balance, both under one lock and at most once per leaf. For season
    /// cohorts the recipient's live points receipts get their `claimed_at`
    /// stamp here too; partner credits carry no receipts.
    ///
    /// Returns the claimed amount.
    ///
    /// # Errors
    ///
    /// [`EngineError::TreeNotFound`], [`EngineError::NotEligible`] when the
    /// wallet has no leaf, or [`EngineError::AlreadyClaimed`] when the leaf
    /// was claimed before (in which case nothing changes).
    pub async fn mark_leaf_claimed(
        &self,
        tree_id: Uuid,
        wallet: &WalletAddress,
    ) -> Result<u64, EngineError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let tree = inner
            .trees
            .get_mut(&tree_id)
            .ok_or(EngineError::TreeNotFound(tree_id))?;
        let cohort = tree.cohort.clone();
        let leaf = tree
            .leaves
            .iter_mut()
            .find(|leaf| &leaf.wallet == wallet)
            .ok_or_else(|| EngineError::NotEligible(format!("no leaf for wallet {wallet}")))?;
        if leaf.claimed_at.is_some() {
            return Err(EngineError::AlreadyClaimed(wallet.to_string()));
        }
        leaf.claimed_at = Some(now);
        let amount = leaf.amount;
        let receipt_season = match &cohort {
            PayoutCohort::Season { season } => Some(*season),
            PayoutCohort::Partner { .. } => None,
        };
        if let Some(unclaimed) = inner.unclaimed.get_mut(&(wallet.clone(), cohort)) {
            *unclaimed = unclaimed.saturating_sub(amount);
        }
        if let Some(season) = receipt_season {
            for receipt in inner.points_receipts.iter_mut().filter(|r| {
                r.recipient == *wallet
                    && r.season == season
                    && r.is_live()
                    && r.claimed_at.is_none()
            }) {
                receipt.claimed_at = Some(now);
            }
        }
        Ok(amount)
    }

    // ── Startup replay ──────────────────────────────────────────────────

    /// Restores one persisted points receipt, re-deriving the balance and
    /// unclaimed credits it represents. Amounts already claimed are settled
    /// again when the owning tree is restored, so replay ordering is
    /// receipts first, trees after.
    pub async fn restore_receipt(&self, receipt: PointsReceipt) {
        let mut inner = self.inner.write().await;
        if receipt.is_live() {
            let cohort = PayoutCohort::Season {
                season: receipt.season,
            };
            *inner.balances.entry(receipt.recipient.clone()).or_insert(0) += receipt.value;
            *inner
                .unclaimed
                .entry((receipt.recipient.clone(), cohort))
                .or_insert(0) += receipt.value;
        }
        inner.points_receipts.push(receipt);
    }

    /// Restores a persisted payout tree, replaying the unclaimed decrement
    /// of every leaf that was claimed before the restart.
    pub async fn restore_tree(&self, tree: PayoutTree) {
        let mut inner = self.inner.write().await;
        for leaf in tree.leaves.iter().filter(|l| l.claimed_at.is_some()) {
            if let Some(unclaimed) = inner
                .unclaimed
                .get_mut(&(leaf.wallet.clone(), tree.cohort.clone()))
            {
                *unclaimed = unclaimed.saturating_sub(leaf.amount);
            }
        }
        inner.trees.insert(tree.id, tree);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ids::TxHash;
    use crate::domain::receipts::PointsReceiptKind;

    fn wallet(c: char) -> WalletAddress {
        let addr = WalletAddress::parse(&format!("0x{}", c.to_string().repeat(40))).ok();
        let Some(addr) = addr else {
            panic!("valid wallet");
        };
        addr
    }

    fn account(claim: u64) -> BuilderAccount {
        BuilderAccount {
            id: BuilderId::new(),
            wallet: wallet('b'),
            claim_id: ClaimId(claim),
            season: Season(1),
            email: "builder@example.com".to_string(),
            registered_at: Utc::now(),
        }
    }

    fn mint(claim: u64, to: WalletAddress, quantity: u64, nonce: u8) -> TransferEvent {
        let hash = TxHash::parse(&format!("0x{:064x}", u128::from(nonce) + 1)).ok();
        let Some(tx_hash) = hash else {
            panic!("valid hash");
        };
        TransferEvent {
            tx_hash,
            log_index: 0,
            from: WalletAddress::zero(),
            to,
            claim_id: ClaimId(claim),
            quantity,
            block_number: 1,
        }
    }

    fn receipt(
        builder: BuilderId,
        week: Week,
        recipient: WalletAddress,
        value: u64,
    ) -> PointsReceipt {
        PointsReceipt {
            id: Uuid::new_v4(),
            recipient,
            value,
            kind: PointsReceiptKind::BackerReward,
            event_id: Uuid::new_v4(),
            builder_id: builder,
            week,
            season: Season(1),
            claimed_at: None,
            voided_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_contribution_is_noop() {
        let store = LedgerStore::new();
        let acct = account(1);
        let builder = acct.id;
        let _ = store.register_builder(acct).await;

        let event = ContributionEvent {
            id: Uuid::new_v4(),
            builder_id: builder,
            kind: crate::domain::contribution::ContributionKind::Commit,
            week: Week::new(2026, 8),
            season: Season(1),
            gems_awarded: 5,
            created_at: Utc::now(),
        };
        assert_eq!(store.append_contribution(event.clone()).await.ok(), Some(true));
        assert_eq!(store.append_contribution(event).await.ok(), Some(false));
        assert_eq!(
            store
                .contributions_for(builder, Week::new(2026, 8))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn contribution_for_unknown_builder_rejected() {
        let store = LedgerStore::new();
        let event = ContributionEvent {
            id: Uuid::new_v4(),
            builder_id: BuilderId::new(),
            kind: crate::domain::contribution::ContributionKind::Commit,
            week: Week::new(2026, 8),
            season: Season(1),
            gems_awarded: 5,
            created_at: Utc::now(),
        };
        assert!(store.append_contribution(event).await.is_err());
    }

    #[tokio::test]
    async fn gem_receipt_id_stable_across_recompute() {
        let store = LedgerStore::new();
        let week = Week::new(2026, 8);
        let builder = BuilderId::new();
        let first = store
            .upsert_gem_receipt(builder, week, Season(1), 10, 2)
            .await;
        let second = store
            .upsert_gem_receipt(builder, week, Season(1), 14, 3)
            .await;
        assert_eq!(first.id, second.id);
        assert_eq!(second.total_gems, 14);
    }

    #[tokio::test]
    async fn distribution_rejected_while_live() {
        let store = LedgerStore::new();
        let builder = BuilderId::new();
        let week = Week::new(2026, 8);
        let backer = wallet('a');

        let batch = vec![receipt(builder, week, backer.clone(), 40)];
        assert!(store.insert_distribution(builder, week, batch).await.is_ok());
        assert_eq!(store.balance(&backer).await, 40);

        let again = vec![receipt(builder, week, backer.clone(), 40)];
        let err = store.insert_distribution(builder, week, again).await;
        assert!(matches!(err, Err(EngineError::AlreadyDistributed { .. })));
        // Rejected before any write.
        assert_eq!(store.balance(&backer).await, 40);
    }

    #[tokio::test]
    async fn void_reverses_balances_and_allows_redistribution() {
        let store = LedgerStore::new();
        let builder = BuilderId::new();
        let week = Week::new(2026, 8);
        let backer = wallet('a');
        let cohort = PayoutCohort::Season { season: Season(1) };

        let batch = vec![receipt(builder, week, backer.clone(), 40)];
        let _ = store.insert_distribution(builder, week, batch).await;
        assert_eq!(store.unclaimed(&backer, &cohort).await, 40);

        assert_eq!(store.void_distribution(builder, week).await, 1);
        assert_eq!(store.balance(&backer).await, 0);
        assert_eq!(store.unclaimed(&backer, &cohort).await, 0);

        let redo = vec![receipt(builder, week, backer.clone(), 25)];
        assert!(store.insert_distribution(builder, week, redo).await.is_ok());
        assert_eq!(store.balance(&backer).await, 25);
    }

    #[tokio::test]
    async fn transfer_replay_is_duplicate() {
        let store = LedgerStore::new();
        let _ = store.register_builder(account(7)).await;
        let backer = wallet('a');
        let event = mint(7, backer.clone(), 3, 1);

        assert_eq!(
            store.apply_transfer(&event, Season(1)).await.ok(),
            Some(TransferOutcome::Minted)
        );
        assert_eq!(
            store.apply_transfer(&event, Season(1)).await.ok(),
            Some(TransferOutcome::Duplicate)
        );
        assert_eq!(store.stake_quantity(&backer, ClaimId(7)).await, 3);
    }

    #[tokio::test]
    async fn transfer_moves_stake_between_wallets() {
        let store = LedgerStore::new();
        let _ = store.register_builder(account(7)).await;
        let a = wallet('a');
        let b = wallet('c');
        let _ = store.apply_transfer(&mint(7, a.clone(), 5, 1), Season(1)).await;

        let mut transfer = mint(7, b.clone(), 2, 2);
        transfer.from = a.clone();
        assert_eq!(
            store.apply_transfer(&transfer, Season(1)).await.ok(),
            Some(TransferOutcome::Transferred)
        );
        assert_eq!(store.stake_quantity(&a, ClaimId(7)).await, 3);
        assert_eq!(store.stake_quantity(&b, ClaimId(7)).await, 2);
    }

    #[tokio::test]
    async fn unknown_claim_rejected_without_writes() {
        let store = LedgerStore::new();
        let event = mint(99, wallet('a'), 1, 1);
        assert!(matches!(
            store.apply_transfer(&event, Season(1)).await,
            Err(EngineError::UnknownClaim(_))
        ));
        // Replay after registration still works: nothing was recorded.
        let _ = store.register_builder(account(99)).await;
        assert_eq!(
            store.apply_transfer(&event, Season(1)).await.ok(),
            Some(TransferOutcome::Minted)
        );
    }

    #[tokio::test]
    async fn insufficient_sender_stake_rejected() {
        let store = LedgerStore::new();
        let _ = store.register_builder(account(7)).await;
        let mut transfer = mint(7, wallet('c'), 2, 2);
        transfer.from = wallet('a');
        assert!(store.apply_transfer(&transfer, Season(1)).await.is_err());
        assert_eq!(store.stake_quantity(&wallet('c'), ClaimId(7)).await, 0);
    }

    fn season_tree(recipient: WalletAddress, amount: u64, claimed: bool) -> PayoutTree {
        PayoutTree {
            id: Uuid::new_v4(),
            cohort: PayoutCohort::Season { season: Season(1) },
            merkle_root: "00".repeat(32),
            leaves: vec![crate::domain::payout::PayoutLeaf {
                index: 0,
                wallet: recipient,
                amount,
                claimed_at: claimed.then(Utc::now),
            }],
            proofs: vec![Vec::new()],
            total_amount: amount,
            contract_address: wallet('f'),
            chain_id: 8453,
            deployed_block: 1,
            expires_at: Utc::now() + chrono::Duration::days(30),
            artifact_url: "file:///tmp/tree.json".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn claim_stamps_receipts_claimed() {
        let store = LedgerStore::new();
        let builder = BuilderId::new();
        let week = Week::new(2026, 8);
        let backer = wallet('a');
        let batch = vec![receipt(builder, week, backer.clone(), 40)];
        let _ = store.insert_distribution(builder, week, batch).await;
        let tree = season_tree(backer.clone(), 40, false);
        let tree_id = tree.id;
        store.insert_tree(tree).await;

        assert_eq!(store.mark_leaf_claimed(tree_id, &backer).await.ok(), Some(40));
        let receipts = store.receipts_for(builder, week).await;
        assert!(receipts.iter().all(|r| r.claimed_at.is_some()));
        // Claimed is not voided: the week stays settled.
        assert!(store.has_live_distribution(builder, week).await);
    }

    #[tokio::test]
    async fn replay_rebuilds_balances_and_distribution_guard() {
        let store = LedgerStore::new();
        let builder = BuilderId::new();
        let week = Week::new(2026, 8);
        let backer = wallet('a');
        let cohort = PayoutCohort::Season { season: Season(1) };

        store
            .restore_receipt(receipt(builder, week, backer.clone(), 40))
            .await;
        let mut voided = receipt(builder, Week::new(2026, 9), backer.clone(), 25);
        voided.voided_at = Some(Utc::now());
        store.restore_receipt(voided).await;

        assert_eq!(store.balance(&backer).await, 40);
        assert_eq!(store.unclaimed(&backer, &cohort).await, 40);
        // The replayed week is guarded against redistribution.
        let again = vec![receipt(builder, week, backer.clone(), 40)];
        let err = store.insert_distribution(builder, week, again).await;
        assert!(matches!(err, Err(EngineError::AlreadyDistributed { .. })));
        // The voided week is not.
        assert!(store.has_live_distribution(builder, week).await);
        assert!(!store.has_live_distribution(builder, Week::new(2026, 9)).await);
    }

    #[tokio::test]
    async fn restored_tree_replays_claimed_leaves() {
        let store = LedgerStore::new();
        let builder = BuilderId::new();
        let week = Week::new(2026, 8);
        let backer = wallet('a');
        let cohort = PayoutCohort::Season { season: Season(1) };
        store
            .restore_receipt(receipt(builder, week, backer.clone(), 40))
            .await;
        assert_eq!(store.unclaimed(&backer, &cohort).await, 40);

        let tree = season_tree(backer.clone(), 40, true);
        let tree_id = tree.id;
        store.restore_tree(tree).await;
        assert_eq!(store.unclaimed(&backer, &cohort).await, 0);
        assert!(store.tree(tree_id).await.is_ok());
        // A restored claimed leaf cannot be claimed again.
        let second = store.mark_leaf_claimed(tree_id, &backer).await;
        assert!(matches!(second, Err(EngineError::AlreadyClaimed(_))));
    }

    #[tokio::test]
    async fn partner_rewards_accrue_in_their_own_cohort() {
        let store = LedgerStore::new();
        let backer = wallet('a');
        store
            .credit_partner_reward("acme", Season(1), backer.clone(), 50)
            .await;
        let partner = PayoutCohort::Partner {
            partner_id: "acme".to_string(),
            season: Season(1),
        };
        let season = PayoutCohort::Season { season: Season(1) };
        assert_eq!(store.unclaimed(&backer, &partner).await, 50);
        assert_eq!(store.unclaimed(&backer, &season).await, 0);
        assert_eq!(store.balance(&backer).await, 50);
    }
}
