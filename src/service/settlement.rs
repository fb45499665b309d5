//! Payout tree settlement and claim execution.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::chain::ChainClient;
use crate::domain::merkle::{Digest, MerkleTree, ProofStep, digest_hex};
use crate::domain::{
    LedgerStore, PartnerPayoutRule, PayoutCohort, PayoutLeaf, PayoutTree, TxHash, WalletAddress,
};
use crate::error::EngineError;
use crate::persistence::PostgresPersistence;
use crate::service::pending::with_retry;

/// Season-cohort settlement knobs.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Payout contract for season cohorts.
    pub payout_contract: WalletAddress,
    /// Chain the season payout contract lives on.
    pub payout_chain_id: u64,
    /// Days recipients have to claim a season tree.
    pub claim_window_days: i64,
    /// Attempts per chain call before giving up.
    pub retry_attempts: u32,
    /// Base backoff delay, doubled per retry.
    pub retry_base_ms: u64,
}

/// Claim eligibility report for one `(tree, wallet)` pair.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimCheck {
    /// Tree checked.
    pub tree_id: Uuid,
    /// Wallet checked.
    pub wallet: WalletAddress,
    /// The wallet's leaf index.
    pub leaf_index: usize,
    /// Amount authorized for claim.
    pub amount: u64,
    /// Whether the leaf has already been paid.
    pub claimed: bool,
    /// Sibling path the wallet submits on-chain.
    pub proof: Vec<ProofStep>,
}

/// Result of an executed claim.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimReceipt {
    /// Tree claimed against.
    pub tree_id: Uuid,
    /// Recipient wallet.
    pub wallet: WalletAddress,
    /// Amount paid out.
    pub amount: u64,
    /// On-chain claim transaction.
    pub tx_hash: TxHash,
}

/// Builds merkle payout trees over unclaimed balances and executes claims
/// against them.
///
/// A tree freezes its cohort at build time: the sorted leaf set, the root,
/// and every proof are fixed and published together, so a recipient's claim
/// can be verified without re-reading balances. Claims settle exactly once;
/// the contract's claimed bitmap is the source of truth and the local leaf
/// marker follows it.
pub struct SettlementEngine {
    ledger: Arc<LedgerStore>,
    chain: Arc<dyn ChainClient>,
    artifact: Arc<dyn ArtifactStore>,
    persistence: Option<Arc<PostgresPersistence>>,
    partner_rules: Vec<PartnerPayoutRule>,
    config: SettlementConfig,
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("config", &self.config)
            .field("partner_rules", &self.partner_rules)
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    /// Creates a settlement engine.
    #[must_use]
    pub fn new(
        ledger: Arc<LedgerStore>,
        chain: Arc<dyn ChainClient>,
        artifact: Arc<dyn ArtifactStore>,
        persistence: Option<Arc<PostgresPersistence>>,
        partner_rules: Vec<PartnerPayoutRule>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            chain,
            artifact,
            persistence,
            partner_rules,
            config,
        }
    }

    fn resolve_target(
        &self,
        cohort: &PayoutCohort,
    ) -> Result<(WalletAddress, u64, i64), EngineError> {
        match cohort {
            PayoutCohort::Season { .. } => Ok((
                self.config.payout_contract.clone(),
                self.config.payout_chain_id,
                self.config.claim_window_days,
            )),
            PayoutCohort::Partner { partner_id, .. } => self
                .partner_rules
                .iter()
                .find(|rule| rule.partner_id == *partner_id)
                .map(|rule| {
                    (
                        rule.contract_address.clone(),
                        rule.chain_id,
                        rule.claim_window_days,
                    )
                })
                .ok_or_else(|| {
                    EngineError::InvalidRequest(format!(
                        "no payout rule for partner {partner_id}"
                    ))
                }),
        }
    }

    /// Builds, stores, and publishes a payout tree over the cohort's
    /// unclaimed balances. A cohort with nothing to settle builds no tree
    /// and returns `Ok(None)`, so a scheduler can drive quiet periods
    /// without seeing errors.
    ///
    /// Leaves are sorted by wallet so the same balances always produce the
    /// same root. The artifact (root, leaves, proofs) is written to blob
    /// storage before the root goes on-chain, so a publish failure leaves a
    /// retriable artifact rather than an orphaned root.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] when a partner has no payout rule;
    /// chain and artifact errors propagate.
    pub async fn build_payout_tree(
        &self,
        cohort: PayoutCohort,
    ) -> Result<Option<PayoutTree>, EngineError> {
        let (contract, chain_id, window_days) = self.resolve_target(&cohort)?;
        let balances = self.ledger.unclaimed_for_cohort(&cohort).await;
        if balances.is_empty() {
            info!(cohort = %cohort.label(), "no unclaimed balances; no tree built");
            return Ok(None);
        }

        let leaves: Vec<PayoutLeaf> = balances
            .into_iter()
            .enumerate()
            .map(|(index, (wallet, amount))| PayoutLeaf {
                index,
                wallet,
                amount,
                claimed_at: None,
            })
            .collect();
        let total_amount: u64 = leaves.iter().map(|l| l.amount).sum();
        let digests: Vec<Digest> = leaves.iter().map(PayoutLeaf::digest).collect();
        let tree = MerkleTree::build(digests)
            .ok_or_else(|| EngineError::Internal("merkle build over empty set".to_string()))?;
        let root = tree.root();
        let proofs: Vec<Vec<ProofStep>> = leaves
            .iter()
            .map(|leaf| {
                tree.proof(leaf.index)
                    .ok_or_else(|| EngineError::Internal("missing merkle proof".to_string()))
            })
            .collect::<Result<_, _>>()?;

        let tree_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + Duration::days(window_days);
        let artifact_url = self
            .artifact
            .put_json(
                &format!("trees/{}/{tree_id}", cohort.label()),
                &json!({
                    "id": tree_id,
                    "cohort": cohort,
                    "merkle_root": digest_hex(&root),
                    "total_amount": total_amount,
                    "leaves": leaves,
                    "proofs": proofs,
                    "expires_at": expires_at,
                }),
            )
            .await?;

        let expires_unix = u64::try_from(expires_at.timestamp()).unwrap_or(0);
        let publish_tx = with_retry(self.config.retry_attempts, self.config.retry_base_ms, || {
            self.chain
                .publish_payout_root(chain_id, &contract, &root, total_amount, expires_unix)
        })
        .await?;
        let deployed_block = with_retry(
            self.config.retry_attempts,
            self.config.retry_base_ms,
            || self.chain.latest_block(chain_id),
        )
        .await?;

        let payout_tree = PayoutTree {
            id: tree_id,
            cohort: cohort.clone(),
            merkle_root: digest_hex(&root),
            leaves,
            proofs,
            total_amount,
            contract_address: contract,
            chain_id,
            deployed_block,
            expires_at,
            artifact_url,
            created_at: now,
        };
        info!(
            tree_id = %payout_tree.id,
            cohort = %cohort.label(),
            root = %payout_tree.merkle_root,
            total_amount,
            recipients = payout_tree.leaves.len(),
            publish_tx = %publish_tx,
            "payout tree published"
        );
        self.ledger.insert_tree(payout_tree.clone()).await;
        self.persist_tree(&payout_tree).await;
        Ok(Some(payout_tree))
    }

    /// Reports a wallet's claim status against a tree, syncing the local
    /// leaf marker from the contract's claimed bitmap if they disagree.
    ///
    /// # Errors
    ///
    /// [`EngineError::TreeNotFound`], [`EngineError::NotEligible`], or
    /// [`EngineError::TreeExpired`]; chain errors propagate.
    pub async fn verify_claim(
        &self,
        tree_id: Uuid,
        wallet: &WalletAddress,
    ) -> Result<ClaimCheck, EngineError> {
        let tree = self.ledger.tree(tree_id).await?;
        let leaf_index = tree
            .leaf_index(wallet)
            .ok_or_else(|| EngineError::NotEligible(format!("no leaf for wallet {wallet}")))?;
        if tree.expired(Utc::now()) {
            return Err(EngineError::TreeExpired(tree_id));
        }
        let leaf = tree
            .leaves
            .get(leaf_index)
            .ok_or_else(|| EngineError::Internal("leaf index out of range".to_string()))?;
        let proof = tree.proofs.get(leaf_index).cloned().unwrap_or_default();

        let mut claimed = leaf.claimed_at.is_some();
        if !claimed {
            let on_chain = with_retry(
                self.config.retry_attempts,
                self.config.retry_base_ms,
                || {
                    self.chain.is_leaf_claimed(
                        tree.chain_id,
                        &tree.contract_address,
                        leaf.index as u64,
                    )
                },
            )
            .await?;
            if on_chain {
                // Contract wins; a claim settled outside the engine still
                // counts.
                let _ = self.sync_claimed(tree_id, wallet).await;
                claimed = true;
            }
        }
        Ok(ClaimCheck {
            tree_id,
            wallet: wallet.clone(),
            leaf_index,
            amount: leaf.amount,
            claimed,
            proof,
        })
    }

    /// Executes an on-chain claim for a wallet's leaf, then marks the leaf
    /// claimed locally. Each leaf pays out at most once.
    ///
    /// # Errors
    ///
    /// [`EngineError::TreeNotFound`], [`EngineError::NotEligible`],
    /// [`EngineError::TreeExpired`], or [`EngineError::AlreadyClaimed`];
    /// chain reverts surface as [`EngineError::ChainReverted`].
    pub async fn execute_claim(
        &self,
        tree_id: Uuid,
        wallet: &WalletAddress,
    ) -> Result<ClaimReceipt, EngineError> {
        let tree = self.ledger.tree(tree_id).await?;
        let leaf_index = tree
            .leaf_index(wallet)
            .ok_or_else(|| EngineError::NotEligible(format!("no leaf for wallet {wallet}")))?;
        if tree.expired(Utc::now()) {
            return Err(EngineError::TreeExpired(tree_id));
        }
        let leaf = tree
            .leaves
            .get(leaf_index)
            .ok_or_else(|| EngineError::Internal("leaf index out of range".to_string()))?;
        if leaf.claimed_at.is_some() {
            return Err(EngineError::AlreadyClaimed(wallet.to_string()));
        }
        let on_chain = with_retry(
            self.config.retry_attempts,
            self.config.retry_base_ms,
            || {
                self.chain.is_leaf_claimed(
                    tree.chain_id,
                    &tree.contract_address,
                    leaf.index as u64,
                )
            },
        )
        .await?;
        if on_chain {
            let _ = self.sync_claimed(tree_id, wallet).await;
            return Err(EngineError::AlreadyClaimed(wallet.to_string()));
        }

        let siblings: Vec<Digest> = tree
            .proofs
            .get(leaf_index)
            .map(|steps| steps.iter().map(|s| s.sibling).collect())
            .unwrap_or_default();
        let amount = leaf.amount;
        let index = leaf.index as u64;
        let tx_hash = with_retry(self.config.retry_attempts, self.config.retry_base_ms, || {
            self.chain.execute_claim(
                tree.chain_id,
                &tree.contract_address,
                index,
                wallet,
                amount,
                &siblings,
            )
        })
        .await?;

        let claimed_amount = self.ledger.mark_leaf_claimed(tree_id, wallet).await?;
        info!(
            %tree_id,
            %wallet,
            amount = claimed_amount,
            claim_tx = %tx_hash,
            "claim executed"
        );
        if let Ok(updated) = self.ledger.tree(tree_id).await {
            self.persist_tree(&updated).await;
        }
        Ok(ClaimReceipt {
            tree_id,
            wallet: wallet.clone(),
            amount: claimed_amount,
            tx_hash,
        })
    }

    async fn sync_claimed(&self, tree_id: Uuid, wallet: &WalletAddress) -> Result<(), EngineError> {
        match self.ledger.mark_leaf_claimed(tree_id, wallet).await {
            Ok(_) | Err(EngineError::AlreadyClaimed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn persist_tree(&self, tree: &PayoutTree) {
        if let Some(persistence) = &self.persistence
            && let Err(e) = persistence.save_payout_tree(tree).await
        {
            warn!(tree_id = %tree.id, error = %e, "payout tree write-behind failed");
        }
    }
}
