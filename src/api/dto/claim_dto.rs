//! DTOs for claims and purchase submission.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::merkle::{ProofStep, digest_hex};
use crate::service::{ClaimCheck, ClaimReceipt};

/// One hex-encoded merkle proof step.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProofStepDto {
    /// Sibling digest, `0x`-prefixed.
    pub sibling: String,
    /// `true` when the sibling sits to the left of the running hash.
    pub sibling_is_left: bool,
}

impl From<&ProofStep> for ProofStepDto {
    fn from(step: &ProofStep) -> Self {
        Self {
            sibling: digest_hex(&step.sibling),
            sibling_is_left: step.sibling_is_left,
        }
    }
}

/// Response body for `GET /api/v1/claims/{tree_id}/{wallet}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClaimCheckResponse {
    /// Tree checked.
    pub tree_id: Uuid,
    /// Wallet checked.
    pub wallet: String,
    /// The wallet's leaf index in the tree.
    pub leaf_index: usize,
    /// Amount authorized for claim.
    pub amount: u64,
    /// Whether the leaf has already been paid.
    pub claimed: bool,
    /// Sibling path to submit on-chain.
    pub proof: Vec<ProofStepDto>,
}

impl From<ClaimCheck> for ClaimCheckResponse {
    fn from(check: ClaimCheck) -> Self {
        Self {
            tree_id: check.tree_id,
            wallet: check.wallet.as_str().to_string(),
            leaf_index: check.leaf_index,
            amount: check.amount,
            claimed: check.claimed,
            proof: check.proof.iter().map(ProofStepDto::from).collect(),
        }
    }
}

/// Response body for `POST /api/v1/claims/{tree_id}/{wallet}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClaimExecuteResponse {
    /// Tree claimed against.
    pub tree_id: Uuid,
    /// Recipient wallet.
    pub wallet: String,
    /// Amount paid out.
    pub amount: u64,
    /// On-chain claim transaction hash.
    pub tx_hash: String,
}

impl From<ClaimReceipt> for ClaimExecuteResponse {
    fn from(receipt: ClaimReceipt) -> Self {
        Self {
            tree_id: receipt.tree_id,
            wallet: receipt.wallet.as_str().to_string(),
            amount: receipt.amount,
            tx_hash: receipt.tx_hash.as_str().to_string(),
        }
    }
}

/// Request body for `POST /api/v1/purchases`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitPurchaseRequest {
    /// Backer's wallet on the destination chain.
    pub backer_wallet: String,
    /// Contact address for terminal-failure notification.
    pub backer_email: String,
    /// Claim token being purchased.
    pub claim_id: u64,
    /// Claim-units being purchased.
    pub quantity: u64,
    /// Chain id the purchase was paid on.
    pub source_chain_id: u64,
    /// Payment transaction hash on the source chain.
    pub source_tx_hash: String,
}

/// Response body for purchase submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitPurchaseResponse {
    /// Tracking id for the pending transaction.
    pub pending_tx_id: Uuid,
    /// Initial lifecycle state.
    pub state: String,
}

/// Response body for `GET /api/v1/purchases/{id}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingTxResponse {
    /// Tracking id.
    pub id: Uuid,
    /// Current lifecycle state.
    pub state: String,
    /// Destination-chain transaction hash, once visible.
    pub dest_tx_hash: Option<String>,
}
