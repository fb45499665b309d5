//! Payout trees, leaves, and partner payout scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{Season, WalletAddress};
use super::merkle::{Digest, ProofStep, leaf_hash};

/// Which unclaimed balances a payout tree covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayoutCohort {
    /// All recipients of a season's regular points payouts.
    Season {
        /// Season being settled.
        season: Season,
    },
    /// Recipients of a third-party sponsor's reward program, settled
    /// through that partner's dedicated payout contract.
    Partner {
        /// Partner identifier.
        partner_id: String,
        /// Season being settled.
        season: Season,
    },
}

impl PayoutCohort {
    /// Season component of the cohort.
    #[must_use]
    pub const fn season(&self) -> Season {
        match self {
            Self::Season { season } | Self::Partner { season, .. } => *season,
        }
    }

    /// Short label used in logs and artifact keys.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Season { season } => format!("season-{}", season.0),
            Self::Partner { partner_id, season } => {
                format!("partner-{}-s{}", partner_id, season.0)
            }
        }
    }
}

/// Per-partner payout rule, resolved once per tree build.
///
/// The set of rules is a small tagged configuration value, not runtime
/// reflection: each partner maps to its own payout contract and claim
/// window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerPayoutRule {
    /// Partner identifier matching [`PayoutCohort::Partner`].
    pub partner_id: String,
    /// Payout contract deployed for this partner.
    pub contract_address: WalletAddress,
    /// Chain the contract lives on.
    pub chain_id: u64,
    /// Days recipients have to claim before the tree expires.
    pub claim_window_days: i64,
}

/// One `(recipient, amount)` leaf of a payout tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutLeaf {
    /// Position in the sorted leaf set; the on-chain claim index.
    pub index: usize,
    /// Recipient wallet.
    pub wallet: WalletAddress,
    /// Amount authorized for claim, in minimal units.
    pub amount: u64,
    /// Set exactly once, when the claim succeeds (or when the chain reports
    /// the leaf as already paid).
    pub claimed_at: Option<DateTime<Utc>>,
}

impl PayoutLeaf {
    /// Digest of this leaf.
    #[must_use]
    pub fn digest(&self) -> Digest {
        leaf_hash(&self.wallet, self.amount)
    }
}

/// A published payout tree: the merkle commitment over a cohort's unclaimed
/// balances, plus everything needed to verify and track claims against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutTree {
    /// Tree id.
    pub id: Uuid,
    /// Cohort the tree settles.
    pub cohort: PayoutCohort,
    /// Merkle root, hex-encoded.
    pub merkle_root: String,
    /// Leaves sorted by wallet address.
    pub leaves: Vec<PayoutLeaf>,
    /// Per-leaf sibling paths, same order as `leaves`.
    pub proofs: Vec<Vec<ProofStep>>,
    /// Sum of all leaf amounts.
    pub total_amount: u64,
    /// Payout contract the root was published to.
    pub contract_address: WalletAddress,
    /// Chain the contract lives on.
    pub chain_id: u64,
    /// Block number at publication; freezes eligibility.
    pub deployed_block: u64,
    /// Claim deadline.
    pub expires_at: DateTime<Utc>,
    /// Blob-store URL of the tree JSON artifact.
    pub artifact_url: String,
    /// Publication timestamp.
    pub created_at: DateTime<Utc>,
}

impl PayoutTree {
    /// Finds a recipient's leaf index by wallet.
    #[must_use]
    pub fn leaf_index(&self, wallet: &WalletAddress) -> Option<usize> {
        self.leaves.iter().position(|leaf| &leaf.wallet == wallet)
    }

    /// Returns `true` once `now` is past the claim deadline.
    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
