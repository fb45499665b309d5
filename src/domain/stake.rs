//! Backer stakes and the on-chain/off-chain reconciliation records.
//!
//! A [`TransferEvent`] is an append-only chain fact read from `Transfer` /
//! `TransferSingle` logs. An [`NftPurchaseEvent`] is the off-chain match
//! record the reconciler creates at most once per transfer, keyed by the
//! full composite [`ReconciliationKey`]. Stakes are mutated only through
//! reconciliation, never by the points distributor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{ClaimId, Season, TxHash, WalletAddress};

/// Current quantity of claim-units a backer holds against one builder's
/// claim token for a season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackerStake {
    /// Backer's wallet.
    pub backer_wallet: WalletAddress,
    /// Claim token the stake is held against.
    pub claim_id: ClaimId,
    /// Season scope.
    pub season: Season,
    /// Claim-units held.
    pub quantity: u64,
    /// Last reconciliation that touched this row.
    pub updated_at: DateTime<Utc>,
}

/// On-chain transfer log entry, globally unique by `(tx_hash, log_index)`.
///
/// Delivery is at-least-once and possibly reordered; the reconciler relies
/// on the composite key for replay safety, never on ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Transaction hash of the log.
    pub tx_hash: TxHash,
    /// Log index within the transaction.
    pub log_index: u32,
    /// Sender; the zero address marks a mint.
    pub from: WalletAddress,
    /// Receiver; the zero address marks a burn.
    pub to: WalletAddress,
    /// Claim token transferred.
    pub claim_id: ClaimId,
    /// Claim-units transferred.
    pub quantity: u64,
    /// Block the log was emitted in.
    pub block_number: u64,
}

impl TransferEvent {
    /// Returns `true` if this transfer mints new claim-units.
    #[must_use]
    pub fn is_mint(&self) -> bool {
        self.from.is_zero()
    }

    /// Returns `true` if this transfer burns claim-units.
    #[must_use]
    pub fn is_burn(&self) -> bool {
        self.to.is_zero()
    }

    /// The composite key that makes reconciliation replay-safe.
    #[must_use]
    pub fn reconciliation_key(&self) -> ReconciliationKey {
        ReconciliationKey {
            claim_id: self.claim_id,
            quantity: self.quantity,
            from: (!self.from.is_zero()).then(|| self.from.clone()),
            to: (!self.to.is_zero()).then(|| self.to.clone()),
            tx_hash: self.tx_hash.clone(),
            log_index: self.log_index,
        }
    }
}

/// Uniqueness key for matching a chain transfer to an off-chain purchase
/// record: `(claim_id, quantity, from?, to?, tx_hash, log_index)`.
///
/// Re-running a log scan over the same block range produces identical keys,
/// so an already-reconciled transfer is a no-op rather than a second credit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconciliationKey {
    /// Claim token transferred.
    pub claim_id: ClaimId,
    /// Claim-units transferred.
    pub quantity: u64,
    /// Sender, `None` for mints.
    pub from: Option<WalletAddress>,
    /// Receiver, `None` for burns.
    pub to: Option<WalletAddress>,
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Log index within the transaction.
    pub log_index: u32,
}

/// Off-chain record that a transfer has been applied to the stake table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftPurchaseEvent {
    /// Record id.
    pub id: Uuid,
    /// The matched composite key.
    pub key: ReconciliationKey,
    /// Season the stake change was applied in.
    pub season: Season,
    /// When the match was recorded.
    pub reconciled_at: DateTime<Utc>,
}
