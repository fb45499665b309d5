//! Pending bridge/mint transactions and their state machine.
//!
//! A [`PendingTransaction`] is created when a backer initiates a purchase
//! through the off-chain bridging step. The orchestrator advances it:
//!
//! ```text
//! submitted → bridging → destination_confirmed → reconciled
//! submitted → failed        (revert or wall-clock timeout)
//! bridging  → failed
//! ```
//!
//! Transitions are validated so overlapping poll cycles cannot move a
//! transaction twice; a terminal state is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{ClaimId, Season, TxHash, WalletAddress};
use crate::error::EngineError;

/// Lifecycle state of a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingTxState {
    /// Submitted on the source chain, not yet confirmed.
    Submitted,
    /// Source transaction confirmed; waiting for the destination mint.
    Bridging,
    /// Destination mint/transfer is visible on-chain.
    DestinationConfirmed,
    /// The resulting transfer has been fed through the reconciler.
    Reconciled,
    /// Reverted on-chain or timed out. Terminal; never credits a stake.
    Failed,
}

impl PendingTxState {
    /// Returns the state as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Bridging => "bridging",
            Self::DestinationConfirmed => "destination_confirmed",
            Self::Reconciled => "reconciled",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `Reconciled` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Reconciled | Self::Failed)
    }

    /// Whether the machine may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Bridging)
                | (Self::Submitted, Self::Failed)
                | (Self::Bridging, Self::DestinationConfirmed)
                | (Self::Bridging, Self::Failed)
                | (Self::DestinationConfirmed, Self::Reconciled)
        )
    }
}

/// In-flight purchase being bridged from a source chain to the claim-token
/// chain. Short-lived: ends `reconciled` or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Record id.
    pub id: Uuid,
    /// Backer who initiated the purchase.
    pub backer_wallet: WalletAddress,
    /// Contact address for terminal-failure notification.
    pub backer_email: String,
    /// Claim token being purchased.
    pub claim_id: ClaimId,
    /// Claim-units being purchased.
    pub quantity: u64,
    /// Season scope.
    pub season: Season,
    /// Chain id the purchase was paid on.
    pub source_chain_id: u64,
    /// Chain id the claim token lives on.
    pub dest_chain_id: u64,
    /// Payment transaction on the source chain.
    pub source_tx_hash: TxHash,
    /// Mint/transfer transaction on the destination chain, once visible.
    pub dest_tx_hash: Option<TxHash>,
    /// Current lifecycle state.
    pub state: PendingTxState,
    /// Submission time; the wall-clock timeout counts from here.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl PendingTransaction {
    /// Applies a state transition, validating it against the machine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IllegalTransition`] if the move is not a legal
    /// edge (including any move out of a terminal state).
    pub fn transition(&mut self, next: PendingTxState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::IllegalTransition {
                from: self.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Returns `true` once `now` is past the submission deadline.
    #[must_use]
    pub fn timed_out(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        let secs = i64::try_from(timeout_secs).unwrap_or(i64::MAX);
        now > self.created_at + chrono::Duration::seconds(secs)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn make_tx() -> PendingTransaction {
        let hash = TxHash::parse(&format!("0x{}", "22".repeat(32))).ok();
        let Some(source_tx_hash) = hash else {
            panic!("valid hash");
        };
        PendingTransaction {
            id: Uuid::new_v4(),
            backer_wallet: WalletAddress::zero(),
            backer_email: "backer@example.com".to_string(),
            claim_id: ClaimId(1),
            quantity: 1,
            season: Season(3),
            source_chain_id: 1,
            dest_chain_id: 8453,
            source_tx_hash,
            dest_tx_hash: None,
            state: PendingTxState::Submitted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn happy_path_transitions() {
        let mut tx = make_tx();
        assert!(tx.transition(PendingTxState::Bridging).is_ok());
        assert!(tx.transition(PendingTxState::DestinationConfirmed).is_ok());
        assert!(tx.transition(PendingTxState::Reconciled).is_ok());
        assert!(tx.state.is_terminal());
    }

    #[test]
    fn failed_is_terminal() {
        let mut tx = make_tx();
        assert!(tx.transition(PendingTxState::Failed).is_ok());
        assert!(tx.transition(PendingTxState::Bridging).is_err());
        assert!(tx.transition(PendingTxState::Failed).is_err());
    }

    #[test]
    fn cannot_skip_bridging() {
        let mut tx = make_tx();
        assert!(tx.transition(PendingTxState::DestinationConfirmed).is_err());
        assert_eq!(tx.state, PendingTxState::Submitted);
    }

    #[test]
    fn timeout_counts_from_creation() {
        let mut tx = make_tx();
        tx.created_at = Utc::now() - chrono::Duration::seconds(600);
        assert!(tx.timed_out(Utc::now(), 300));
        assert!(!tx.timed_out(Utc::now(), 3600));
    }
}
