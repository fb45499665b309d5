//! Derived receipts: weekly gem aggregates and immutable point credits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{BuilderId, Season, WalletAddress, Week};

/// Derived aggregate: total gems a builder earned in one week.
///
/// One receipt per (builder, week), recomputed idempotently from the
/// contribution event log. Never hand-edited; late or corrected events
/// self-heal the total on the next recompute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GemReceipt {
    /// Stable receipt id. Survives recomputes so points receipts can link
    /// back to it.
    pub id: Uuid,
    /// Builder the receipt belongs to.
    pub builder_id: BuilderId,
    /// Week the receipt covers.
    pub week: Week,
    /// Season the week falls in.
    pub season: Season,
    /// Sum of `gems_awarded` over the builder-week's events.
    pub total_gems: u64,
    /// Number of events that fed the total.
    pub event_count: usize,
    /// When the total was last recomputed.
    pub recomputed_at: DateTime<Utc>,
}

/// Who a points receipt credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsReceiptKind {
    /// The builder's fixed share of the weekly pool (plus any residual
    /// under the credit-builder rounding policy).
    BuilderReward,
    /// A backer's stake-proportional share of the weekly pool.
    BackerReward,
}

/// Immutable point credit, always linked to the gem receipt that produced it.
///
/// The conservation invariant is expressed over these rows: for any
/// (builder, week), the builder receipt plus all backer receipts sum exactly
/// to the weekly pool allocated to that builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsReceipt {
    /// Receipt id.
    pub id: Uuid,
    /// Wallet credited.
    pub recipient: WalletAddress,
    /// Points credited, in minimal units.
    pub value: u64,
    /// Builder or backer share.
    pub kind: PointsReceiptKind,
    /// Gem receipt this credit derives from.
    pub event_id: Uuid,
    /// Builder whose weekly pool this credit came out of.
    pub builder_id: BuilderId,
    /// Week the pool covers.
    pub week: Week,
    /// Season the pool covers.
    pub season: Season,
    /// Set when the recipient claims the underlying balance on-chain.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set when a distribution is voided for reprocessing. Voided receipts
    /// no longer count toward balances or conservation.
    pub voided_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PointsReceipt {
    /// Returns `true` if the receipt still counts toward balances.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.voided_at.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn live_until_voided() {
        let mut receipt = PointsReceipt {
            id: Uuid::new_v4(),
            recipient: WalletAddress::zero(),
            value: 10,
            kind: PointsReceiptKind::BuilderReward,
            event_id: Uuid::new_v4(),
            builder_id: BuilderId::new(),
            week: Week::new(2026, 8),
            season: Season(3),
            claimed_at: None,
            voided_at: None,
            created_at: Utc::now(),
        };
        assert!(receipt.is_live());
        receipt.voided_at = Some(Utc::now());
        assert!(!receipt.is_live());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&PointsReceiptKind::BackerReward).ok();
        assert_eq!(json.as_deref(), Some("\"backer_reward\""));
    }
}
