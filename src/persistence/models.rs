//! Database row models for the durable settlement log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row from the `builders` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderRow {
    /// Builder id.
    pub id: Uuid,
    /// Payout wallet.
    pub wallet: String,
    /// Claim-token id.
    pub claim_id: i64,
    /// Season joined.
    pub season: i64,
    /// Contact email.
    pub email: String,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

/// A row from the `contribution_events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionRow {
    /// Classifier-assigned event id.
    pub id: Uuid,
    /// Builder who earned the gems.
    pub builder_id: Uuid,
    /// Contribution kind discriminator (e.g. `"merged_pull_request"`).
    pub kind: String,
    /// Week key (e.g. `"2026-W08"`).
    pub week: String,
    /// Season number.
    pub season: i64,
    /// Gems awarded.
    pub gems_awarded: i64,
    /// Ingest timestamp.
    pub created_at: DateTime<Utc>,
}

/// A row from the `points_receipts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsReceiptRow {
    /// Receipt id.
    pub id: Uuid,
    /// Recipient wallet.
    pub recipient: String,
    /// Points credited.
    pub value: i64,
    /// Receipt kind discriminator (`"builder_reward"` / `"backer_reward"`).
    pub kind: String,
    /// Gem receipt the credit derives from.
    pub event_id: Uuid,
    /// Builder whose pool the credit came out of.
    pub builder_id: Uuid,
    /// Week key.
    pub week: String,
    /// Season number.
    pub season: i64,
    /// Claim timestamp, if claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Void timestamp, if voided.
    pub voided_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A row from the `payout_trees` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutTreeRow {
    /// Tree id.
    pub id: Uuid,
    /// Hex-encoded merkle root.
    pub merkle_root: String,
    /// Full tree (cohort, leaves, proofs) as JSONB.
    pub tree_json: serde_json::Value,
    /// Sum of leaf amounts.
    pub total_amount: i64,
    /// Number of recipients.
    pub recipient_count: i64,
    /// Payout contract address.
    pub contract_address: String,
    /// Chain id of the contract.
    pub chain_id: i64,
    /// Block number at publication.
    pub deployed_block: i64,
    /// Claim deadline.
    pub expires_at: DateTime<Utc>,
    /// Blob-store URL of the tree artifact.
    pub artifact_url: String,
    /// Publication timestamp.
    pub created_at: DateTime<Utc>,
}
