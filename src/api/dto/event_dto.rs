//! DTOs for contribution ingest, builder registration, and partner rewards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::ContributionKind;

/// Request body for `POST /api/v1/events/contributions`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ContributionEventRequest {
    /// Classifier-assigned event id; the ingest idempotency key.
    pub id: Uuid,
    /// Builder who earned the gems.
    pub builder_id: Uuid,
    /// Contribution kind.
    #[schema(value_type = String, example = "merged_pull_request")]
    pub kind: ContributionKind,
    /// Week key, e.g. `2026-W08`.
    pub week: String,
    /// Season number.
    pub season: u32,
    /// Gems awarded by the classifier.
    pub gems_awarded: u64,
}

/// Response body for contribution ingest.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestResponse {
    /// Event id as submitted.
    pub event_id: Uuid,
    /// `false` when the id was already ingested.
    pub inserted: bool,
}

/// Request body for `POST /api/v1/builders`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterBuilderRequest {
    /// Builder's payout wallet.
    pub wallet: String,
    /// Claim-token id assigned to the builder.
    pub claim_id: u64,
    /// Season the builder joins in.
    pub season: u32,
    /// Contact email.
    pub email: String,
}

/// Response body for builder registration.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegisterBuilderResponse {
    /// Assigned builder id.
    pub builder_id: Uuid,
    /// Claim-token id registered.
    pub claim_id: u64,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/partners/rewards`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PartnerRewardRequest {
    /// Sponsoring partner id.
    pub partner_id: String,
    /// Season the reward belongs to.
    pub season: u32,
    /// Recipient wallet.
    pub wallet: String,
    /// Points credited.
    pub amount: u64,
}

/// Generic status acknowledgement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Outcome, e.g. `ok`.
    pub status: String,
}
