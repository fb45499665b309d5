//! DTOs for the scheduled-task endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope returned by every task endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskOutcome {
    /// `completed` when the task ran, `skipped` when tasks are disabled.
    pub status: String,
    /// Wall-clock task duration.
    pub duration_ms: u64,
    /// Task-specific result payload.
    #[schema(value_type = Object)]
    pub result: serde_json::Value,
}

impl TaskOutcome {
    /// A `skipped` outcome for when the task kill switch is on.
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
            duration_ms: 0,
            result: serde_json::Value::Null,
        }
    }

    /// A `completed` outcome with the given payload.
    #[must_use]
    pub fn completed(duration_ms: u64, result: serde_json::Value) -> Self {
        Self {
            status: "completed".to_string(),
            duration_ms,
            result,
        }
    }

    /// An `empty` outcome for a run that found nothing to settle.
    #[must_use]
    pub fn empty(duration_ms: u64, result: serde_json::Value) -> Self {
        Self {
            status: "empty".to_string(),
            duration_ms,
            result,
        }
    }
}

/// Request body for `POST /api/v1/tasks/recompute-gems`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecomputeGemsRequest {
    /// Week key to recompute, e.g. `2026-W08`.
    pub week: String,
    /// Season the receipts belong to.
    pub season: u32,
    /// Restrict the run to one builder; omitted means every builder with
    /// events in the week.
    pub builder_id: Option<Uuid>,
}

/// Request body for `POST /api/v1/tasks/distribute-points`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DistributePointsRequest {
    /// Week key being settled.
    pub week: String,
    /// Ranked builders to settle; one entry per builder-week.
    pub rankings: Vec<RankedBuilder>,
    /// Void live receipts for each builder-week before distributing.
    #[serde(default)]
    pub void_existing: bool,
}

/// One leaderboard entry in a weekly distribution run.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RankedBuilder {
    /// Builder whose pool is distributed.
    pub builder_id: Uuid,
    /// Builder's 1-based leaderboard rank for the week.
    pub rank: u32,
}

/// Request body for `POST /api/v1/tasks/reconcile-purchases`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReconcilePurchasesRequest {
    /// First block of the scan range.
    pub from_block: u64,
    /// Last block of the scan range; omitted means the chain tip.
    pub to_block: Option<u64>,
}

/// Request body for `POST /api/v1/tasks/build-payout-tree`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BuildPayoutTreeRequest {
    /// Season cohort to settle.
    pub season: u32,
    /// Build for this partner's cohort instead of the season cohort.
    pub partner_id: Option<String>,
}
