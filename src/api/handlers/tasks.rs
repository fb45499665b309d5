//! Scheduled-task endpoints.
//!
//! Each settlement job is exposed as an idempotent `POST /tasks/...`
//! endpoint driven by an external scheduler. The `SETTLEMENT_TASKS_DISABLED`
//! kill switch makes every endpoint report `skipped` without touching the
//! ledger, so an operator can freeze settlement without redeploying.

use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::api::dto::{
    BuildPayoutTreeRequest, DistributePointsRequest, RecomputeGemsRequest,
    ReconcilePurchasesRequest, TaskOutcome,
};
use crate::app_state::AppState;
use crate::domain::{BuilderId, PayoutCohort, Season, Week};
use crate::error::{EngineError, ErrorResponse};

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// `POST /tasks/recompute-gems` — Rebuild gem receipts for a week.
///
/// # Errors
///
/// Returns [`EngineError`] on a malformed week key or unknown builder.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/recompute-gems",
    tag = "Tasks",
    summary = "Recompute weekly gem receipts",
    description = "Re-derives gem receipts from the contribution log, for one builder or for every builder with events in the week.",
    request_body = RecomputeGemsRequest,
    responses(
        (status = 200, description = "Task outcome", body = TaskOutcome),
        (status = 400, description = "Malformed request", body = ErrorResponse),
    )
)]
pub async fn recompute_gems(
    State(state): State<AppState>,
    Json(req): Json<RecomputeGemsRequest>,
) -> Result<impl IntoResponse, EngineError> {
    if !state.tasks_enabled {
        return Ok(Json(TaskOutcome::skipped()));
    }
    let started = Instant::now();
    let week: Week = req.week.parse()?;
    let season = Season(req.season);
    let result = match req.builder_id {
        Some(builder_id) => {
            let receipt = state
                .gems
                .recompute_weekly_gems(BuilderId::from_uuid(builder_id), week, season)
                .await?;
            json!({
                "builder_id": receipt.builder_id,
                "week": receipt.week,
                "total_gems": receipt.total_gems,
                "event_count": receipt.event_count,
            })
        }
        None => {
            let summary = state.gems.recompute_week(week, season).await;
            serde_json::to_value(summary)
                .map_err(|e| EngineError::Internal(e.to_string()))?
        }
    };
    Ok(Json(TaskOutcome::completed(elapsed_ms(started), result)))
}

/// `POST /tasks/distribute-points` — Distribute a week's ranked pools.
///
/// # Errors
///
/// Returns [`EngineError::InvalidRequest`] on a malformed week key or an
/// empty ranking list. Per-builder failures are counted in the outcome, not
/// surfaced as errors.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/distribute-points",
    tag = "Tasks",
    summary = "Distribute weekly points",
    description = "Splits each ranked builder's pool between the builder and their backers, stake-proportionally. Builder-weeks that cannot settle are skipped; the rest commit. Set void_existing to reverse and redo a prior run.",
    request_body = DistributePointsRequest,
    responses(
        (status = 200, description = "Task outcome", body = TaskOutcome),
        (status = 400, description = "Malformed request", body = ErrorResponse),
    )
)]
pub async fn distribute_points(
    State(state): State<AppState>,
    Json(req): Json<DistributePointsRequest>,
) -> Result<impl IntoResponse, EngineError> {
    if !state.tasks_enabled {
        return Ok(Json(TaskOutcome::skipped()));
    }
    let started = Instant::now();
    let week: Week = req.week.parse()?;
    if req.rankings.is_empty() {
        return Err(EngineError::InvalidRequest(
            "rankings must not be empty".to_string(),
        ));
    }
    let rankings: Vec<(BuilderId, u32)> = req
        .rankings
        .iter()
        .map(|entry| (BuilderId::from_uuid(entry.builder_id), entry.rank))
        .collect();
    let mut voided = 0usize;
    if req.void_existing {
        for (builder_id, _) in &rankings {
            voided += state.distributor.void_distribution(*builder_id, week).await;
        }
    }
    let summary = state.distributor.distribute_week(week, &rankings).await;
    let mut result =
        serde_json::to_value(summary).map_err(|e| EngineError::Internal(e.to_string()))?;
    if let Some(map) = result.as_object_mut() {
        map.insert("voided".to_string(), json!(voided));
    }
    Ok(Json(TaskOutcome::completed(elapsed_ms(started), result)))
}

/// `POST /tasks/reconcile-purchases` — Scan and reconcile claim transfers.
///
/// # Errors
///
/// Returns [`EngineError::ChainError`] if the log scan fails.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/reconcile-purchases",
    tag = "Tasks",
    summary = "Reconcile claim-token purchases",
    description = "Scans the claim-token contract's transfer logs over a block range and applies them to the stake table. Replaying a range is a no-op.",
    request_body = ReconcilePurchasesRequest,
    responses(
        (status = 200, description = "Task outcome", body = TaskOutcome),
        (status = 502, description = "Chain scan failed", body = ErrorResponse),
    )
)]
pub async fn reconcile_purchases(
    State(state): State<AppState>,
    Json(req): Json<ReconcilePurchasesRequest>,
) -> Result<impl IntoResponse, EngineError> {
    if !state.tasks_enabled {
        return Ok(Json(TaskOutcome::skipped()));
    }
    let started = Instant::now();
    let to_block = match req.to_block {
        Some(block) => block,
        None => state.chain.latest_block(state.claim_chain_id).await?,
    };
    let summary = state
        .reconciler
        .scan_range(
            state.chain.as_ref(),
            state.claim_chain_id,
            &state.claim_contract,
            req.from_block,
            to_block,
            state.active_season,
        )
        .await?;
    let result = serde_json::to_value(summary).map_err(|e| EngineError::Internal(e.to_string()))?;
    Ok(Json(TaskOutcome::completed(elapsed_ms(started), result)))
}

/// `POST /tasks/poll-pending` — Run one pending-transaction poll cycle.
///
/// # Errors
///
/// Never fails outright; per-transaction chain failures are counted in the
/// outcome.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/poll-pending",
    tag = "Tasks",
    summary = "Poll pending purchases",
    description = "Advances every open pending transaction through its state machine: confirms sources, matches destination mints, reconciles stakes, and fails timed-out purchases with one notification each.",
    responses(
        (status = 200, description = "Task outcome", body = TaskOutcome),
    )
)]
pub async fn poll_pending(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, EngineError> {
    if !state.tasks_enabled {
        return Ok(Json(TaskOutcome::skipped()));
    }
    let started = Instant::now();
    let summary = state.orchestrator.run_poll_cycle().await;
    let result = serde_json::to_value(summary).map_err(|e| EngineError::Internal(e.to_string()))?;
    Ok(Json(TaskOutcome::completed(elapsed_ms(started), result)))
}

/// `POST /tasks/build-payout-tree` — Settle a cohort into a payout tree.
///
/// # Errors
///
/// Returns [`EngineError`] when the partner has no payout rule or the root
/// publication fails. A cohort with nothing to settle reports `empty`.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/build-payout-tree",
    tag = "Tasks",
    summary = "Build and publish a payout tree",
    description = "Freezes the cohort's unclaimed balances into a merkle tree, stores the artifact, and publishes the root to the payout contract. A cohort with no unclaimed balances reports empty without building.",
    request_body = BuildPayoutTreeRequest,
    responses(
        (status = 200, description = "Task outcome", body = TaskOutcome),
        (status = 400, description = "Unknown partner", body = ErrorResponse),
        (status = 502, description = "Root publication failed", body = ErrorResponse),
    )
)]
pub async fn build_payout_tree(
    State(state): State<AppState>,
    Json(req): Json<BuildPayoutTreeRequest>,
) -> Result<impl IntoResponse, EngineError> {
    if !state.tasks_enabled {
        return Ok(Json(TaskOutcome::skipped()));
    }
    let started = Instant::now();
    let season = Season(req.season);
    let cohort = match req.partner_id {
        Some(partner_id) => PayoutCohort::Partner { partner_id, season },
        None => PayoutCohort::Season { season },
    };
    let label = cohort.label();
    let Some(tree) = state.settlement.build_payout_tree(cohort).await? else {
        return Ok(Json(TaskOutcome::empty(
            elapsed_ms(started),
            json!({ "cohort": label }),
        )));
    };
    let result = json!({
        "tree_id": tree.id,
        "merkle_root": tree.merkle_root,
        "total_amount": tree.total_amount,
        "recipients": tree.leaves.len(),
        "contract_address": tree.contract_address,
        "chain_id": tree.chain_id,
        "expires_at": tree.expires_at,
        "artifact_url": tree.artifact_url,
    });
    Ok(Json(TaskOutcome::completed(elapsed_ms(started), result)))
}

/// Task routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks/recompute-gems", post(recompute_gems))
        .route("/tasks/distribute-points", post(distribute_points))
        .route("/tasks/reconcile-purchases", post(reconcile_purchases))
        .route("/tasks/poll-pending", post(poll_pending))
        .route("/tasks/build-payout-tree", post(build_payout_tree))
}
