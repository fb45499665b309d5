//! Claim verification and execution handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::dto::{ClaimCheckResponse, ClaimExecuteResponse};
use crate::app_state::AppState;
use crate::domain::WalletAddress;
use crate::error::{EngineError, ErrorResponse};

/// `GET /claims/{tree_id}/{wallet}` — Check claim eligibility.
///
/// # Errors
///
/// Returns [`EngineError`] for an unknown tree, ineligible wallet, or
/// expired tree.
#[utoipa::path(
    get,
    path = "/api/v1/claims/{tree_id}/{wallet}",
    tag = "Claims",
    summary = "Check claim eligibility",
    description = "Reports a wallet's leaf, amount, proof, and claimed status against a payout tree. The contract's claimed bitmap wins over local state.",
    params(
        ("tree_id" = Uuid, Path, description = "Payout tree id"),
        ("wallet" = String, Path, description = "Recipient wallet address"),
    ),
    responses(
        (status = 200, description = "Eligibility report", body = ClaimCheckResponse),
        (status = 404, description = "Tree not found", body = ErrorResponse),
        (status = 422, description = "Not eligible or tree expired", body = ErrorResponse),
    )
)]
pub async fn check_claim(
    State(state): State<AppState>,
    Path((tree_id, wallet)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, EngineError> {
    let wallet = WalletAddress::parse(&wallet)?;
    let check = state.settlement.verify_claim(tree_id, &wallet).await?;
    Ok(Json(ClaimCheckResponse::from(check)))
}

/// `POST /claims/{tree_id}/{wallet}` — Execute a claim.
///
/// # Errors
///
/// Returns [`EngineError`] for an unknown tree, ineligible wallet, expired
/// tree, already-claimed leaf, or on-chain revert.
#[utoipa::path(
    post,
    path = "/api/v1/claims/{tree_id}/{wallet}",
    tag = "Claims",
    summary = "Execute a claim",
    description = "Submits the on-chain claim for the wallet's leaf and marks it claimed. Each leaf pays out at most once.",
    params(
        ("tree_id" = Uuid, Path, description = "Payout tree id"),
        ("wallet" = String, Path, description = "Recipient wallet address"),
    ),
    responses(
        (status = 200, description = "Claim executed", body = ClaimExecuteResponse),
        (status = 404, description = "Tree not found", body = ErrorResponse),
        (status = 409, description = "Already claimed", body = ErrorResponse),
        (status = 422, description = "Not eligible, expired, or reverted", body = ErrorResponse),
    )
)]
pub async fn execute_claim(
    State(state): State<AppState>,
    Path((tree_id, wallet)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, EngineError> {
    let wallet = WalletAddress::parse(&wallet)?;
    let receipt = state.settlement.execute_claim(tree_id, &wallet).await?;
    Ok(Json(ClaimExecuteResponse::from(receipt)))
}

/// Claim routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/claims/{tree_id}/{wallet}",
        get(check_claim).post(execute_claim),
    )
}
