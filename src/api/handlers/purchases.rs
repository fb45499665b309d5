//! Purchase submission and tracking handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::dto::{PendingTxResponse, SubmitPurchaseRequest, SubmitPurchaseResponse};
use crate::app_state::AppState;
use crate::domain::{ClaimId, TxHash, WalletAddress};
use crate::error::{EngineError, ErrorResponse};

/// `POST /purchases` — Track a bridged claim-token purchase.
///
/// # Errors
///
/// Returns [`EngineError`] on malformed wallet or hash, or a zero quantity.
#[utoipa::path(
    post,
    path = "/api/v1/purchases",
    tag = "Purchases",
    summary = "Submit a purchase for tracking",
    description = "Records a purchase submitted on a source chain. The poll task advances it until the destination mint is reconciled or it fails.",
    request_body = SubmitPurchaseRequest,
    responses(
        (status = 202, description = "Purchase tracked", body = SubmitPurchaseResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
    )
)]
pub async fn submit_purchase(
    State(state): State<AppState>,
    Json(req): Json<SubmitPurchaseRequest>,
) -> Result<impl IntoResponse, EngineError> {
    if req.quantity == 0 {
        return Err(EngineError::InvalidRequest(
            "purchase quantity must be positive".to_string(),
        ));
    }
    let backer_wallet = WalletAddress::parse(&req.backer_wallet)?;
    let source_tx_hash = TxHash::parse(&req.source_tx_hash)?;
    let pending_tx_id = state
        .orchestrator
        .submit(
            backer_wallet,
            req.backer_email,
            ClaimId(req.claim_id),
            req.quantity,
            state.active_season,
            req.source_chain_id,
            source_tx_hash,
        )
        .await;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitPurchaseResponse {
            pending_tx_id,
            state: "submitted".to_string(),
        }),
    ))
}

/// `GET /purchases/{id}` — Pending transaction status.
///
/// # Errors
///
/// Returns [`EngineError::PendingTxNotFound`] for an unknown id.
#[utoipa::path(
    get,
    path = "/api/v1/purchases/{id}",
    tag = "Purchases",
    summary = "Get purchase status",
    params(
        ("id" = Uuid, Path, description = "Pending transaction id"),
    ),
    responses(
        (status = 200, description = "Pending transaction state", body = PendingTxResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse),
    )
)]
pub async fn purchase_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, EngineError> {
    let tx = state.ledger.pending_tx(id).await?;
    Ok(Json(PendingTxResponse {
        id: tx.id,
        state: tx.state.as_str().to_string(),
        dest_tx_hash: tx.dest_tx_hash.map(|h| h.as_str().to_string()),
    }))
}

/// Purchase routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/purchases", post(submit_purchase))
        .route("/purchases/{id}", get(purchase_status))
}
