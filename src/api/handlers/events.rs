//! Ingest handlers: contribution events, builder registration, partner
//! rewards.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{
    ContributionEventRequest, IngestResponse, PartnerRewardRequest, RegisterBuilderRequest,
    RegisterBuilderResponse, StatusResponse,
};
use crate::app_state::AppState;
use crate::domain::{BuilderAccount, BuilderId, ClaimId, ContributionEvent, Season, WalletAddress};
use crate::error::{EngineError, ErrorResponse};

/// `POST /events/contributions` — Ingest one classifier event.
///
/// # Errors
///
/// Returns [`EngineError`] on a malformed week key or unknown builder.
#[utoipa::path(
    post,
    path = "/api/v1/events/contributions",
    tag = "Events",
    summary = "Ingest a contribution event",
    description = "Appends one classifier-scored contribution event to the ledger. Replaying an event id is a no-op.",
    request_body = ContributionEventRequest,
    responses(
        (status = 200, description = "Event ingested (or already present)", body = IngestResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 404, description = "Unknown builder", body = ErrorResponse),
    )
)]
pub async fn ingest_contribution(
    State(state): State<AppState>,
    Json(req): Json<ContributionEventRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let event = ContributionEvent {
        id: req.id,
        builder_id: BuilderId::from_uuid(req.builder_id),
        kind: req.kind,
        week: req.week.parse()?,
        season: Season(req.season),
        gems_awarded: req.gems_awarded,
        created_at: Utc::now(),
    };
    let inserted = state.ingestor.ingest(event).await?;
    Ok(Json(IngestResponse {
        event_id: req.id,
        inserted,
    }))
}

/// `POST /builders` — Register a builder account.
///
/// # Errors
///
/// Returns [`EngineError`] on a malformed wallet or duplicate registration.
#[utoipa::path(
    post,
    path = "/api/v1/builders",
    tag = "Events",
    summary = "Register a builder",
    description = "Registers a builder account with its payout wallet and claim-token mapping.",
    request_body = RegisterBuilderRequest,
    responses(
        (status = 201, description = "Builder registered", body = RegisterBuilderResponse),
        (status = 400, description = "Malformed request or duplicate", body = ErrorResponse),
    )
)]
pub async fn register_builder(
    State(state): State<AppState>,
    Json(req): Json<RegisterBuilderRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let account = BuilderAccount {
        id: BuilderId::new(),
        wallet: WalletAddress::parse(&req.wallet)?,
        claim_id: ClaimId(req.claim_id),
        season: Season(req.season),
        email: req.email,
        registered_at: Utc::now(),
    };
    let response = RegisterBuilderResponse {
        builder_id: *account.id.as_uuid(),
        claim_id: req.claim_id,
        registered_at: account.registered_at,
    };
    state.ingestor.register_builder(account).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /partners/rewards` — Credit a partner-sponsored reward.
///
/// # Errors
///
/// Returns [`EngineError`] on a malformed wallet or zero amount.
#[utoipa::path(
    post,
    path = "/api/v1/partners/rewards",
    tag = "Events",
    summary = "Credit a partner reward",
    description = "Credits a sponsor-funded reward to a wallet, scoped to the partner's own payout cohort.",
    request_body = PartnerRewardRequest,
    responses(
        (status = 200, description = "Reward credited", body = StatusResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
    )
)]
pub async fn credit_partner_reward(
    State(state): State<AppState>,
    Json(req): Json<PartnerRewardRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let wallet = WalletAddress::parse(&req.wallet)?;
    state
        .ingestor
        .credit_partner_reward(&req.partner_id, Season(req.season), wallet, req.amount)
        .await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

/// Ingest routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/contributions", post(ingest_contribution))
        .route("/builders", post(register_builder))
        .route("/partners/rewards", post(credit_partner_reward))
}
