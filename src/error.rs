//! Engine error types with HTTP status code mapping.
//!
//! [`EngineError`] is the central error type for the settlement engine. Each
//! variant maps to a specific HTTP status code and structured JSON error
//! response. The variants follow the engine's error taxonomy: precondition
//! errors (bad input, unknown entities), invariant violations (double
//! crediting, double distribution), transient chain failures (retried with
//! backoff, then surfaced for scheduler-level retry), and terminal on-chain
//! failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ids::{BuilderId, ClaimId, Week};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2102,
///     "message": "points already distributed for builder .. week 2026-W08",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                |
/// |-----------|---------------------|----------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request            |
/// | 2000–2099 | Not Found           | 404 Not Found              |
/// | 2100–2199 | Invariant Violation | 409 Conflict               |
/// | 3000–3999 | Server / Upstream   | 500 / 502                  |
/// | 4000–4999 | Claim / Chain Final | 422 Unprocessable Entity   |
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Builder is not registered in the ledger.
    #[error("unknown builder: {0}")]
    UnknownBuilder(BuilderId),

    /// Claim-token id does not map to any registered builder.
    #[error("unknown claim id: {0}")]
    UnknownClaim(ClaimId),

    /// Payout tree with the given id was not found.
    #[error("payout tree not found: {0}")]
    TreeNotFound(uuid::Uuid),

    /// Pending transaction with the given id was not found.
    #[error("pending transaction not found: {0}")]
    PendingTxNotFound(uuid::Uuid),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Wallet address failed validation.
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// Points distribution requires a gem receipt for the builder-week.
    #[error("no gem receipt for builder {builder} week {week}")]
    MissingGemReceipt {
        /// Builder whose receipt is missing.
        builder: BuilderId,
        /// Week of the attempted distribution.
        week: Week,
    },

    /// Points were already distributed for this builder-week and the prior
    /// receipts have not been voided.
    #[error("points already distributed for builder {builder} week {week}")]
    AlreadyDistributed {
        /// Builder with live receipts.
        builder: BuilderId,
        /// Week with live receipts.
        week: Week,
    },

    /// The payout leaf was already claimed.
    #[error("already claimed: {0}")]
    AlreadyClaimed(String),

    /// Pending transaction state machine rejected the transition.
    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// Recipient has no leaf in the tree, or is otherwise not eligible.
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// The payout tree has passed its claim deadline.
    #[error("payout tree expired: {0}")]
    TreeExpired(uuid::Uuid),

    /// Transient chain RPC failure (timeout, rate limit, transport).
    #[error("chain rpc error: {0}")]
    ChainError(String),

    /// The chain reported a reverted or otherwise terminally failed call.
    #[error("chain call reverted: {0}")]
    ChainReverted(String),

    /// Notification collaborator failure.
    #[error("notification error: {0}")]
    NotifyError(String),

    /// Artifact store failure.
    #[error("artifact store error: {0}")]
    ArtifactError(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::MalformedAddress(_) => 1002,
            Self::UnknownBuilder(_) => 2001,
            Self::UnknownClaim(_) => 2002,
            Self::TreeNotFound(_) => 2003,
            Self::PendingTxNotFound(_) => 2004,
            Self::MissingGemReceipt { .. } => 2101,
            Self::AlreadyDistributed { .. } => 2102,
            Self::AlreadyClaimed(_) => 2103,
            Self::IllegalTransition { .. } => 2104,
            Self::NotEligible(_) => 4001,
            Self::TreeExpired(_) => 4002,
            Self::ChainReverted(_) => 4003,
            Self::ChainError(_) => 3002,
            Self::NotifyError(_) => 3003,
            Self::ArtifactError(_) => 3004,
            Self::PersistenceError(_) => 3001,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MalformedAddress(_) => StatusCode::BAD_REQUEST,
            Self::UnknownBuilder(_)
            | Self::UnknownClaim(_)
            | Self::TreeNotFound(_)
            | Self::PendingTxNotFound(_) => StatusCode::NOT_FOUND,
            Self::MissingGemReceipt { .. }
            | Self::AlreadyDistributed { .. }
            | Self::AlreadyClaimed(_)
            | Self::IllegalTransition { .. } => StatusCode::CONFLICT,
            Self::NotEligible(_) | Self::TreeExpired(_) | Self::ChainReverted(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ChainError(_) => StatusCode::BAD_GATEWAY,
            Self::NotifyError(_)
            | Self::ArtifactError(_)
            | Self::PersistenceError(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for transient failures worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ChainError(_))
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violations_map_to_conflict() {
        let err = EngineError::AlreadyDistributed {
            builder: BuilderId::new(),
            week: Week::new(2026, 8),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), 2102);
    }

    #[test]
    fn transient_chain_errors_are_bad_gateway() {
        let err = EngineError::ChainError("timeout".to_string());
        assert!(err.is_transient());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn reverted_calls_are_not_transient() {
        let err = EngineError::ChainReverted("execution reverted".to_string());
        assert!(!err.is_transient());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn error_body_exposes_openapi_schema() {
        use utoipa::PartialSchema;
        let _ = ErrorResponse::schema();
        let _ = ErrorBody::schema();
    }

    #[test]
    fn not_eligible_is_unprocessable() {
        let err = EngineError::NotEligible("no leaf for wallet".to_string());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_code(), 4001);
    }
}
