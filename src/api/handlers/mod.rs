//! REST endpoint handlers organized by resource.

pub mod claims;
pub mod events;
pub mod purchases;
pub mod system;
pub mod tasks;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(events::routes())
        .merge(tasks::routes())
        .merge(claims::routes())
        .merge(purchases::routes())
}
