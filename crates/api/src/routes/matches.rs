//! Route definitions for matches, mounted at `/matches`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::matches;
use crate::state::AppState;

/// ```text
/// GET  /active             -> get_active
/// GET  /{id}               -> get_match
/// GET  /{id}/places        -> places
/// POST /{id}/place-choice  -> place_choice
/// POST /{id}/status        -> update_status
/// POST /{id}/cancel        -> cancel
/// POST /{id}/confirm       -> confirm
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/active", get(matches::get_active))
        .route("/{id}", get(matches::get_match))
        .route("/{id}/places", get(matches::places))
        .route("/{id}/place-choice", post(matches::place_choice))
        .route("/{id}/status", post(matches::update_status))
        .route("/{id}/cancel", post(matches::cancel))
        .route("/{id}/confirm", post(matches::confirm))
}
