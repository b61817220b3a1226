//! Route definitions for offers, mounted at `/offers`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::offers;
use crate::state::AppState;

/// ```text
/// POST /              -> create_offer
/// GET  /inbox         -> inbox
/// GET  /outgoing      -> outgoing
/// GET  /{id}          -> get_offer
/// POST /{id}/respond  -> respond
/// POST /{id}/cancel   -> cancel
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(offers::create_offer))
        .route("/inbox", get(offers::inbox))
        .route("/outgoing", get(offers::outgoing))
        .route("/{id}", get(offers::get_offer))
        .route("/{id}/respond", post(offers::respond))
        .route("/{id}/cancel", post(offers::cancel))
}
