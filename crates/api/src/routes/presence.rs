//! Route definitions for presence sessions, mounted at `/presence`.

use axum::routing::get;
use axum::Router;

use crate::handlers::presence;
use crate::state::AppState;

/// ```text
/// POST   /        -> start_presence
/// GET    /        -> get_presence
/// DELETE /        -> end_presence
/// GET    /nearby  -> nearby
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(presence::get_presence)
                .post(presence::start_presence)
                .delete(presence::end_presence),
        )
        .route("/nearby", get(presence::nearby))
}
