pub mod health;
pub mod matches;
pub mod offers;
pub mod presence;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /presence                       start (POST), get (GET), end (DELETE)
/// /presence/nearby                discovery (GET)
///
/// /offers                         create (POST)
/// /offers/inbox                   pending offers to the caller (GET)
/// /offers/outgoing                pending offers from the caller (GET)
/// /offers/{id}                    get (GET)
/// /offers/{id}/respond            accept or decline (POST)
/// /offers/{id}/cancel             withdraw (POST)
///
/// /matches/active                 caller's active match (GET)
/// /matches/{id}                   get (GET)
/// /matches/{id}/places            candidate places (GET)
/// /matches/{id}/place-choice      set place choice (POST)
/// /matches/{id}/status            update own progress (POST)
/// /matches/{id}/cancel            cancel (POST)
/// /matches/{id}/confirm           did-you-meet answer (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/presence", presence::router())
        .nest("/offers", offers::router())
        .nest("/matches", matches::router())
}
