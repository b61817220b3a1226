use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when every dependency is up, `degraded` otherwise.
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the database answered a ping.
    pub db_healthy: bool,
    /// Push routers listening on the event bus. Zero means match and offer
    /// notifications are being dropped.
    pub push_subscribers: usize,
}

/// GET /health -- database reachability and push routing status.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = rendezvous_db::health_check(&state.pool).await.is_ok();
    let push_subscribers = state.engine.events().subscriber_count();

    let status = if db_healthy && push_subscribers > 0 {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        push_subscribers,
    })
}

/// Mount the health route at the root, outside `/api/v1` and its auth.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
