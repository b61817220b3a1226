//! Handlers for presence sessions and nearby discovery.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rendezvous_engine::presence::StartPresence;
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::RequestIdBody;
use crate::middleware::auth::{AuthUser, VerifiedUser};
use crate::response::DataResponse;
use crate::state::AppState;

/// Default page size for `GET /presence/nearby`.
const DEFAULT_NEARBY_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct StartPresenceRequest {
    #[serde(flatten)]
    pub presence: StartPresence,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub limit: Option<usize>,
}

/// POST /api/v1/presence
///
/// Start (or refresh) the caller's availability.
pub async fn start_presence(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Json(input): Json<StartPresenceRequest>,
) -> AppResult<impl IntoResponse> {
    let started = state
        .engine
        .start_presence(user.user_id, &input.presence, input.request_id.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: started })))
}

/// GET /api/v1/presence
///
/// The caller's session, or `null` when there is none.
pub async fn get_presence(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let session = state.engine.get_presence(user.user_id).await?;
    Ok(Json(DataResponse { data: session }))
}

/// DELETE /api/v1/presence?request_id=...
pub async fn end_presence(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Query(params): Query<RequestIdBody>,
) -> AppResult<impl IntoResponse> {
    let ended = state
        .engine
        .end_presence(user.user_id, params.request_id.as_deref())
        .await?;
    Ok(Json(DataResponse { data: ended }))
}

/// GET /api/v1/presence/nearby?limit=N
///
/// Available users with the caller's activity, least exposed first.
pub async fn nearby(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<NearbyQuery>,
) -> AppResult<impl IntoResponse> {
    let users = state
        .engine
        .nearby_users(user.user_id, params.limit.unwrap_or(DEFAULT_NEARBY_LIMIT))
        .await?;
    Ok(Json(DataResponse { data: users }))
}
