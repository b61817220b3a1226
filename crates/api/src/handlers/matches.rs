//! Handlers for matches: place negotiation, progress, cancellation and
//! post-hoc meeting confirmation.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use rendezvous_core::confirmation::MeetingResponse;
use rendezvous_core::matching::{CancelReason, UserMatchStatus};
use rendezvous_core::types::DbId;
use rendezvous_engine::negotiation::PlaceChoiceInput;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::{AuthUser, VerifiedUser};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceChoiceRequest {
    pub choice: PlaceChoiceInput,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelMatchRequest {
    #[serde(default)]
    pub reason: Option<CancelReason>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: UserMatchStatus,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub response: MeetingResponse,
    #[serde(default)]
    pub request_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/matches/active
///
/// The caller's active match, or `null`.
pub async fn get_active(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let active = state.engine.get_active_match(user.user_id).await?;
    Ok(Json(DataResponse { data: active }))
}

/// GET /api/v1/matches/{id}
pub async fn get_match(
    user: AuthUser,
    State(state): State<AppState>,
    Path(match_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let m = state.engine.get_match(user.user_id, match_id).await?;
    Ok(Json(DataResponse { data: m }))
}

/// GET /api/v1/matches/{id}/places
///
/// The first call on a pending match runs the place search and opens the
/// decision window, so this requires a verified user like other mutations.
pub async fn places(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Path(match_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let candidates = state
        .engine
        .fetch_candidate_places(user.user_id, match_id)
        .await?;
    Ok(Json(DataResponse { data: candidates }))
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// POST /api/v1/matches/{id}/place-choice
pub async fn place_choice(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Path(match_id): Path<DbId>,
    Json(input): Json<PlaceChoiceRequest>,
) -> AppResult<impl IntoResponse> {
    let result = state
        .engine
        .set_place_choice(
            user.user_id,
            match_id,
            &input.choice,
            input.request_id.as_deref(),
        )
        .await?;
    Ok(Json(DataResponse { data: result }))
}

/// POST /api/v1/matches/{id}/cancel
///
/// The body is optional; the reason defaults to `user_cancelled`.
pub async fn cancel(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Path(match_id): Path<DbId>,
    body: Option<Json<CancelMatchRequest>>,
) -> AppResult<impl IntoResponse> {
    let input = body.map(|Json(b)| b).unwrap_or_default();
    let update = state
        .engine
        .cancel_match(
            user.user_id,
            match_id,
            input.reason,
            input.request_id.as_deref(),
        )
        .await?;
    Ok(Json(DataResponse { data: update }))
}

/// POST /api/v1/matches/{id}/status
pub async fn update_status(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Path(match_id): Path<DbId>,
    Json(input): Json<StatusRequest>,
) -> AppResult<impl IntoResponse> {
    let update = state
        .engine
        .update_match_status(
            user.user_id,
            match_id,
            input.status,
            input.request_id.as_deref(),
        )
        .await?;
    Ok(Json(DataResponse { data: update }))
}

/// POST /api/v1/matches/{id}/confirm
pub async fn confirm(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Path(match_id): Path<DbId>,
    Json(input): Json<ConfirmRequest>,
) -> AppResult<impl IntoResponse> {
    let update = state
        .engine
        .confirm_meeting(
            user.user_id,
            match_id,
            input.response,
            input.request_id.as_deref(),
        )
        .await?;
    Ok(Json(DataResponse { data: update }))
}
