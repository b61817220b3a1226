//! Handlers for directed offers between present users.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rendezvous_core::offer::OfferResponse;
use rendezvous_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::RequestIdBody;
use crate::middleware::auth::{AuthUser, VerifiedUser};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub to_user_id: DbId,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response: OfferResponse,
    #[serde(default)]
    pub request_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// POST /api/v1/offers
///
/// Send an offer. When the target already offered to the caller, the match
/// is created immediately and its id is returned alongside the offer.
pub async fn create_offer(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Json(input): Json<CreateOfferRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state
        .engine
        .create_offer(user.user_id, input.to_user_id, input.request_id.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// POST /api/v1/offers/{id}/respond
pub async fn respond(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Path(offer_id): Path<DbId>,
    Json(input): Json<RespondRequest>,
) -> AppResult<impl IntoResponse> {
    let responded = state
        .engine
        .respond_to_offer(
            user.user_id,
            offer_id,
            input.response,
            input.request_id.as_deref(),
        )
        .await?;
    Ok(Json(DataResponse { data: responded }))
}

/// POST /api/v1/offers/{id}/cancel
///
/// The body is optional.
pub async fn cancel(
    VerifiedUser(user): VerifiedUser,
    State(state): State<AppState>,
    Path(offer_id): Path<DbId>,
    body: Option<Json<RequestIdBody>>,
) -> AppResult<impl IntoResponse> {
    let request_id = body.and_then(|Json(b)| b.request_id);
    let cancelled = state
        .engine
        .cancel_offer(user.user_id, offer_id, request_id.as_deref())
        .await?;
    Ok(Json(DataResponse { data: cancelled }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/offers/inbox
pub async fn inbox(user: AuthUser, State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let offers = state.engine.list_inbox(user.user_id).await?;
    Ok(Json(DataResponse { data: offers }))
}

/// GET /api/v1/offers/outgoing
pub async fn outgoing(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let offers = state.engine.list_outgoing(user.user_id).await?;
    Ok(Json(DataResponse { data: offers }))
}

/// GET /api/v1/offers/{id}
pub async fn get_offer(
    user: AuthUser,
    State(state): State<AppState>,
    Path(offer_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let offer = state.engine.get_offer(user.user_id, offer_id).await?;
    Ok(Json(DataResponse { data: offer }))
}
