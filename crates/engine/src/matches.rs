//! Match state machine: reads, per-user progress, and cancellation.
//!
//! ```text
//! pending -> location_deciding -> place_confirmed -> heading_there -> arrived -> completed
//!    \______________\___________________\________________\______________\-> cancelled
//!                      place_confirmed | heading_there | arrived -> expired_pending_confirmation
//! ```

use chrono::Utc;
use rendezvous_core::error::CoreError;
use rendezvous_core::matching::{
    cancellation_penalty, is_severe_cancellation, promote, validate_progress, CancelReason,
    MatchStatus, PenaltyInput, UserMatchStatus,
};
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::matches::{Cancellation, Match, Side};
use rendezvous_db::repositories::{MatchRepo, OfferRepo, PresenceRepo, ReliabilityRepo};
use rendezvous_events::event_types;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::error::EngineResult;
use crate::idempotency::operations;
use crate::Engine;

/// Minimal result of a match mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub match_id: DbId,
    pub status: MatchStatus,
}

impl From<&Match> for MatchUpdate {
    fn from(m: &Match) -> Self {
        Self {
            match_id: m.id,
            status: m.status,
        }
    }
}

/// Load a match and the caller's side of it.
pub(crate) async fn load_for_participant(
    conn: &mut PgConnection,
    user_id: DbId,
    match_id: DbId,
) -> EngineResult<(Match, Side)> {
    let m = MatchRepo::find_by_id(&mut *conn, match_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "match",
            id: match_id,
        })?;
    let side = m.side_of(user_id).ok_or_else(|| {
        CoreError::Forbidden("You are not a participant in this match".to_string())
    })?;
    Ok((m, side))
}

/// Hand both presences back: `available` with their original expiry, or
/// deleted if that expiry has passed. Sessions no longer linked to the match
/// are left alone.
pub(crate) async fn restore_presences_in_tx(
    conn: &mut PgConnection,
    m: &Match,
    now: Timestamp,
) -> EngineResult<()> {
    for user_id in [m.user_a, m.user_b] {
        if !PresenceRepo::restore_available(&mut *conn, user_id, m.id, now).await? {
            PresenceRepo::delete_if_linked(&mut *conn, user_id, m.id).await?;
        }
    }
    Ok(())
}

/// Record a completed meetup for both participants.
pub(crate) async fn record_completion_in_tx(conn: &mut PgConnection, m: &Match) -> EngineResult<()> {
    for user_id in [m.user_a, m.user_b] {
        ReliabilityRepo::record_completion(&mut *conn, user_id).await?;
    }
    Ok(())
}

fn changed_concurrently(match_id: DbId) -> CoreError {
    CoreError::FailedPrecondition(format!("Match {match_id} changed while it was being updated"))
}

impl Engine {
    /// Fetch a match the caller participates in.
    pub async fn get_match(&self, user_id: DbId, match_id: DbId) -> EngineResult<Match> {
        let mut conn = self.pool.acquire().await?;
        let (m, _) = load_for_participant(&mut *conn, user_id, match_id).await?;
        Ok(m)
    }

    /// The caller's active match, if any.
    pub async fn get_active_match(&self, user_id: DbId) -> EngineResult<Option<Match>> {
        Ok(MatchRepo::find_active_for_user(&self.pool, user_id).await?)
    }

    /// Advance the caller's sub-status and promote the overall status.
    ///
    /// Re-submitting the current sub-status is a no-op.
    pub async fn update_match_status(
        &self,
        user_id: DbId,
        match_id: DbId,
        requested: UserMatchStatus,
        request_id: Option<&str>,
    ) -> EngineResult<MatchUpdate> {
        self.with_lock(user_id, operations::MATCH_STATUS, request_id, || {
            self.with_serializable_retry("match.status", || {
                self.update_status_attempt(user_id, match_id, requested)
            })
        })
        .await
    }

    async fn update_status_attempt(
        &self,
        user_id: DbId,
        match_id: DbId,
        requested: UserMatchStatus,
    ) -> EngineResult<MatchUpdate> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let (m, side) = load_for_participant(&mut *tx, user_id, match_id).await?;

        if m.user_status(side) == requested {
            tx.commit().await?;
            return Ok(MatchUpdate::from(&m));
        }
        validate_progress(m.status, m.user_status(side), requested)
            .map_err(CoreError::FailedPrecondition)?;

        let (a, b) = match side {
            Side::A => (requested, m.user_b_status),
            Side::B => (m.user_a_status, requested),
        };
        let overall = promote(m.status, a, b);
        let updated = MatchRepo::update_progress(&mut *tx, m.id, side, requested, overall, now)
            .await?
            .ok_or_else(|| changed_concurrently(m.id))?;

        let completed = updated.status == MatchStatus::Completed;
        if completed {
            record_completion_in_tx(&mut *tx, &updated).await?;
            restore_presences_in_tx(&mut *tx, &updated, now).await?;
        }
        tx.commit().await?;

        tracing::info!(
            match_id,
            user_id,
            user_status = %requested,
            status = %updated.status,
            "Match progress updated"
        );
        if completed {
            self.after_match_closed(&updated, event_types::MATCH_COMPLETED, None)
                .await;
        }
        Ok(MatchUpdate::from(&updated))
    }

    /// Cancel a match as a participant. A terminal match is returned as-is.
    pub async fn cancel_match(
        &self,
        user_id: DbId,
        match_id: DbId,
        reason: Option<CancelReason>,
        request_id: Option<&str>,
    ) -> EngineResult<MatchUpdate> {
        let reason = reason.unwrap_or(CancelReason::UserCancelled);
        if !reason.participant_selectable() {
            return Err(CoreError::Validation(format!(
                "Cancel reason '{}' is reserved for the system",
                reason.as_str()
            ))
            .into());
        }

        self.with_lock(user_id, operations::MATCH_CANCEL, request_id, || {
            self.with_serializable_retry("match.cancel", || {
                self.cancel_match_attempt(user_id, match_id, reason)
            })
        })
        .await
    }

    async fn cancel_match_attempt(
        &self,
        user_id: DbId,
        match_id: DbId,
        reason: CancelReason,
    ) -> EngineResult<MatchUpdate> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let (m, _) = load_for_participant(&mut *tx, user_id, match_id).await?;

        if m.status.is_terminal() {
            tx.commit().await?;
            return Ok(MatchUpdate::from(&m));
        }

        let cancelled = self
            .cancel_in_tx(&mut *tx, &m, Some(user_id), reason, now)
            .await?;
        tx.commit().await?;

        self.after_match_closed(&cancelled, event_types::MATCH_CANCELLED, Some(user_id))
            .await;
        Ok(MatchUpdate::from(&cancelled))
    }

    /// Flip a non-terminal match to `cancelled` with all its side effects
    /// except guard release, which happens after commit.
    pub(crate) async fn cancel_in_tx(
        &self,
        conn: &mut PgConnection,
        m: &Match,
        cancelled_by: Option<DbId>,
        reason: CancelReason,
        now: Timestamp,
    ) -> EngineResult<Match> {
        let (severe, penalty) = match cancelled_by.and_then(|u| m.side_of(u)) {
            Some(side) => {
                let severe = is_severe_cancellation(m.user_status(side.other()));
                let penalty = cancellation_penalty(&PenaltyInput {
                    reason,
                    severe,
                    match_created_at: m.created_at,
                    cancelled_at: now,
                    grace: self.config.cancel_grace,
                    base_penalty: self.config.base_cancel_penalty,
                });
                (severe, penalty)
            }
            None => (false, 0),
        };

        let cancelled = MatchRepo::cancel(
            &mut *conn,
            m.id,
            &Cancellation {
                cancelled_by,
                reason: reason.as_str(),
                severe,
                penalty,
                at: now,
            },
        )
        .await?
        .ok_or_else(|| changed_concurrently(m.id))?;

        OfferRepo::cancel_accepted_for_match(&mut *conn, m.id).await?;
        restore_presences_in_tx(&mut *conn, &cancelled, now).await?;
        if let Some(user_id) = cancelled_by {
            ReliabilityRepo::record_cancellation(&mut *conn, user_id, severe, penalty).await?;
        }

        tracing::info!(
            match_id = m.id,
            cancelled_by,
            reason = reason.as_str(),
            severe,
            penalty,
            "Match cancelled"
        );
        Ok(cancelled)
    }

    /// Post-commit work for a match that just reached a terminal state.
    pub(crate) async fn after_match_closed(&self, m: &Match, event_type: &str, actor: Option<DbId>) {
        self.release_guard(m).await;
        self.notify_match(event_type, m, actor);
    }
}
