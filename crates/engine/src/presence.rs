//! Presence lifecycle: start, read, end.
//!
//! Expiry handling lives in [`crate::sweeps`].

use chrono::Utc;
use rendezvous_core::error::CoreError;
use rendezvous_core::geo::{validate_location, GeoPoint};
use rendezvous_core::offer::OfferStatus;
use rendezvous_core::presence::{
    decide_start, session_expiry, start_rate_limited, validate_activity, validate_duration,
    PresenceStatus, StartDecision,
};
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::presence::{NewPresence, PresenceSession};
use rendezvous_db::repositories::{MatchRepo, OfferRepo, PresenceRepo, PresenceStartRepo};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::idempotency::operations;
use crate::Engine;

/// Input to [`Engine::start_presence`].
#[derive(Debug, Clone, Deserialize)]
pub struct StartPresence {
    pub activity: String,
    pub duration_mins: i32,
    pub lat: f64,
    pub lng: f64,
}

/// Minimal result of a presence start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStarted {
    pub user_id: DbId,
    pub session_id: Uuid,
    pub expires_at: Timestamp,
}

impl From<&PresenceSession> for PresenceStarted {
    fn from(session: &PresenceSession) -> Self {
        Self {
            user_id: session.user_id,
            session_id: session.session_id,
            expires_at: session.expires_at,
        }
    }
}

/// Minimal result of a presence end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEnded {
    /// `false` when there was no session to end.
    pub ended: bool,
    pub cancelled_offers: usize,
}

impl Engine {
    /// Start (or replace) the caller's presence session.
    ///
    /// A live session with the same activity is returned unchanged. A live
    /// session with a different activity must be ended first.
    pub async fn start_presence(
        &self,
        user_id: DbId,
        input: &StartPresence,
        request_id: Option<&str>,
    ) -> EngineResult<PresenceStarted> {
        let activity = validate_activity(&input.activity).map_err(CoreError::Validation)?;
        validate_duration(input.duration_mins).map_err(CoreError::Validation)?;
        let location = GeoPoint::new(input.lat, input.lng);
        validate_location(&location, &self.config.region).map_err(CoreError::Validation)?;

        self.with_lock(user_id, operations::PRESENCE_START, request_id, || {
            self.with_serializable_retry("presence.start", || {
                self.start_presence_attempt(user_id, &activity, input.duration_mins, location)
            })
        })
        .await
    }

    async fn start_presence_attempt(
        &self,
        user_id: DbId,
        activity: &str,
        duration_mins: i32,
        location: GeoPoint,
    ) -> EngineResult<PresenceStarted> {
        let now = Utc::now();
        let mut tx = self.begin().await?;

        let existing = PresenceRepo::find(&mut *tx, user_id).await?;
        let decision = decide_start(
            existing.as_ref().map(PresenceSession::as_existing),
            activity,
            now,
        );
        match (decision, existing.as_ref()) {
            (StartDecision::ReturnExisting, Some(session)) => {
                tx.commit().await?;
                return Ok(PresenceStarted::from(session));
            }
            (StartDecision::ActivityConflict, Some(session)) => {
                return Err(CoreError::FailedPrecondition(format!(
                    "Already present for '{}'; end that presence before starting '{activity}'",
                    session.activity
                ))
                .into());
            }
            (StartDecision::AwaitingReconciliation, _) => {
                return Err(CoreError::FailedPrecondition(
                    "Previous presence is still linked to a match being wrapped up".to_string(),
                )
                .into());
            }
            _ => {}
        }

        let starts =
            PresenceStartRepo::count_since(&mut *tx, user_id, now - self.config.start_rate_window)
                .await?;
        if start_rate_limited(starts, self.config.max_starts_per_window) {
            return Err(CoreError::ResourceExhausted(
                "Too many presence starts; try again later".to_string(),
            )
            .into());
        }

        let session = PresenceRepo::replace(
            &mut *tx,
            &NewPresence {
                user_id,
                activity: activity.to_string(),
                duration_mins,
                location,
                expires_at: session_expiry(now, duration_mins, self.config.presence_grace),
            },
        )
        .await?;
        PresenceStartRepo::record(&mut *tx, user_id, now).await?;
        tx.commit().await?;

        tracing::info!(user_id, activity, session_id = %session.session_id, "Presence started");
        Ok(PresenceStarted::from(&session))
    }

    /// The caller's session, live or lapsed-but-not-yet-swept.
    pub async fn get_presence(&self, user_id: DbId) -> EngineResult<Option<PresenceSession>> {
        Ok(PresenceRepo::find(&self.pool, user_id).await?)
    }

    /// End the caller's presence, cancelling every pending offer they are
    /// party to. Refused while the session backs an active match.
    pub async fn end_presence(
        &self,
        user_id: DbId,
        request_id: Option<&str>,
    ) -> EngineResult<PresenceEnded> {
        self.with_lock(user_id, operations::PRESENCE_END, request_id, || {
            self.with_serializable_retry("presence.end", || self.end_presence_attempt(user_id))
        })
        .await
    }

    async fn end_presence_attempt(&self, user_id: DbId) -> EngineResult<PresenceEnded> {
        let now = Utc::now();
        let mut tx = self.begin().await?;

        let Some(session) = PresenceRepo::find(&mut *tx, user_id).await? else {
            tx.commit().await?;
            return Ok(PresenceEnded {
                ended: false,
                cancelled_offers: 0,
            });
        };

        if session.status == PresenceStatus::Matched {
            if let Some(match_id) = session.match_id {
                let linked = MatchRepo::find_by_id(&mut *tx, match_id).await?;
                if linked.is_some_and(|m| m.status.is_active()) {
                    return Err(CoreError::FailedPrecondition(
                        "Presence backs an active match; cancel the match first".to_string(),
                    )
                    .into());
                }
            }
        }

        let cancelled_offers = cancel_pending_offers_in_tx(&mut *tx, user_id, now).await?;
        PresenceRepo::delete(&mut *tx, user_id).await?;
        tx.commit().await?;

        tracing::info!(user_id, cancelled_offers, "Presence ended");
        Ok(PresenceEnded {
            ended: true,
            cancelled_offers,
        })
    }
}

/// Cancel every pending offer the user sends or receives, removing each
/// from its sender's outstanding set.
pub(crate) async fn cancel_pending_offers_in_tx(
    conn: &mut PgConnection,
    user_id: DbId,
    now: Timestamp,
) -> EngineResult<usize> {
    let offers = OfferRepo::list_pending_involving(&mut *conn, user_id).await?;
    let mut cancelled = 0;
    for offer in offers {
        if OfferRepo::finish(&mut *conn, offer.id, OfferStatus::Cancelled, None, now)
            .await?
            .is_some()
        {
            PresenceRepo::remove_outgoing_offer(&mut *conn, offer.from_user_id, offer.id).await?;
            cancelled += 1;
        }
    }
    Ok(cancelled)
}
