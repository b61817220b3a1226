//! Meeting confirmation for matches whose presences lapsed mid-meetup.

use chrono::Utc;
use rendezvous_core::confirmation::{both_answered, resolve, snapshot, MeetingResponse};
use rendezvous_core::error::CoreError;
use rendezvous_core::matching::MatchStatus;
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::matches::{Match, Side};
use rendezvous_db::repositories::MatchRepo;
use rendezvous_events::event_types;
use sqlx::PgConnection;

use crate::error::EngineResult;
use crate::idempotency::operations;
use crate::matches::{load_for_participant, record_completion_in_tx, MatchUpdate};
use crate::Engine;

impl Engine {
    /// Move a lapsing match into `expired_pending_confirmation`. Users who
    /// already reported `completed` count as having answered `met`.
    pub(crate) async fn begin_confirmation_in_tx(
        &self,
        conn: &mut PgConnection,
        m: &Match,
        now: Timestamp,
    ) -> EngineResult<Match> {
        let snap = snapshot(m.user_a, m.user_a_status, m.user_b, m.user_b_status);
        let updated = MatchRepo::begin_confirmation(
            &mut *conn,
            m.id,
            &snap.pending,
            snap.user_a_response,
            snap.user_b_response,
            now + self.config.confirmation_window,
        )
        .await?
        .ok_or_else(|| {
            CoreError::FailedPrecondition(format!("Match {} changed concurrently", m.id))
        })?;
        tracing::info!(match_id = m.id, pending = ?snap.pending, "Meeting confirmation requested");
        Ok(updated)
    }

    /// Close a confirmation once both answers are known.
    pub(crate) async fn finish_confirmation_in_tx(
        &self,
        conn: &mut PgConnection,
        m: &Match,
        a: MeetingResponse,
        b: MeetingResponse,
        now: Timestamp,
    ) -> EngineResult<Match> {
        let (status, outcome) = resolve(a, b);
        let resolved = MatchRepo::resolve_confirmation(&mut *conn, m.id, status, outcome.as_str(), now)
            .await?
            .ok_or_else(|| {
                CoreError::FailedPrecondition(format!("Match {} changed concurrently", m.id))
            })?;
        if status == MatchStatus::Completed {
            record_completion_in_tx(&mut *conn, &resolved).await?;
        }
        tracing::info!(match_id = m.id, status = %status, outcome = outcome.as_str(), "Meeting confirmation resolved");
        Ok(resolved)
    }

    /// Record whether the caller actually met the other participant.
    ///
    /// Answering twice, or answering after resolution, is a no-op.
    pub async fn confirm_meeting(
        &self,
        user_id: DbId,
        match_id: DbId,
        response: MeetingResponse,
        request_id: Option<&str>,
    ) -> EngineResult<MatchUpdate> {
        self.with_lock(user_id, operations::MATCH_CONFIRM, request_id, || {
            self.with_serializable_retry("match.confirm", || {
                self.confirm_attempt(user_id, match_id, response)
            })
        })
        .await
    }

    async fn confirm_attempt(
        &self,
        user_id: DbId,
        match_id: DbId,
        response: MeetingResponse,
    ) -> EngineResult<MatchUpdate> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let (m, side) = load_for_participant(&mut *tx, user_id, match_id).await?;

        if m.status.is_terminal() || m.confirmation(side).is_some() {
            tx.commit().await?;
            return Ok(MatchUpdate::from(&m));
        }
        if m.status != MatchStatus::ExpiredPendingConfirmation {
            return Err(CoreError::FailedPrecondition(format!(
                "Match is {}, not awaiting confirmation",
                m.status
            ))
            .into());
        }

        let answered = MatchRepo::record_confirmation(&mut *tx, m.id, side, user_id, response)
            .await?
            .ok_or_else(|| {
                CoreError::FailedPrecondition(format!("Match {match_id} changed concurrently"))
            })?;
        tracing::info!(match_id, user_id, response = response.as_str(), "Meeting confirmation recorded");

        let both = both_answered(answered.confirmation(Side::A), answered.confirmation(Side::B));
        let Some((a, b)) = both else {
            tx.commit().await?;
            return Ok(MatchUpdate::from(&answered));
        };

        let resolved = self
            .finish_confirmation_in_tx(&mut *tx, &answered, a, b, now)
            .await?;
        tx.commit().await?;
        self.after_match_closed(&resolved, event_types::MATCH_RESOLVED, None)
            .await;
        Ok(MatchUpdate::from(&resolved))
    }
}
