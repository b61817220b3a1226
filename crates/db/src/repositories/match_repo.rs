//! Repository for the `matches` table.
//!
//! Status-changing updates carry a `WHERE status ...` predicate so a write
//! based on a stale read affects no rows instead of regressing the match.

use rendezvous_core::confirmation::MeetingResponse;
use rendezvous_core::matching::{MatchStatus, UserMatchStatus, ACTIVE_STATUSES};
use rendezvous_core::place_resolution::{PlaceCandidate, PlaceChoice};
use rendezvous_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::models::matches::{Cancellation, Match, NewMatch, Side};

/// Column list for `matches` queries.
const COLUMNS: &str = "id, user_a, user_b, status, user_a_status, user_b_status, activity, \
                       place_candidates, user_a_choice, user_b_choice, confirmed_place, \
                       place_resolution_reason, decision_deadline, cancelled_by, cancel_reason, \
                       cancel_severe, cancel_penalty, cancelled_at, user_a_confirmation, \
                       user_b_confirmation, confirmation_pending, confirmation_deadline, outcome, \
                       completed_at, created_at, updated_at";

/// Provides data access for matches. Rows are never deleted.
pub struct MatchRepo;

impl MatchRepo {
    /// Insert a new `pending` match. `user_low < user_high` is enforced by a
    /// table constraint.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewMatch,
    ) -> Result<Match, sqlx::Error> {
        let query = format!(
            "INSERT INTO matches (user_a, user_b, activity) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(input.user_low)
            .bind(input.user_high)
            .bind(&input.activity)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<Match>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM matches WHERE id = $1");
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// The user's active match, if any.
    pub async fn find_active_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<Option<Match>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM matches \
             WHERE (user_a = $1 OR user_b = $1) AND status = ANY($2) \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(user_id)
            .bind(&ACTIVE_STATUSES[..])
            .fetch_optional(executor)
            .await
    }

    // -----------------------------------------------------------------------
    // Place negotiation
    // -----------------------------------------------------------------------

    /// Store the candidate list and move a `pending` match into
    /// `location_deciding`.
    pub async fn begin_location_decision<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        candidates: &[PlaceCandidate],
        decision_deadline: Timestamp,
    ) -> Result<Option<Match>, sqlx::Error> {
        let query = format!(
            "UPDATE matches SET status = 'location_deciding', place_candidates = $2, \
                decision_deadline = $3 \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(Json(candidates))
            .bind(decision_deadline)
            .fetch_optional(executor)
            .await
    }

    /// Record one participant's place choice, optionally replacing the
    /// candidate list (when a custom place was merged in).
    pub async fn set_choice<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        side: Side,
        choice: &PlaceChoice,
        candidates: &[PlaceCandidate],
    ) -> Result<Option<Match>, sqlx::Error> {
        let column = format!("{}_choice", side.prefix());
        let query = format!(
            "UPDATE matches SET {column} = $2, place_candidates = $3 \
             WHERE id = $1 AND status = 'location_deciding' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(Json(choice))
            .bind(Json(candidates))
            .fetch_optional(executor)
            .await
    }

    /// Write the resolved place and advance to `place_confirmed`.
    pub async fn confirm_place<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        place: &PlaceCandidate,
        reason: &str,
    ) -> Result<Option<Match>, sqlx::Error> {
        let query = format!(
            "UPDATE matches SET status = 'place_confirmed', confirmed_place = $2, \
                place_resolution_reason = $3 \
             WHERE id = $1 AND status = 'location_deciding' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(Json(place))
            .bind(reason)
            .fetch_optional(executor)
            .await
    }

    /// Matches in `location_deciding` past their decision deadline.
    pub async fn list_decision_expired<'e, E: PgExecutor<'e>>(
        executor: E,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Match>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM matches \
             WHERE status = 'location_deciding' AND decision_deadline <= $1 \
             ORDER BY decision_deadline ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    // -----------------------------------------------------------------------
    // Progress and termination
    // -----------------------------------------------------------------------

    /// Write one participant's sub-status together with the recomputed
    /// overall status.
    pub async fn update_progress<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        side: Side,
        user_status: UserMatchStatus,
        overall: MatchStatus,
        now: Timestamp,
    ) -> Result<Option<Match>, sqlx::Error> {
        let column = format!("{}_status", side.prefix());
        let query = format!(
            "UPDATE matches SET {column} = $2, status = $3, \
                completed_at = CASE WHEN $3 = 'completed' THEN $4 ELSE completed_at END \
             WHERE id = $1 AND status IN ('place_confirmed', 'heading_there', 'arrived') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(user_status.as_str())
            .bind(overall.as_str())
            .bind(now)
            .fetch_optional(executor)
            .await
    }

    /// Flip a non-terminal match to `cancelled`.
    pub async fn cancel<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        cancellation: &Cancellation<'_>,
    ) -> Result<Option<Match>, sqlx::Error> {
        let query = format!(
            "UPDATE matches SET status = 'cancelled', cancelled_by = $2, cancel_reason = $3, \
                cancel_severe = $4, cancel_penalty = $5, cancelled_at = $6 \
             WHERE id = $1 AND status NOT IN ('completed', 'cancelled') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(cancellation.cancelled_by)
            .bind(cancellation.reason)
            .bind(cancellation.severe)
            .bind(cancellation.penalty)
            .bind(cancellation.at)
            .fetch_optional(executor)
            .await
    }

    /// Matches still `pending` that were created before `created_before`.
    pub async fn list_stale_pending<'e, E: PgExecutor<'e>>(
        executor: E,
        created_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<Match>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM matches \
             WHERE status = 'pending' AND created_at <= $1 \
             ORDER BY created_at ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(created_before)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    // -----------------------------------------------------------------------
    // Meeting confirmation
    // -----------------------------------------------------------------------

    /// Move a lapsing match into `expired_pending_confirmation`.
    pub async fn begin_confirmation<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        pending: &[DbId],
        user_a_response: Option<MeetingResponse>,
        user_b_response: Option<MeetingResponse>,
        deadline: Timestamp,
    ) -> Result<Option<Match>, sqlx::Error> {
        let query = format!(
            "UPDATE matches SET status = 'expired_pending_confirmation', \
                confirmation_pending = $2, user_a_confirmation = $3, user_b_confirmation = $4, \
                confirmation_deadline = $5 \
             WHERE id = $1 AND status IN ('place_confirmed', 'heading_there', 'arrived') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(pending)
            .bind(user_a_response.map(MeetingResponse::as_str))
            .bind(user_b_response.map(MeetingResponse::as_str))
            .bind(deadline)
            .fetch_optional(executor)
            .await
    }

    /// Record one participant's answer and drop them from the pending list.
    pub async fn record_confirmation<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        side: Side,
        user_id: DbId,
        response: MeetingResponse,
    ) -> Result<Option<Match>, sqlx::Error> {
        let column = format!("{}_confirmation", side.prefix());
        let query = format!(
            "UPDATE matches SET {column} = $2, \
                confirmation_pending = array_remove(confirmation_pending, $3) \
             WHERE id = $1 AND status = 'expired_pending_confirmation' AND {column} IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(response.as_str())
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Close a match in confirmation with its final status and outcome.
    ///
    /// Unanswered slots are filled with `dismissed`.
    pub async fn resolve_confirmation<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        status: MatchStatus,
        outcome: &str,
        now: Timestamp,
    ) -> Result<Option<Match>, sqlx::Error> {
        let query = format!(
            "UPDATE matches SET status = $2, outcome = $3, confirmation_pending = '{{}}', \
                user_a_confirmation = COALESCE(user_a_confirmation, 'dismissed'), \
                user_b_confirmation = COALESCE(user_b_confirmation, 'dismissed'), \
                completed_at = CASE WHEN $2 = 'completed' THEN $4 ELSE completed_at END, \
                cancelled_at = CASE WHEN $2 = 'cancelled' THEN $4 ELSE cancelled_at END, \
                cancel_reason = CASE WHEN $2 = 'cancelled' THEN 'not_met' ELSE cancel_reason END \
             WHERE id = $1 AND status = 'expired_pending_confirmation' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(outcome)
            .bind(now)
            .fetch_optional(executor)
            .await
    }

    /// Matches in confirmation past their deadline.
    pub async fn list_confirmation_expired<'e, E: PgExecutor<'e>>(
        executor: E,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Match>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM matches \
             WHERE status = 'expired_pending_confirmation' AND confirmation_deadline <= $1 \
             ORDER BY confirmation_deadline ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Match>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(executor)
            .await
    }
}
