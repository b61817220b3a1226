//! Repositories for `presence_sessions` and `presence_starts`.

use rendezvous_core::presence::PresenceStatus;
use rendezvous_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::presence::{NewPresence, PresenceSession};

// ---------------------------------------------------------------------------
// PresenceRepo
// ---------------------------------------------------------------------------

/// Column list for `presence_sessions` queries.
const COLUMNS: &str = "user_id, session_id, activity, duration_mins, lat, lng, locality_code, \
                       status, expires_at, original_expires_at, cooldown_until, exposure_count, \
                       outgoing_offer_ids, match_id, created_at, updated_at";

/// Provides data access for per-user availability sessions.
pub struct PresenceRepo;

impl PresenceRepo {
    /// Find the caller's session, live or lapsed.
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<Option<PresenceSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM presence_sessions WHERE user_id = $1");
        sqlx::query_as::<_, PresenceSession>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    /// Insert a fresh `available` session, replacing any existing row.
    ///
    /// Offers are not carried over: the outgoing set, cooldown and match link
    /// all reset.
    pub async fn replace<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewPresence,
    ) -> Result<PresenceSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO presence_sessions \
                (user_id, session_id, activity, duration_mins, lat, lng, locality_code, \
                 status, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'available', $8) \
             ON CONFLICT (user_id) DO UPDATE SET \
                session_id = EXCLUDED.session_id, \
                activity = EXCLUDED.activity, \
                duration_mins = EXCLUDED.duration_mins, \
                lat = EXCLUDED.lat, \
                lng = EXCLUDED.lng, \
                locality_code = EXCLUDED.locality_code, \
                status = 'available', \
                expires_at = EXCLUDED.expires_at, \
                original_expires_at = NULL, \
                cooldown_until = NULL, \
                exposure_count = 0, \
                outgoing_offer_ids = '{{}}', \
                match_id = NULL, \
                created_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PresenceSession>(&query)
            .bind(input.user_id)
            .bind(Uuid::new_v4())
            .bind(&input.activity)
            .bind(input.duration_mins)
            .bind(input.location.lat)
            .bind(input.location.lng)
            .bind(input.location.locality_code())
            .bind(input.expires_at)
            .fetch_one(executor)
            .await
    }

    /// Delete the caller's session. Returns `true` if a row was removed.
    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM presence_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a session only while it still points at `match_id`.
    pub async fn delete_if_linked<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        match_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM presence_sessions WHERE user_id = $1 AND match_id = $2")
                .bind(user_id)
                .bind(match_id)
                .execute(executor)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sessions past expiry, oldest first.
    pub async fn list_expired<'e, E: PgExecutor<'e>>(
        executor: E,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<PresenceSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM presence_sessions \
             WHERE expires_at <= $1 \
             ORDER BY expires_at ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, PresenceSession>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    /// Flip a session to `matched`, saving its original expiry and extending
    /// the live expiry to at least `min_expires_at`.
    pub async fn mark_matched<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        match_id: DbId,
        min_expires_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE presence_sessions SET \
                status = $2, \
                match_id = $3, \
                original_expires_at = COALESCE(original_expires_at, expires_at), \
                expires_at = GREATEST(expires_at, $4) \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(PresenceStatus::Matched.as_str())
        .bind(match_id)
        .bind(min_expires_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return a matched session to `available` with its saved original expiry.
    ///
    /// Only applies while the session is still linked to `match_id` and the
    /// original expiry lies in the future. Returns `false` otherwise.
    pub async fn restore_available<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        match_id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE presence_sessions SET \
                status = $4, \
                match_id = NULL, \
                expires_at = COALESCE(original_expires_at, expires_at), \
                original_expires_at = NULL \
             WHERE user_id = $1 AND match_id = $2 \
               AND COALESCE(original_expires_at, expires_at) > $3",
        )
        .bind(user_id)
        .bind(match_id)
        .bind(now)
        .bind(PresenceStatus::Available.as_str())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a new outstanding outgoing offer and start the sender cooldown.
    pub async fn add_outgoing_offer<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        offer_id: DbId,
        cooldown_until: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE presence_sessions SET \
                outgoing_offer_ids = array_append(array_remove(outgoing_offer_ids, $2), $2), \
                cooldown_until = $3 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(offer_id)
        .bind(cooldown_until)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Drop an offer from the sender's outstanding set. The cooldown is kept.
    pub async fn remove_outgoing_offer<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        offer_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE presence_sessions SET outgoing_offer_ids = array_remove(outgoing_offer_ids, $2) \
             WHERE user_id = $1 AND $2 = ANY(outgoing_offer_ids)",
        )
        .bind(user_id)
        .bind(offer_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Bump the exposure counter used to spread discovery across users.
    pub async fn increment_exposure<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE presence_sessions SET exposure_count = exposure_count + 1 WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Live `available` sessions for an activity whose locality code falls in
    /// one of the given geohash cells.
    pub async fn list_available_in_cells<'e, E: PgExecutor<'e>>(
        executor: E,
        cells: &[String],
        activity: &str,
        exclude_user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<PresenceSession>, sqlx::Error> {
        let patterns: Vec<String> = cells.iter().map(|c| format!("{c}%")).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM presence_sessions \
             WHERE status = 'available' \
               AND expires_at > $1 \
               AND activity = $2 \
               AND user_id <> $3 \
               AND locality_code LIKE ANY($4)"
        );
        sqlx::query_as::<_, PresenceSession>(&query)
            .bind(now)
            .bind(activity)
            .bind(exclude_user_id)
            .bind(&patterns)
            .fetch_all(executor)
            .await
    }
}

// ---------------------------------------------------------------------------
// PresenceStartRepo
// ---------------------------------------------------------------------------

/// Rolling log of presence starts for the per-user rate limit.
pub struct PresenceStartRepo;

impl PresenceStartRepo {
    pub async fn record<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO presence_starts (user_id, created_at) VALUES ($1, $2)")
            .bind(user_id)
            .bind(at)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Number of starts recorded for the user since `since`.
    pub async fn count_since<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        since: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM presence_starts WHERE user_id = $1 AND created_at > $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    /// Delete log entries older than `before`.
    pub async fn purge_before<'e, E: PgExecutor<'e>>(
        executor: E,
        before: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM presence_starts WHERE created_at < $1")
            .bind(before)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
