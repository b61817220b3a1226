//! Repository for the `pair_guards` table.

use rendezvous_core::matching::ACTIVE_STATUSES;
use rendezvous_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::pair_guard::PairGuard;

/// Column list for `pair_guards` queries.
const COLUMNS: &str = "user_low, user_high, match_id, expires_at, created_at, updated_at";

/// Provides data access for the per-pair match creation guard.
///
/// Callers pass the canonical `(low, high)` key from
/// [`rendezvous_core::matching::pair_key`].
pub struct PairGuardRepo;

impl PairGuardRepo {
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        user_low: DbId,
        user_high: DbId,
    ) -> Result<Option<PairGuard>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pair_guards WHERE user_low = $1 AND user_high = $2"
        );
        sqlx::query_as::<_, PairGuard>(&query)
            .bind(user_low)
            .bind(user_high)
            .fetch_optional(executor)
            .await
    }

    /// Point the pair's guard at `match_id`, replacing any stale guard.
    pub async fn upsert<'e, E: PgExecutor<'e>>(
        executor: E,
        user_low: DbId,
        user_high: DbId,
        match_id: DbId,
        expires_at: Timestamp,
    ) -> Result<PairGuard, sqlx::Error> {
        let query = format!(
            "INSERT INTO pair_guards (user_low, user_high, match_id, expires_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_low, user_high) DO UPDATE SET \
                match_id = EXCLUDED.match_id, \
                expires_at = EXCLUDED.expires_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PairGuard>(&query)
            .bind(user_low)
            .bind(user_high)
            .bind(match_id)
            .bind(expires_at)
            .fetch_one(executor)
            .await
    }

    /// Delete the guard only if it still references `match_id`.
    pub async fn release<'e, E: PgExecutor<'e>>(
        executor: E,
        user_low: DbId,
        user_high: DbId,
        match_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM pair_guards WHERE user_low = $1 AND user_high = $2 AND match_id = $3",
        )
        .bind(user_low)
        .bind(user_high)
        .bind(match_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete guards left behind by a failed release: those whose match is
    /// terminal, and those past their safety TTL whose match is no longer
    /// active. Guards of active matches are never touched.
    pub async fn purge_orphaned<'e, E: PgExecutor<'e>>(
        executor: E,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM pair_guards g \
             USING matches m \
             WHERE m.id = g.match_id \
               AND m.status <> ALL($2) \
               AND (m.status IN ('completed', 'cancelled') OR g.expires_at <= $1)",
        )
        .bind(now)
        .bind(&ACTIVE_STATUSES[..])
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
