//! Repositories for the block list, rejection cooldowns, the profile
//! mirror and reliability statistics.

use rendezvous_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::social::{UserProfile, UserReliability};

// ---------------------------------------------------------------------------
// BlockRepo
// ---------------------------------------------------------------------------

/// Read access to `user_blocks`. Writes come from the moderation surface.
pub struct BlockRepo;

impl BlockRepo {
    /// `true` if either user has blocked the other.
    pub async fn is_blocked_either<'e, E: PgExecutor<'e>>(
        executor: E,
        a: DbId,
        b: DbId,
    ) -> Result<bool, sqlx::Error> {
        let (blocked,): (bool,) = sqlx::query_as(
            "SELECT EXISTS ( \
                SELECT 1 FROM user_blocks \
                WHERE (blocker_id = $1 AND blocked_id = $2) \
                   OR (blocker_id = $2 AND blocked_id = $1) \
             )",
        )
        .bind(a)
        .bind(b)
        .fetch_one(executor)
        .await?;
        Ok(blocked)
    }

    /// Every user on either side of a block with `user_id`.
    pub async fn list_block_partners<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT blocked_id FROM user_blocks WHERE blocker_id = $1 \
             UNION \
             SELECT blocker_id FROM user_blocks WHERE blocked_id = $1",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn block<'e, E: PgExecutor<'e>>(
        executor: E,
        blocker_id: DbId,
        blocked_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_blocks (blocker_id, blocked_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(executor)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CooldownRepo
// ---------------------------------------------------------------------------

/// Symmetric rejection cooldowns between two users.
pub struct CooldownRepo;

impl CooldownRepo {
    /// Write the cooldown in both directions.
    pub async fn set_pair<'e, E: PgExecutor<'e>>(
        executor: E,
        a: DbId,
        b: DbId,
        expires_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO pair_cooldowns (user_id, other_user_id, expires_at) \
             VALUES ($1, $2, $3), ($2, $1, $3) \
             ON CONFLICT (user_id, other_user_id) DO UPDATE SET \
                expires_at = GREATEST(pair_cooldowns.expires_at, EXCLUDED.expires_at)",
        )
        .bind(a)
        .bind(b)
        .bind(expires_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn is_active<'e, E: PgExecutor<'e>>(
        executor: E,
        a: DbId,
        b: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let (active,): (bool,) = sqlx::query_as(
            "SELECT EXISTS ( \
                SELECT 1 FROM pair_cooldowns \
                WHERE user_id = $1 AND other_user_id = $2 AND expires_at > $3 \
             )",
        )
        .bind(a)
        .bind(b)
        .bind(now)
        .fetch_one(executor)
        .await?;
        Ok(active)
    }

    /// Users the caller is currently cooled down with.
    pub async fn list_active_partners<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT other_user_id FROM pair_cooldowns WHERE user_id = $1 AND expires_at > $2",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn purge_expired<'e, E: PgExecutor<'e>>(
        executor: E,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pair_cooldowns WHERE expires_at <= $1")
            .bind(now)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// ProfileRepo
// ---------------------------------------------------------------------------

/// Read access to the `user_profiles` mirror.
pub struct ProfileRepo;

impl ProfileRepo {
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            "SELECT user_id, display_name, photo_url, created_at, updated_at \
             FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Insert or refresh a mirrored profile.
    pub async fn upsert<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<UserProfile, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            "INSERT INTO user_profiles (user_id, display_name, photo_url) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET \
                display_name = EXCLUDED.display_name, \
                photo_url = EXCLUDED.photo_url \
             RETURNING user_id, display_name, photo_url, created_at, updated_at",
        )
        .bind(user_id)
        .bind(display_name)
        .bind(photo_url)
        .fetch_one(executor)
        .await
    }
}

// ---------------------------------------------------------------------------
// ReliabilityRepo
// ---------------------------------------------------------------------------

/// Column list for `user_reliability` queries.
const RELIABILITY_COLUMNS: &str = "user_id, completed_meetups, cancellations, \
                                   severe_cancellations, penalty_points, created_at, updated_at";

/// Per-user meetup reliability counters.
pub struct ReliabilityRepo;

impl ReliabilityRepo {
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<Option<UserReliability>, sqlx::Error> {
        let query =
            format!("SELECT {RELIABILITY_COLUMNS} FROM user_reliability WHERE user_id = $1");
        sqlx::query_as::<_, UserReliability>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn record_completion<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_reliability (user_id, completed_meetups) VALUES ($1, 1) \
             ON CONFLICT (user_id) DO UPDATE SET \
                completed_meetups = user_reliability.completed_meetups + 1",
        )
        .bind(user_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn record_cancellation<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        severe: bool,
        penalty: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_reliability \
                (user_id, cancellations, severe_cancellations, penalty_points) \
             VALUES ($1, 1, CASE WHEN $2 THEN 1 ELSE 0 END, $3) \
             ON CONFLICT (user_id) DO UPDATE SET \
                cancellations = user_reliability.cancellations + 1, \
                severe_cancellations = user_reliability.severe_cancellations \
                    + CASE WHEN $2 THEN 1 ELSE 0 END, \
                penalty_points = user_reliability.penalty_points + $3",
        )
        .bind(user_id)
        .bind(severe)
        .bind(penalty)
        .execute(executor)
        .await?;
        Ok(())
    }
}
