//! Repository for the `offers` table.

use rendezvous_core::offer::OfferStatus;
use rendezvous_core::types::{DbId, Timestamp};
use sqlx::PgExecutor;

use crate::models::offer::{NewOffer, Offer};

/// Column list for `offers` queries.
const COLUMNS: &str = "id, from_user_id, to_user_id, status, activity, expires_at, match_id, \
                       sender_display_name, sender_photo_url, responded_at, created_at, updated_at";

/// Provides data access for directed offers between present users.
pub struct OfferRepo;

impl OfferRepo {
    /// Insert a new pending offer.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewOffer,
    ) -> Result<Offer, sqlx::Error> {
        let query = format!(
            "INSERT INTO offers \
                (from_user_id, to_user_id, activity, expires_at, sender_display_name, sender_photo_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Offer>(&query)
            .bind(input.from_user_id)
            .bind(input.to_user_id)
            .bind(&input.activity)
            .bind(input.expires_at)
            .bind(&input.sender_display_name)
            .bind(&input.sender_photo_url)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<Offer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM offers WHERE id = $1");
        sqlx::query_as::<_, Offer>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// The pending offer in one direction, if any (expired or not).
    pub async fn find_pending_between<'e, E: PgExecutor<'e>>(
        executor: E,
        from_user_id: DbId,
        to_user_id: DbId,
    ) -> Result<Option<Offer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM offers \
             WHERE from_user_id = $1 AND to_user_id = $2 AND status = 'pending'"
        );
        sqlx::query_as::<_, Offer>(&query)
            .bind(from_user_id)
            .bind(to_user_id)
            .fetch_optional(executor)
            .await
    }

    /// Move a pending offer to a terminal status.
    ///
    /// Returns `None` when the offer is no longer pending, so concurrent
    /// terminal transitions cannot overwrite each other.
    pub async fn finish<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        status: OfferStatus,
        match_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<Option<Offer>, sqlx::Error> {
        let query = format!(
            "UPDATE offers SET status = $2, match_id = COALESCE($3, match_id), responded_at = $4 \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Offer>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(match_id)
            .bind(now)
            .fetch_optional(executor)
            .await
    }

    /// Pending, unexpired offers addressed to the user, newest first.
    pub async fn list_inbox<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<Offer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM offers \
             WHERE to_user_id = $1 AND status = 'pending' AND expires_at > $2 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Offer>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(executor)
            .await
    }

    /// Pending, unexpired offers sent by the user, newest first.
    pub async fn list_outgoing<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<Offer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM offers \
             WHERE from_user_id = $1 AND status = 'pending' AND expires_at > $2 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Offer>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(executor)
            .await
    }

    /// Every pending offer the user is party to, as sender or recipient.
    pub async fn list_pending_involving<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<Vec<Offer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM offers \
             WHERE (from_user_id = $1 OR to_user_id = $1) AND status = 'pending' \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Offer>(&query)
            .bind(user_id)
            .fetch_all(executor)
            .await
    }

    /// Pending offers past expiry, oldest first.
    pub async fn list_expired_pending<'e, E: PgExecutor<'e>>(
        executor: E,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<Offer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM offers \
             WHERE status = 'pending' AND expires_at <= $1 \
             ORDER BY expires_at ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Offer>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    /// Cancel the accepted offers that produced a match.
    pub async fn cancel_accepted_for_match<'e, E: PgExecutor<'e>>(
        executor: E,
        match_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE offers SET status = 'cancelled' WHERE match_id = $1 AND status = 'accepted'",
        )
        .bind(match_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
