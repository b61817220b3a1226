//! Repository for the `idempotency_records` table.

use rendezvous_core::types::Timestamp;
use sqlx::PgExecutor;

use crate::models::idempotency::{IdempotencyKey, IdempotencyRecord};

/// Column list for `idempotency_records` queries.
const COLUMNS: &str = "user_id, operation, request_id, status, result, error_message, \
                       expires_at, processing_started_at, created_at, updated_at";

/// Provides data access for at-most-once execution records.
pub struct IdempotencyRepo;

impl IdempotencyRepo {
    /// Atomically claim the key with a `processing` record.
    ///
    /// Returns `false` when a record for the key already exists.
    pub async fn try_insert_processing<'e, E: PgExecutor<'e>>(
        executor: E,
        key: IdempotencyKey<'_>,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO idempotency_records \
                (user_id, operation, request_id, status, expires_at, processing_started_at) \
             VALUES ($1, $2, $3, 'processing', $4, $5) \
             ON CONFLICT (user_id, operation, request_id) DO NOTHING",
        )
        .bind(key.user_id)
        .bind(key.operation)
        .bind(key.request_id)
        .bind(expires_at)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        key: IdempotencyKey<'_>,
    ) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM idempotency_records \
             WHERE user_id = $1 AND operation = $2 AND request_id = $3"
        );
        sqlx::query_as::<_, IdempotencyRecord>(&query)
            .bind(key.user_id)
            .bind(key.operation)
            .bind(key.request_id)
            .fetch_optional(executor)
            .await
    }

    /// Store the minimal result of a successful execution.
    pub async fn mark_completed<'e, E: PgExecutor<'e>>(
        executor: E,
        key: IdempotencyKey<'_>,
        result: &serde_json::Value,
        expires_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE idempotency_records SET status = 'completed', result = $4, \
                error_message = NULL, expires_at = $5 \
             WHERE user_id = $1 AND operation = $2 AND request_id = $3",
        )
        .bind(key.user_id)
        .bind(key.operation)
        .bind(key.request_id)
        .bind(result)
        .bind(expires_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn mark_failed<'e, E: PgExecutor<'e>>(
        executor: E,
        key: IdempotencyKey<'_>,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE idempotency_records SET status = 'failed', error_message = $4 \
             WHERE user_id = $1 AND operation = $2 AND request_id = $3",
        )
        .bind(key.user_id)
        .bind(key.operation)
        .bind(key.request_id)
        .bind(error_message)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Write a `completed` record in one step, for the transaction-scoped
    /// variant. Overwrites a `failed` or lapsed record for the same key.
    pub async fn upsert_completed<'e, E: PgExecutor<'e>>(
        executor: E,
        key: IdempotencyKey<'_>,
        result: &serde_json::Value,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO idempotency_records \
                (user_id, operation, request_id, status, result, expires_at, processing_started_at) \
             VALUES ($1, $2, $3, 'completed', $4, $5, $6) \
             ON CONFLICT (user_id, operation, request_id) DO UPDATE SET \
                status = 'completed', \
                result = EXCLUDED.result, \
                error_message = NULL, \
                expires_at = EXCLUDED.expires_at",
        )
        .bind(key.user_id)
        .bind(key.operation)
        .bind(key.request_id)
        .bind(result)
        .bind(expires_at)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        key: IdempotencyKey<'_>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM idempotency_records \
             WHERE user_id = $1 AND operation = $2 AND request_id = $3",
        )
        .bind(key.user_id)
        .bind(key.operation)
        .bind(key.request_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record past its TTL.
    pub async fn purge_expired<'e, E: PgExecutor<'e>>(
        executor: E,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
            .bind(now)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
