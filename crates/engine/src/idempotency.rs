//! At-most-once execution keyed by `(user, operation, request_id)`.
//!
//! [`Engine::with_lock`] claims a `processing` record before running the
//! operation and stores the minimal result afterwards. A retried request
//! with the same key replays the stored result instead of running again.
//!
//! Place-choice submission uses the transaction-scoped pair
//! [`Engine::cached_in_tx`] / [`Engine::store_in_tx`] so the record commits
//! atomically with the state change.

use std::future::Future;

use chrono::Utc;
use rendezvous_core::error::CoreError;
use rendezvous_core::idempotency::{
    classify, is_replayable, validate_request_id, LockDecision, MAX_ACQUIRE_ATTEMPTS,
};
use rendezvous_core::types::DbId;
use rendezvous_db::models::idempotency::IdempotencyKey;
use rendezvous_db::repositories::IdempotencyRepo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgConnection;

use crate::error::EngineResult;
use crate::Engine;

/// Operation names used as part of the idempotency key.
pub mod operations {
    pub const PRESENCE_START: &str = "presence.start";
    pub const PRESENCE_END: &str = "presence.end";
    pub const OFFER_CREATE: &str = "offer.create";
    pub const OFFER_RESPOND: &str = "offer.respond";
    pub const OFFER_CANCEL: &str = "offer.cancel";
    pub const MATCH_PLACE_CHOICE: &str = "match.place_choice";
    pub const MATCH_STATUS: &str = "match.status";
    pub const MATCH_CANCEL: &str = "match.cancel";
    pub const MATCH_CONFIRM: &str = "match.confirm";
}

/// Build the key for an optional request id, validating it.
pub(crate) fn request_key<'a>(
    user_id: DbId,
    operation: &'a str,
    request_id: Option<&'a str>,
) -> EngineResult<Option<IdempotencyKey<'a>>> {
    let Some(request_id) = request_id else {
        return Ok(None);
    };
    validate_request_id(request_id).map_err(CoreError::Validation)?;
    Ok(Some(IdempotencyKey {
        user_id,
        operation,
        request_id,
    }))
}

fn decode<T: DeserializeOwned>(value: Option<serde_json::Value>) -> EngineResult<T> {
    serde_json::from_value(value.unwrap_or(serde_json::Value::Null)).map_err(|e| {
        CoreError::Internal(format!("Cached idempotent result is unreadable: {e}")).into()
    })
}

fn encode<T: Serialize>(result: &T) -> EngineResult<serde_json::Value> {
    serde_json::to_value(result)
        .map_err(|e| CoreError::Internal(format!("Result is not serializable: {e}")).into())
}

impl Engine {
    /// Execute `f` at most once per `(user_id, operation, request_id)`.
    ///
    /// Without a request id the operation simply runs.
    pub async fn with_lock<T, F, Fut>(
        &self,
        user_id: DbId,
        operation: &str,
        request_id: Option<&str>,
        f: F,
    ) -> EngineResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let Some(key) = request_key(user_id, operation, request_id)? else {
            return f().await;
        };

        let mut acquired = false;
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let now = Utc::now();
            if IdempotencyRepo::try_insert_processing(
                &self.pool,
                key,
                now,
                now + self.config.idempotency_ttl,
            )
            .await?
            {
                acquired = true;
                break;
            }

            // Removed between our insert and this read; just try again.
            let Some(existing) = IdempotencyRepo::find(&self.pool, key).await? else {
                continue;
            };

            match classify(
                existing.status,
                existing.expires_at,
                existing.processing_started_at,
                now,
                self.config.stale_lock_threshold,
            ) {
                LockDecision::ReturnCached => {
                    tracing::debug!(user_id, operation, request_id = key.request_id, "Replaying cached result");
                    return decode(existing.result);
                }
                LockDecision::DeleteAndRetry => {
                    IdempotencyRepo::delete(&self.pool, key).await?;
                }
                LockDecision::DuplicateInProgress => {
                    return Err(CoreError::Conflict(format!(
                        "Request '{}' is already in progress",
                        key.request_id
                    ))
                    .into());
                }
                LockDecision::TakeOverStale => {
                    tracing::warn!(user_id, operation, request_id = key.request_id, "Taking over stale idempotency lock");
                    IdempotencyRepo::mark_failed(&self.pool, key, "stale lock taken over").await?;
                }
            }
        }

        if !acquired {
            return Err(CoreError::Conflict(format!(
                "Could not acquire a lock for request '{}'",
                key.request_id
            ))
            .into());
        }

        match f().await {
            Ok(result) => {
                let value = encode(&result)?;
                IdempotencyRepo::mark_completed(
                    &self.pool,
                    key,
                    &value,
                    Utc::now() + self.config.idempotency_ttl,
                )
                .await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(db) = IdempotencyRepo::mark_failed(&self.pool, key, &e.to_string()).await
                {
                    tracing::warn!(user_id, operation, error = %db, "Failed to mark idempotency record failed");
                }
                Err(e)
            }
        }
    }

    /// Look up a replayable result inside an open transaction.
    pub(crate) async fn cached_in_tx<T: DeserializeOwned>(
        &self,
        conn: &mut PgConnection,
        key: Option<IdempotencyKey<'_>>,
    ) -> EngineResult<Option<T>> {
        let Some(key) = key else {
            return Ok(None);
        };
        match IdempotencyRepo::find(&mut *conn, key).await? {
            Some(record) if is_replayable(record.status, record.expires_at, Utc::now()) => {
                decode(record.result).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Store a completed result inside an open transaction.
    pub(crate) async fn store_in_tx<T: Serialize>(
        &self,
        conn: &mut PgConnection,
        key: Option<IdempotencyKey<'_>>,
        result: &T,
    ) -> EngineResult<()> {
        let Some(key) = key else {
            return Ok(());
        };
        let now = Utc::now();
        IdempotencyRepo::upsert_completed(
            &mut *conn,
            key,
            &encode(result)?,
            now,
            now + self.config.idempotency_ttl,
        )
        .await?;
        Ok(())
    }
}
