//! Idempotency record rows (`idempotency_records`).

use rendezvous_core::idempotency::IdempotencyStatus;
use rendezvous_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `idempotency_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IdempotencyRecord {
    pub user_id: DbId,
    pub operation: String,
    pub request_id: String,
    #[sqlx(try_from = "String")]
    pub status: IdempotencyStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub expires_at: Timestamp,
    pub processing_started_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Composite key of an idempotency record.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyKey<'a> {
    pub user_id: DbId,
    pub operation: &'a str,
    pub request_id: &'a str,
}
