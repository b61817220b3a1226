//! Idempotency record statuses and the collision decision table used by the
//! at-most-once lock manager.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Default lifetime of a completed idempotency record, in seconds (24 hours).
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 24 * 3600;

/// Default age after which a `processing` record is considered abandoned.
pub const DEFAULT_STALE_LOCK_SECS: i64 = 60;

/// Maximum acquire attempts before giving up.
pub const MAX_ACQUIRE_ATTEMPTS: u32 = 5;

/// Longest accepted client request id.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Status as stored in `idempotency_records.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(IdempotencyStatus::Processing),
            "completed" => Some(IdempotencyStatus::Completed),
            "failed" => Some(IdempotencyStatus::Failed),
            _ => None,
        }
    }
}

impl_text_status!(IdempotencyStatus, "idempotency status");

/// What to do when the insert of a `processing` record collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    /// A completed, unexpired record exists; replay its cached result.
    ReturnCached,
    /// The record failed earlier or its TTL lapsed; delete it and retry.
    DeleteAndRetry,
    /// Another call holds a fresh lock for the same request.
    DuplicateInProgress,
    /// The holder looks dead; mark the record failed and retry.
    TakeOverStale,
}

/// Classify an existing record found on collision.
pub fn classify(
    status: IdempotencyStatus,
    expires_at: Timestamp,
    processing_started_at: Timestamp,
    now: Timestamp,
    stale_threshold: Duration,
) -> LockDecision {
    match status {
        IdempotencyStatus::Completed if expires_at > now => LockDecision::ReturnCached,
        IdempotencyStatus::Completed | IdempotencyStatus::Failed => LockDecision::DeleteAndRetry,
        IdempotencyStatus::Processing if now - processing_started_at >= stale_threshold => {
            LockDecision::TakeOverStale
        }
        IdempotencyStatus::Processing => LockDecision::DuplicateInProgress,
    }
}

/// Whether a cached result may be replayed by the transaction-scoped variant.
pub fn is_replayable(status: IdempotencyStatus, expires_at: Timestamp, now: Timestamp) -> bool {
    status == IdempotencyStatus::Completed && expires_at > now
}

/// Validate a client-supplied request id.
pub fn validate_request_id(request_id: &str) -> Result<(), String> {
    if request_id.trim().is_empty() {
        return Err("request_id must not be blank".to_string());
    }
    if request_id.len() > MAX_REQUEST_ID_LEN {
        return Err(format!(
            "request_id must be at most {MAX_REQUEST_ID_LEN} characters"
        ));
    }
    Ok(())
}
