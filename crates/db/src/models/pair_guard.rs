use rendezvous_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `pair_guards` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PairGuard {
    pub user_low: DbId,
    pub user_high: DbId,
    pub match_id: DbId,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
