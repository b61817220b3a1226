//! Profile mirror and reliability statistics.

use rendezvous_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `user_profiles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserProfile {
    pub user_id: DbId,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `user_reliability` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserReliability {
    pub user_id: DbId,
    pub completed_meetups: i32,
    pub cancellations: i32,
    pub severe_cancellations: i32,
    pub penalty_points: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
