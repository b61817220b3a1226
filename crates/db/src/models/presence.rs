//! Presence session rows (`presence_sessions`, `presence_starts`).

use rendezvous_core::geo::GeoPoint;
use rendezvous_core::presence::{ExistingSession, PresenceStatus};
use rendezvous_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `presence_sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PresenceSession {
    pub user_id: DbId,
    pub session_id: Uuid,
    pub activity: String,
    pub duration_mins: i32,
    pub lat: f64,
    pub lng: f64,
    pub locality_code: String,
    #[sqlx(try_from = "String")]
    pub status: PresenceStatus,
    pub expires_at: Timestamp,
    pub original_expires_at: Option<Timestamp>,
    pub cooldown_until: Option<Timestamp>,
    pub exposure_count: i32,
    pub outgoing_offer_ids: Vec<DbId>,
    pub match_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PresenceSession {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }

    /// Live and not tied up in a match.
    pub fn is_available(&self, now: Timestamp) -> bool {
        self.is_live(now) && self.status == PresenceStatus::Available
    }

    pub fn in_cooldown(&self, now: Timestamp) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn as_existing(&self) -> ExistingSession<'_> {
        ExistingSession {
            activity: &self.activity,
            status: self.status,
            expires_at: self.expires_at,
        }
    }
}

/// Insert DTO for a fresh session. Replaces any previous row for the user.
#[derive(Debug, Clone)]
pub struct NewPresence {
    pub user_id: DbId,
    pub activity: String,
    pub duration_mins: i32,
    pub location: GeoPoint,
    pub expires_at: Timestamp,
}
