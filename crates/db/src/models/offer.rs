//! Offer rows (`offers`).

use rendezvous_core::offer::OfferStatus;
use rendezvous_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `offers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Offer {
    pub id: DbId,
    pub from_user_id: DbId,
    pub to_user_id: DbId,
    #[sqlx(try_from = "String")]
    pub status: OfferStatus,
    pub activity: String,
    pub expires_at: Timestamp,
    pub match_id: Option<DbId>,
    pub sender_display_name: Option<String>,
    pub sender_photo_url: Option<String>,
    pub responded_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Offer {
    pub fn is_pending(&self) -> bool {
        self.status == OfferStatus::Pending
    }

    /// Pending but already past its expiry; flipped lazily on access.
    pub fn is_lapsed(&self, now: Timestamp) -> bool {
        self.is_pending() && self.expires_at <= now
    }
}

/// Insert DTO for a new pending offer.
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub from_user_id: DbId,
    pub to_user_id: DbId,
    pub activity: String,
    pub expires_at: Timestamp,
    pub sender_display_name: Option<String>,
    pub sender_photo_url: Option<String>,
}
