//! Offer status values, expiry computation, and request validation.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default offer time-to-live, in seconds (10 minutes).
pub const DEFAULT_OFFER_TTL_SECS: i64 = 600;

/// Default cap on concurrently outstanding outgoing offers per sender.
pub const DEFAULT_MAX_OUTGOING_OFFERS: usize = 3;

/// Default per-sender cooldown between offers, in seconds.
pub const DEFAULT_OFFER_COOLDOWN_SECS: i64 = 30;

/// Default symmetric cooldown written for a pair on decline, in seconds (6 hours).
pub const DEFAULT_REJECTION_COOLDOWN_SECS: i64 = 6 * 3600;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Offer status as stored in `offers.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Cancelled,
}

impl OfferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
            OfferStatus::Expired => "expired",
            OfferStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OfferStatus::Pending),
            "accepted" => Some(OfferStatus::Accepted),
            "declined" => Some(OfferStatus::Declined),
            "expired" => Some(OfferStatus::Expired),
            "cancelled" => Some(OfferStatus::Cancelled),
            _ => None,
        }
    }

    /// Every status except `pending` is terminal and immutable.
    pub fn is_terminal(self) -> bool {
        self != OfferStatus::Pending
    }
}

impl_text_status!(OfferStatus, "offer status");

/// The recipient's answer to an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferResponse {
    Accept,
    Decline,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Offer expiry: the earliest of the TTL and both presence expiries.
pub fn offer_expiry(
    now: Timestamp,
    ttl: Duration,
    sender_presence_expiry: Timestamp,
    recipient_presence_expiry: Timestamp,
) -> Timestamp {
    (now + ttl)
        .min(sender_presence_expiry)
        .min(recipient_presence_expiry)
}

/// Reject an offer addressed to the sender themself.
pub fn validate_target(from: DbId, to: DbId) -> Result<(), String> {
    if from == to {
        return Err("Cannot send an offer to yourself".to_string());
    }
    if to <= 0 {
        return Err(format!("Recipient id must be positive, got {to}"));
    }
    Ok(())
}

/// Returns `true` if the sender may not create another offer right now.
pub fn outgoing_cap_reached(outstanding: usize, cap: usize) -> bool {
    outstanding >= cap
}
