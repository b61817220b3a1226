//! Match state machine: statuses, per-user sub-statuses, the promotion rule,
//! and cancellation severity/penalty rules.
//!
//! ```text
//! pending -> location_deciding -> place_confirmed -> heading_there -> arrived -> completed
//!    \              \                   \                  \             \
//!     +--------------+-------------------+------------------+-------------+--> cancelled
//!
//! place_confirmed | heading_there | arrived --(presence lapse)--> expired_pending_confirmation
//! expired_pending_confirmation --> completed | cancelled
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Timing and penalty constants
// ---------------------------------------------------------------------------

/// Default place-negotiation decision window, in seconds.
pub const DEFAULT_DECISION_WINDOW_SECS: i64 = 600;

/// Default "did you meet" confirmation window, in seconds (24 hours).
pub const DEFAULT_CONFIRMATION_WINDOW_SECS: i64 = 24 * 3600;

/// Default minimum remaining lifetime of a presence once matched, in seconds.
pub const DEFAULT_MATCH_SESSION_EXTENSION_SECS: i64 = 3 * 3600;

/// Default age after which a match still in `pending` is cancelled, in seconds.
pub const DEFAULT_PENDING_MATCH_TIMEOUT_SECS: i64 = 900;

/// Default pair-guard safety TTL, in seconds (6 hours).
pub const DEFAULT_PAIR_GUARD_TTL_SECS: i64 = 6 * 3600;

/// Default window after match creation in which cancelling is free, in seconds.
pub const DEFAULT_CANCEL_GRACE_SECS: i64 = 120;

/// Default reliability penalty for a user-attributed cancellation.
pub const DEFAULT_BASE_CANCEL_PENALTY: i32 = 10;

// ---------------------------------------------------------------------------
// Overall status
// ---------------------------------------------------------------------------

/// Overall match status as stored in `matches.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    LocationDeciding,
    PlaceConfirmed,
    HeadingThere,
    Arrived,
    Completed,
    Cancelled,
    ExpiredPendingConfirmation,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::LocationDeciding => "location_deciding",
            MatchStatus::PlaceConfirmed => "place_confirmed",
            MatchStatus::HeadingThere => "heading_there",
            MatchStatus::Arrived => "arrived",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::ExpiredPendingConfirmation => "expired_pending_confirmation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(MatchStatus::Pending),
            "location_deciding" => Some(MatchStatus::LocationDeciding),
            "place_confirmed" => Some(MatchStatus::PlaceConfirmed),
            "heading_there" => Some(MatchStatus::HeadingThere),
            "arrived" => Some(MatchStatus::Arrived),
            "completed" => Some(MatchStatus::Completed),
            "cancelled" => Some(MatchStatus::Cancelled),
            "expired_pending_confirmation" => Some(MatchStatus::ExpiredPendingConfirmation),
            _ => None,
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }

    /// Active matches hold their participants and their pair guard.
    ///
    /// `expired_pending_confirmation` is neither active nor terminal: it only
    /// waits for reconciliation and no longer blocks new matches.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            MatchStatus::Pending
                | MatchStatus::LocationDeciding
                | MatchStatus::PlaceConfirmed
                | MatchStatus::HeadingThere
                | MatchStatus::Arrived
        )
    }

    /// Statuses from which a presence lapse moves the match into meeting
    /// confirmation rather than cancelling it.
    pub fn lapses_into_confirmation(self) -> bool {
        matches!(
            self,
            MatchStatus::PlaceConfirmed | MatchStatus::HeadingThere | MatchStatus::Arrived
        )
    }

    /// Statuses in which participants may report progress.
    pub fn accepts_progress_updates(self) -> bool {
        self.lapses_into_confirmation()
    }
}

impl_text_status!(MatchStatus, "match status");

/// All statuses considered active, for SQL `= ANY($n)` filters.
pub const ACTIVE_STATUSES: [&str; 5] = [
    "pending",
    "location_deciding",
    "place_confirmed",
    "heading_there",
    "arrived",
];

// ---------------------------------------------------------------------------
// Per-user sub-status
// ---------------------------------------------------------------------------

/// A participant's own progress through the meetup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserMatchStatus {
    Pending,
    HeadingThere,
    Arrived,
    Completed,
}

impl UserMatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserMatchStatus::Pending => "pending",
            UserMatchStatus::HeadingThere => "heading_there",
            UserMatchStatus::Arrived => "arrived",
            UserMatchStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(UserMatchStatus::Pending),
            "heading_there" => Some(UserMatchStatus::HeadingThere),
            "arrived" => Some(UserMatchStatus::Arrived),
            "completed" => Some(UserMatchStatus::Completed),
            _ => None,
        }
    }

    fn is_en_route(self) -> bool {
        matches!(self, UserMatchStatus::HeadingThere | UserMatchStatus::Arrived)
    }
}

impl_text_status!(UserMatchStatus, "user match status");

/// Validate a participant's progress update.
///
/// Progress is only accepted while the match is between `place_confirmed`
/// and `arrived`, and a sub-status may only move forward.
pub fn validate_progress(
    overall: MatchStatus,
    current: UserMatchStatus,
    requested: UserMatchStatus,
) -> Result<(), String> {
    if !overall.accepts_progress_updates() {
        return Err(format!(
            "Cannot update progress while match is {}",
            overall.as_str()
        ));
    }
    if requested == UserMatchStatus::Pending {
        return Err("Cannot move progress back to pending".to_string());
    }
    if requested < current {
        return Err(format!(
            "Cannot move progress backwards from {} to {}",
            current.as_str(),
            requested.as_str()
        ));
    }
    Ok(())
}

/// Recompute the overall status from both sub-statuses.
///
/// - both `completed` -> `completed`
/// - both `arrived` -> `arrived`
/// - both in {`heading_there`, `arrived`} -> `heading_there`
/// - otherwise the current status is kept
pub fn promote(current: MatchStatus, a: UserMatchStatus, b: UserMatchStatus) -> MatchStatus {
    if a == UserMatchStatus::Completed && b == UserMatchStatus::Completed {
        return MatchStatus::Completed;
    }
    if a.is_en_route() && b.is_en_route() {
        if a == UserMatchStatus::Arrived && b == UserMatchStatus::Arrived {
            return MatchStatus::Arrived;
        }
        return MatchStatus::HeadingThere;
    }
    current
}

// ---------------------------------------------------------------------------
// Pair key
// ---------------------------------------------------------------------------

/// Canonical, order-independent key for a pair of users: `(low, high)`.
pub fn pair_key(a: DbId, b: DbId) -> (DbId, DbId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Why a match was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Participant changed their mind.
    UserCancelled,
    /// The participant ended their presence or otherwise walked away.
    NoShow,
    NoPlacesAvailable,
    Safety,
    Blocked,
    Timeout,
    PresenceExpired,
    /// Meeting confirmation resolved to "did not meet".
    NotMet,
}

impl CancelReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelReason::UserCancelled => "user_cancelled",
            CancelReason::NoShow => "no_show",
            CancelReason::NoPlacesAvailable => "no_places_available",
            CancelReason::Safety => "safety",
            CancelReason::Blocked => "blocked",
            CancelReason::Timeout => "timeout",
            CancelReason::PresenceExpired => "presence_expired",
            CancelReason::NotMet => "not_met",
        }
    }

    /// System-attributed reasons never carry a reliability penalty.
    pub fn is_system(self) -> bool {
        matches!(
            self,
            CancelReason::NoPlacesAvailable
                | CancelReason::Safety
                | CancelReason::Blocked
                | CancelReason::Timeout
                | CancelReason::PresenceExpired
                | CancelReason::NotMet
        )
    }

    /// Reasons a participant may cite when cancelling their own match.
    pub fn participant_selectable(self) -> bool {
        matches!(
            self,
            CancelReason::UserCancelled
                | CancelReason::NoShow
                | CancelReason::Safety
                | CancelReason::Blocked
        )
    }
}

/// A cancellation is severe when the *other* party was already on the way
/// or had arrived.
pub fn is_severe_cancellation(other_party: UserMatchStatus) -> bool {
    other_party.is_en_route()
}

/// Inputs to the cancellation penalty computation.
#[derive(Debug, Clone, Copy)]
pub struct PenaltyInput {
    pub reason: CancelReason,
    pub severe: bool,
    pub match_created_at: Timestamp,
    pub cancelled_at: Timestamp,
    pub grace: Duration,
    pub base_penalty: i32,
}

/// Reliability penalty for a cancellation.
///
/// Zero for system reasons and within the grace window after creation;
/// otherwise the base penalty, doubled when severe.
pub fn cancellation_penalty(input: &PenaltyInput) -> i32 {
    if input.reason.is_system() {
        return 0;
    }
    if input.cancelled_at - input.match_created_at < input.grace {
        return 0;
    }
    if input.severe {
        input.base_penalty * 2
    } else {
        input.base_penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use UserMatchStatus::*;

    #[test]
    fn both_completed_promotes_to_completed() {
        assert_eq!(
            promote(MatchStatus::Arrived, Completed, Completed),
            MatchStatus::Completed
        );
    }

    #[test]
    fn both_arrived_promotes_to_arrived() {
        assert_eq!(
            promote(MatchStatus::HeadingThere, Arrived, Arrived),
            MatchStatus::Arrived
        );
    }

    #[test]
    fn mixed_en_route_promotes_to_heading_there() {
        assert_eq!(
            promote(MatchStatus::PlaceConfirmed, HeadingThere, Arrived),
            MatchStatus::HeadingThere
        );
        assert_eq!(
            promote(MatchStatus::PlaceConfirmed, HeadingThere, HeadingThere),
            MatchStatus::HeadingThere
        );
    }

    #[test]
    fn one_user_pending_keeps_current() {
        assert_eq!(
            promote(MatchStatus::PlaceConfirmed, HeadingThere, Pending),
            MatchStatus::PlaceConfirmed
        );
    }

    #[test]
    fn completed_with_arrived_keeps_current() {
        assert_eq!(
            promote(MatchStatus::Arrived, Completed, Arrived),
            MatchStatus::Arrived
        );
    }

    #[test]
    fn progress_only_moves_forward() {
        assert!(validate_progress(MatchStatus::PlaceConfirmed, Pending, HeadingThere).is_ok());
        assert!(validate_progress(MatchStatus::HeadingThere, HeadingThere, Completed).is_ok());
        assert!(validate_progress(MatchStatus::Arrived, Arrived, Arrived).is_ok());
        assert!(validate_progress(MatchStatus::Arrived, Arrived, HeadingThere)
            .unwrap_err()
            .contains("backwards"));
        assert!(validate_progress(MatchStatus::Arrived, Arrived, Pending).is_err());
    }

    #[test]
    fn progress_rejected_outside_active_meetup() {
        let err = validate_progress(MatchStatus::LocationDeciding, Pending, HeadingThere)
            .unwrap_err();
        assert!(err.contains("location_deciding"));
        assert!(validate_progress(MatchStatus::Cancelled, Pending, HeadingThere).is_err());
    }

    #[test]
    fn active_and_terminal_are_disjoint() {
        for status in [
            MatchStatus::Pending,
            MatchStatus::LocationDeciding,
            MatchStatus::PlaceConfirmed,
            MatchStatus::HeadingThere,
            MatchStatus::Arrived,
            MatchStatus::Completed,
            MatchStatus::Cancelled,
            MatchStatus::ExpiredPendingConfirmation,
        ] {
            assert!(!(status.is_active() && status.is_terminal()));
            assert_eq!(MatchStatus::parse(status.as_str()), Some(status));
            assert_eq!(
                status.is_active(),
                ACTIVE_STATUSES.contains(&status.as_str())
            );
        }
        assert!(!MatchStatus::ExpiredPendingConfirmation.is_active());
        assert!(!MatchStatus::ExpiredPendingConfirmation.is_terminal());
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(pair_key(9, 3), (3, 9));
        assert_eq!(pair_key(3, 9), (3, 9));
    }

    fn penalty(reason: CancelReason, severe: bool, age_secs: i64) -> i32 {
        let created = Utc::now();
        cancellation_penalty(&PenaltyInput {
            reason,
            severe,
            match_created_at: created,
            cancelled_at: created + Duration::seconds(age_secs),
            grace: Duration::seconds(DEFAULT_CANCEL_GRACE_SECS),
            base_penalty: DEFAULT_BASE_CANCEL_PENALTY,
        })
    }

    #[test]
    fn system_reasons_are_free() {
        assert_eq!(penalty(CancelReason::PresenceExpired, true, 3600), 0);
        assert_eq!(penalty(CancelReason::NoPlacesAvailable, false, 3600), 0);
        assert_eq!(penalty(CancelReason::Timeout, false, 3600), 0);
    }

    #[test]
    fn participants_cannot_cite_scheduler_reasons() {
        assert!(CancelReason::UserCancelled.participant_selectable());
        assert!(CancelReason::Safety.participant_selectable());
        assert!(!CancelReason::Timeout.participant_selectable());
        assert!(!CancelReason::NotMet.participant_selectable());
    }

    #[test]
    fn grace_window_is_free() {
        assert_eq!(penalty(CancelReason::UserCancelled, true, 30), 0);
    }

    #[test]
    fn user_cancellation_pays_base_or_double() {
        assert_eq!(penalty(CancelReason::UserCancelled, false, 600), DEFAULT_BASE_CANCEL_PENALTY);
        assert_eq!(
            penalty(CancelReason::UserCancelled, true, 600),
            DEFAULT_BASE_CANCEL_PENALTY * 2
        );
    }

    #[test]
    fn severity_follows_other_party() {
        assert!(is_severe_cancellation(HeadingThere));
        assert!(is_severe_cancellation(Arrived));
        assert!(!is_severe_cancellation(Pending));
        assert!(!is_severe_cancellation(Completed));
    }
}
