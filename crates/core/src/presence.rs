//! Presence constants, status values, and start-request validation.
//!
//! A presence is a user's time-boxed advertisement of availability for a
//! given activity at a given location.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Shortest presence a user may advertise, in minutes.
pub const MIN_DURATION_MINS: i32 = 15;

/// Longest presence a user may advertise, in minutes.
pub const MAX_DURATION_MINS: i32 = 180;

/// Maximum length of an activity tag after trimming.
pub const MAX_ACTIVITY_LEN: usize = 64;

/// Default grace period added on top of the requested duration, in seconds.
pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 300;

/// Default number of presence starts allowed per rolling window.
pub const DEFAULT_MAX_STARTS_PER_WINDOW: i64 = 10;

/// Default rolling window for the start rate limit, in seconds.
pub const DEFAULT_START_RATE_WINDOW_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Presence status as stored in `presence_sessions.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Available,
    Matched,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::Available => "available",
            PresenceStatus::Matched => "matched",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(PresenceStatus::Available),
            "matched" => Some(PresenceStatus::Matched),
            _ => None,
        }
    }
}

impl_text_status!(PresenceStatus, "presence status");

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Normalize an activity tag: trimmed and lowercased.
pub fn normalize_activity(activity: &str) -> String {
    activity.trim().to_lowercase()
}

/// Two activity tags are compatible when their normalized forms match.
pub fn activities_compatible(a: &str, b: &str) -> bool {
    normalize_activity(a) == normalize_activity(b)
}

/// Validate an activity tag. Returns the normalized tag on success.
pub fn validate_activity(activity: &str) -> Result<String, String> {
    let normalized = normalize_activity(activity);
    if normalized.is_empty() {
        return Err("Activity must not be empty".to_string());
    }
    if normalized.chars().count() > MAX_ACTIVITY_LEN {
        return Err(format!(
            "Activity must be at most {MAX_ACTIVITY_LEN} characters"
        ));
    }
    Ok(normalized)
}

/// Validate a requested presence duration in minutes.
pub fn validate_duration(minutes: i32) -> Result<(), String> {
    if minutes < MIN_DURATION_MINS {
        return Err(format!(
            "Duration must be at least {MIN_DURATION_MINS} minutes, got {minutes}"
        ));
    }
    if minutes > MAX_DURATION_MINS {
        return Err(format!(
            "Duration must be at most {MAX_DURATION_MINS} minutes, got {minutes}"
        ));
    }
    Ok(())
}

/// Expiry for a new session: `now + duration + grace`.
pub fn session_expiry(now: Timestamp, duration_mins: i32, grace: Duration) -> Timestamp {
    now + Duration::minutes(i64::from(duration_mins)) + grace
}

// ---------------------------------------------------------------------------
// Start decision
// ---------------------------------------------------------------------------

/// What to do with a start request given the caller's existing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// No usable session exists; create a fresh one.
    Create,
    /// A lapsed `available` session exists; replace it.
    Replace,
    /// A live session with the same activity exists; return it unchanged.
    ReturnExisting,
    /// A live session with a different activity exists.
    ActivityConflict,
    /// A lapsed `matched` session is waiting for the expiry sweep to resolve
    /// its match.
    AwaitingReconciliation,
}

/// Snapshot of an existing session relevant to a start decision.
#[derive(Debug, Clone)]
pub struct ExistingSession<'a> {
    pub activity: &'a str,
    pub status: PresenceStatus,
    pub expires_at: Timestamp,
}

/// Decide how to handle a start request.
pub fn decide_start(
    existing: Option<ExistingSession<'_>>,
    requested_activity: &str,
    now: Timestamp,
) -> StartDecision {
    let Some(existing) = existing else {
        return StartDecision::Create;
    };

    let live = existing.expires_at > now;
    match (live, existing.status) {
        (true, _) if activities_compatible(existing.activity, requested_activity) => {
            StartDecision::ReturnExisting
        }
        (true, _) => StartDecision::ActivityConflict,
        (false, PresenceStatus::Available) => StartDecision::Replace,
        (false, PresenceStatus::Matched) => StartDecision::AwaitingReconciliation,
    }
}

/// Returns `true` if another start would exceed the rolling rate limit.
pub fn start_rate_limited(starts_in_window: i64, max_per_window: i64) -> bool {
    starts_in_window >= max_per_window
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn activity_is_trimmed_and_lowercased() {
        assert_eq!(validate_activity("  Coffee ").unwrap(), "coffee");
    }

    #[test]
    fn empty_activity_rejected() {
        assert!(validate_activity("   ").unwrap_err().contains("empty"));
    }

    #[test]
    fn overlong_activity_rejected() {
        let long = "x".repeat(MAX_ACTIVITY_LEN + 1);
        assert!(validate_activity(&long).unwrap_err().contains("at most"));
    }

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(MIN_DURATION_MINS).is_ok());
        assert!(validate_duration(MAX_DURATION_MINS).is_ok());
        assert!(validate_duration(MIN_DURATION_MINS - 1).unwrap_err().contains("at least"));
        assert!(validate_duration(MAX_DURATION_MINS + 1).unwrap_err().contains("at most"));
    }

    #[test]
    fn expiry_includes_grace() {
        let now = Utc::now();
        let exp = session_expiry(now, 30, Duration::seconds(DEFAULT_GRACE_PERIOD_SECS));
        assert_eq!(exp - now, Duration::minutes(35));
    }

    #[test]
    fn compatible_activities_ignore_case() {
        assert!(activities_compatible("Coffee", "coffee "));
        assert!(!activities_compatible("coffee", "walk"));
    }

    #[test]
    fn start_without_session_creates() {
        assert_eq!(decide_start(None, "coffee", Utc::now()), StartDecision::Create);
    }

    #[test]
    fn start_with_live_same_activity_returns_existing() {
        let now = Utc::now();
        let existing = ExistingSession {
            activity: "coffee",
            status: PresenceStatus::Available,
            expires_at: now + Duration::minutes(10),
        };
        assert_eq!(
            decide_start(Some(existing), "Coffee", now),
            StartDecision::ReturnExisting
        );
    }

    #[test]
    fn start_with_live_other_activity_conflicts() {
        let now = Utc::now();
        let existing = ExistingSession {
            activity: "coffee",
            status: PresenceStatus::Available,
            expires_at: now + Duration::minutes(10),
        };
        assert_eq!(
            decide_start(Some(existing), "walk", now),
            StartDecision::ActivityConflict
        );
    }

    #[test]
    fn lapsed_available_session_is_replaced() {
        let now = Utc::now();
        let existing = ExistingSession {
            activity: "coffee",
            status: PresenceStatus::Available,
            expires_at: now - Duration::minutes(1),
        };
        assert_eq!(decide_start(Some(existing), "walk", now), StartDecision::Replace);
    }

    #[test]
    fn lapsed_matched_session_awaits_sweep() {
        let now = Utc::now();
        let existing = ExistingSession {
            activity: "coffee",
            status: PresenceStatus::Matched,
            expires_at: now - Duration::minutes(1),
        };
        assert_eq!(
            decide_start(Some(existing), "coffee", now),
            StartDecision::AwaitingReconciliation
        );
    }

    #[test]
    fn rate_limit_threshold() {
        assert!(!start_rate_limited(9, 10));
        assert!(start_rate_limited(10, 10));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [PresenceStatus::Available, PresenceStatus::Matched] {
            assert_eq!(PresenceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PresenceStatus::parse("gone"), None);
    }
}
