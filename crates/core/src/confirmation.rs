//! Post-hoc meeting confirmation.
//!
//! When a participant's presence lapses after a place was confirmed, the
//! match stops waiting on progress updates and asks both users whether they
//! actually met. The answers (or their absence) decide the final status.

use serde::{Deserialize, Serialize};

use crate::matching::{MatchStatus, UserMatchStatus};
use crate::types::DbId;

/// A participant's answer to "did you meet?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingResponse {
    Met,
    NotMet,
    Dismissed,
}

impl MeetingResponse {
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingResponse::Met => "met",
            MeetingResponse::NotMet => "not_met",
            MeetingResponse::Dismissed => "dismissed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "met" => Some(MeetingResponse::Met),
            "not_met" => Some(MeetingResponse::NotMet),
            "dismissed" => Some(MeetingResponse::Dismissed),
            _ => None,
        }
    }
}

impl_text_status!(MeetingResponse, "meeting response");

/// Resolved outcome tag stored in `matches.outcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    BothConfirmed,
    BothNotMet,
    Disputed,
    Unconfirmed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::BothConfirmed => "both_confirmed",
            Outcome::BothNotMet => "both_not_met",
            Outcome::Disputed => "disputed",
            Outcome::Unconfirmed => "unconfirmed",
        }
    }
}

/// Final status and outcome once both answers are known.
pub fn resolve(a: MeetingResponse, b: MeetingResponse) -> (MatchStatus, Outcome) {
    use MeetingResponse::*;
    match (a, b) {
        (Dismissed, _) | (_, Dismissed) => (MatchStatus::Cancelled, Outcome::Unconfirmed),
        (Met, Met) => (MatchStatus::Completed, Outcome::BothConfirmed),
        (NotMet, NotMet) => (MatchStatus::Cancelled, Outcome::BothNotMet),
        (Met, NotMet) | (NotMet, Met) => (MatchStatus::Cancelled, Outcome::Disputed),
    }
}

/// Both answers, if known.
pub fn both_answered(
    a: Option<MeetingResponse>,
    b: Option<MeetingResponse>,
) -> Option<(MeetingResponse, MeetingResponse)> {
    Some((a?, b?))
}

/// Answers with any missing one defaulted to `dismissed`, for the expiry sweep.
pub fn with_defaults(
    a: Option<MeetingResponse>,
    b: Option<MeetingResponse>,
) -> (MeetingResponse, MeetingResponse) {
    (
        a.unwrap_or(MeetingResponse::Dismissed),
        b.unwrap_or(MeetingResponse::Dismissed),
    )
}

/// Snapshot taken when a match lapses into confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationSnapshot {
    /// Users still owed a response.
    pub pending: Vec<DbId>,
    pub user_a_response: Option<MeetingResponse>,
    pub user_b_response: Option<MeetingResponse>,
}

/// Build the confirmation snapshot from both sub-statuses. A user who
/// already reported `completed` counts as an implicit `met`.
pub fn snapshot(
    user_a: DbId,
    user_a_status: UserMatchStatus,
    user_b: DbId,
    user_b_status: UserMatchStatus,
) -> ConfirmationSnapshot {
    let implicit = |s: UserMatchStatus| {
        (s == UserMatchStatus::Completed).then_some(MeetingResponse::Met)
    };
    let user_a_response = implicit(user_a_status);
    let user_b_response = implicit(user_b_status);

    let mut pending = Vec::with_capacity(2);
    if user_a_response.is_none() {
        pending.push(user_a);
    }
    if user_b_response.is_none() {
        pending.push(user_b);
    }

    ConfirmationSnapshot {
        pending,
        user_a_response,
        user_b_response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MeetingResponse::*;

    #[test]
    fn both_met_completes() {
        assert_eq!(
            resolve(Met, Met),
            (MatchStatus::Completed, Outcome::BothConfirmed)
        );
    }

    #[test]
    fn both_not_met_cancels() {
        assert_eq!(
            resolve(NotMet, NotMet),
            (MatchStatus::Cancelled, Outcome::BothNotMet)
        );
    }

    #[test]
    fn split_answers_are_disputed() {
        assert_eq!(resolve(Met, NotMet).1, Outcome::Disputed);
        assert_eq!(resolve(NotMet, Met).1, Outcome::Disputed);
    }

    #[test]
    fn any_dismissal_is_unconfirmed() {
        for other in [Met, NotMet, Dismissed] {
            assert_eq!(
                resolve(Dismissed, other),
                (MatchStatus::Cancelled, Outcome::Unconfirmed)
            );
            assert_eq!(resolve(other, Dismissed).1, Outcome::Unconfirmed);
        }
    }

    #[test]
    fn missing_answers_default_to_dismissed() {
        assert_eq!(with_defaults(None, Some(Met)), (Dismissed, Met));
        assert_eq!(both_answered(None, Some(Met)), None);
        assert_eq!(both_answered(Some(NotMet), Some(Met)), Some((NotMet, Met)));
    }

    #[test]
    fn completed_user_is_implicit_met() {
        let snap = snapshot(1, UserMatchStatus::Completed, 2, UserMatchStatus::Arrived);
        assert_eq!(snap.pending, vec![2]);
        assert_eq!(snap.user_a_response, Some(Met));
        assert_eq!(snap.user_b_response, None);
    }

    #[test]
    fn arrived_pair_owes_two_answers() {
        let snap = snapshot(1, UserMatchStatus::Arrived, 2, UserMatchStatus::Arrived);
        assert_eq!(snap.pending, vec![1, 2]);
        let (a, b) = with_defaults(snap.user_a_response, snap.user_b_response);
        assert_eq!(resolve(a, b).1, Outcome::Unconfirmed);
    }

    #[test]
    fn response_round_trips_through_str() {
        for r in [Met, NotMet, Dismissed] {
            assert_eq!(MeetingResponse::parse(r.as_str()), Some(r));
        }
    }
}
