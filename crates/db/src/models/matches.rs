//! Match rows (`matches`).
//!
//! Per-participant columns come in `user_a_*` / `user_b_*` pairs; [`Side`]
//! selects one of them.

use rendezvous_core::confirmation::MeetingResponse;
use rendezvous_core::matching::{MatchStatus, UserMatchStatus};
use rendezvous_core::place_resolution::{PlaceCandidate, PlaceChoice};
use rendezvous_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `matches` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Match {
    pub id: DbId,
    pub user_a: DbId,
    pub user_b: DbId,
    #[sqlx(try_from = "String")]
    pub status: MatchStatus,
    #[sqlx(try_from = "String")]
    pub user_a_status: UserMatchStatus,
    #[sqlx(try_from = "String")]
    pub user_b_status: UserMatchStatus,
    pub activity: String,
    pub place_candidates: Json<Vec<PlaceCandidate>>,
    pub user_a_choice: Option<Json<PlaceChoice>>,
    pub user_b_choice: Option<Json<PlaceChoice>>,
    pub confirmed_place: Option<Json<PlaceCandidate>>,
    pub place_resolution_reason: Option<String>,
    pub decision_deadline: Option<Timestamp>,
    pub cancelled_by: Option<DbId>,
    pub cancel_reason: Option<String>,
    pub cancel_severe: bool,
    pub cancel_penalty: i32,
    pub cancelled_at: Option<Timestamp>,
    pub user_a_confirmation: Option<String>,
    pub user_b_confirmation: Option<String>,
    pub confirmation_pending: Vec<DbId>,
    pub confirmation_deadline: Option<Timestamp>,
    pub outcome: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Which participant column pair a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// Column prefix, `user_a` or `user_b`.
    pub fn prefix(self) -> &'static str {
        match self {
            Side::A => "user_a",
            Side::B => "user_b",
        }
    }

    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl Match {
    pub fn side_of(&self, user_id: DbId) -> Option<Side> {
        if user_id == self.user_a {
            Some(Side::A)
        } else if user_id == self.user_b {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user_id: DbId) -> bool {
        self.side_of(user_id).is_some()
    }

    pub fn user(&self, side: Side) -> DbId {
        match side {
            Side::A => self.user_a,
            Side::B => self.user_b,
        }
    }

    pub fn user_status(&self, side: Side) -> UserMatchStatus {
        match side {
            Side::A => self.user_a_status,
            Side::B => self.user_b_status,
        }
    }

    pub fn choice(&self, side: Side) -> Option<&PlaceChoice> {
        match side {
            Side::A => self.user_a_choice.as_deref(),
            Side::B => self.user_b_choice.as_deref(),
        }
    }

    pub fn confirmation(&self, side: Side) -> Option<MeetingResponse> {
        let raw = match side {
            Side::A => self.user_a_confirmation.as_deref(),
            Side::B => self.user_b_confirmation.as_deref(),
        };
        raw.and_then(MeetingResponse::parse)
    }

    pub fn candidates(&self) -> &[PlaceCandidate] {
        &self.place_candidates
    }
}

/// Insert DTO. Users are stored in canonical order by the repository.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub user_low: DbId,
    pub user_high: DbId,
    pub activity: String,
}

/// Cancellation metadata written with the status flip.
#[derive(Debug, Clone)]
pub struct Cancellation<'a> {
    pub cancelled_by: Option<DbId>,
    pub reason: &'a str,
    pub severe: bool,
    pub penalty: i32,
    pub at: Timestamp,
}
