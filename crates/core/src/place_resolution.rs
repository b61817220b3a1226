//! Place negotiation types and the deterministic resolution rule.
//!
//! Given the ranked candidate list and each participant's (optional) choice,
//! [`resolve`] always yields the same confirmed place and reason.

use serde::{Deserialize, Serialize};

/// Where a candidate or choice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceProvenance {
    /// Produced by the candidate resolver from the shared catalog.
    Catalog,
    /// Injected by a participant during negotiation.
    Custom,
}

/// A ranked meeting-place candidate stored on a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub place_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub distance_m: f64,
    /// 1-indexed rank in the final sorted order.
    pub rank: i32,
    pub provenance: PlaceProvenance,
}

/// One participant's pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceChoice {
    pub place_id: String,
    pub rank: i32,
    pub provenance: PlaceProvenance,
}

/// Why a particular place was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    /// Nobody chose; the top-ranked candidate wins.
    DefaultTopRank,
    /// Exactly one participant chose.
    SingleChoice,
    /// Both participants chose the same place.
    MutualAgreement,
    /// Different places; the better (lower) rank wins.
    RankTiebreak,
    /// Different places with the same rank; the smaller identifier wins.
    IdTiebreak,
}

impl ResolutionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionReason::DefaultTopRank => "default_top_rank",
            ResolutionReason::SingleChoice => "single_choice",
            ResolutionReason::MutualAgreement => "mutual_agreement",
            ResolutionReason::RankTiebreak => "rank_tiebreak",
            ResolutionReason::IdTiebreak => "id_tiebreak",
        }
    }
}

/// The outcome of place resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceResolution {
    pub place_id: String,
    pub rank: i32,
    pub reason: ResolutionReason,
}

/// Resolve the confirmed place.
///
/// - both absent -> rank #1
/// - exactly one present -> that place
/// - both present and identical -> that place
/// - both present and different -> lower rank wins; equal rank -> smaller id
///
/// Returns `None` only when nobody chose and there are no candidates.
pub fn resolve(
    candidates: &[PlaceCandidate],
    a: Option<&PlaceChoice>,
    b: Option<&PlaceChoice>,
) -> Option<PlaceResolution> {
    match (a, b) {
        (None, None) => candidates
            .iter()
            .min_by(|x, y| x.rank.cmp(&y.rank).then_with(|| x.place_id.cmp(&y.place_id)))
            .map(|top| PlaceResolution {
                place_id: top.place_id.clone(),
                rank: top.rank,
                reason: ResolutionReason::DefaultTopRank,
            }),
        (Some(choice), None) | (None, Some(choice)) => Some(PlaceResolution {
            place_id: choice.place_id.clone(),
            rank: choice.rank,
            reason: ResolutionReason::SingleChoice,
        }),
        (Some(a), Some(b)) if a.place_id == b.place_id => Some(PlaceResolution {
            place_id: a.place_id.clone(),
            rank: a.rank.min(b.rank),
            reason: ResolutionReason::MutualAgreement,
        }),
        (Some(a), Some(b)) => {
            let (winner, reason) = match a.rank.cmp(&b.rank) {
                std::cmp::Ordering::Less => (a, ResolutionReason::RankTiebreak),
                std::cmp::Ordering::Greater => (b, ResolutionReason::RankTiebreak),
                std::cmp::Ordering::Equal if a.place_id <= b.place_id => {
                    (a, ResolutionReason::IdTiebreak)
                }
                std::cmp::Ordering::Equal => (b, ResolutionReason::IdTiebreak),
            };
            Some(PlaceResolution {
                place_id: winner.place_id.clone(),
                rank: winner.rank,
                reason,
            })
        }
    }
}

/// Resolution is triggered early when both participants chose the same place.
pub fn choices_agree(a: Option<&PlaceChoice>, b: Option<&PlaceChoice>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.place_id == b.place_id)
}

/// Find a candidate by id.
pub fn find_candidate<'a>(
    candidates: &'a [PlaceCandidate],
    place_id: &str,
) -> Option<&'a PlaceCandidate> {
    candidates.iter().find(|c| c.place_id == place_id)
}

/// Coordinates closer than this are the same spot.
const COORD_EPSILON: f64 = 1e-7;

/// Custom candidates at the same spot under the same name, ignoring case and
/// surrounding whitespace.
pub fn same_custom_places<'a>(
    candidates: &'a [PlaceCandidate],
    name: &'a str,
    lat: f64,
    lng: f64,
) -> impl Iterator<Item = &'a PlaceCandidate> + 'a {
    let name = name.trim();
    candidates.iter().filter(move |c| {
        c.provenance == PlaceProvenance::Custom
            && c.name.trim().eq_ignore_ascii_case(name)
            && (c.lat - lat).abs() < COORD_EPSILON
            && (c.lng - lng).abs() < COORD_EPSILON
    })
}

/// Rank assigned to a custom place merged into an existing candidate list.
pub fn next_custom_rank(candidates: &[PlaceCandidate]) -> i32 {
    candidates.iter().map(|c| c.rank).max().unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, rank: i32) -> PlaceCandidate {
        PlaceCandidate {
            place_id: id.to_string(),
            name: format!("Place {id}"),
            lat: 0.0,
            lng: 0.0,
            distance_m: f64::from(rank) * 100.0,
            rank,
            provenance: PlaceProvenance::Catalog,
        }
    }

    fn choice(id: &str, rank: i32) -> PlaceChoice {
        PlaceChoice {
            place_id: id.to_string(),
            rank,
            provenance: PlaceProvenance::Catalog,
        }
    }

    fn list() -> Vec<PlaceCandidate> {
        vec![candidate("p1", 1), candidate("p2", 2), candidate("p3", 3), candidate("p4", 4)]
    }

    #[test]
    fn no_choices_picks_rank_one() {
        let r = resolve(&list(), None, None).unwrap();
        assert_eq!(r.place_id, "p1");
        assert_eq!(r.reason, ResolutionReason::DefaultTopRank);
    }

    #[test]
    fn no_choices_and_no_candidates_is_none() {
        assert!(resolve(&[], None, None).is_none());
    }

    #[test]
    fn single_choice_wins() {
        let c = choice("p3", 3);
        let r = resolve(&list(), None, Some(&c)).unwrap();
        assert_eq!(r.place_id, "p3");
        assert_eq!(r.reason, ResolutionReason::SingleChoice);
    }

    #[test]
    fn identical_choices_agree() {
        let a = choice("p4", 4);
        let b = choice("p4", 4);
        let r = resolve(&list(), Some(&a), Some(&b)).unwrap();
        assert_eq!(r.place_id, "p4");
        assert_eq!(r.reason, ResolutionReason::MutualAgreement);
        assert!(choices_agree(Some(&a), Some(&b)));
    }

    #[test]
    fn rank_two_beats_rank_four() {
        let a = choice("p4", 4);
        let b = choice("p2", 2);
        let r = resolve(&list(), Some(&a), Some(&b)).unwrap();
        assert_eq!(r.place_id, "p2");
        assert_eq!(r.rank, 2);
        assert_eq!(r.reason, ResolutionReason::RankTiebreak);
        assert_eq!(r.reason.as_str(), "rank_tiebreak");
    }

    #[test]
    fn equal_rank_smaller_id_wins_regardless_of_order() {
        let a = choice("custom:zeta", 5);
        let b = choice("custom:alpha", 5);
        let r1 = resolve(&list(), Some(&a), Some(&b)).unwrap();
        let r2 = resolve(&list(), Some(&b), Some(&a)).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1.place_id, "custom:alpha");
        assert_eq!(r1.reason, ResolutionReason::IdTiebreak);
    }

    #[test]
    fn resolution_is_repeatable() {
        let a = choice("p3", 3);
        let b = choice("p2", 2);
        let first = resolve(&list(), Some(&a), Some(&b));
        for _ in 0..5 {
            assert_eq!(resolve(&list(), Some(&a), Some(&b)), first);
        }
    }

    #[test]
    fn custom_rank_follows_list() {
        assert_eq!(next_custom_rank(&list()), 5);
        assert_eq!(next_custom_rank(&[]), 1);
    }

    #[test]
    fn same_custom_place_ignores_case_and_padding() {
        let mut custom = candidate("custom:1", 5);
        custom.name = "Park bench".to_string();
        custom.provenance = PlaceProvenance::Custom;
        let mut l = list();
        l.push(custom);

        let found: Vec<&str> = same_custom_places(&l, " park BENCH ", 0.0, 0.0)
            .map(|c| c.place_id.as_str())
            .collect();
        assert_eq!(found, vec!["custom:1"]);
        assert_eq!(same_custom_places(&l, "Park bench", 0.001, 0.0).count(), 0);
        // Catalog entries never count as a custom resubmission.
        assert_eq!(same_custom_places(&l, "Place p1", 0.0, 0.0).count(), 0);
    }

    #[test]
    fn find_candidate_by_id() {
        let l = list();
        assert_eq!(find_candidate(&l, "p2").map(|c| c.rank), Some(2));
        assert!(find_candidate(&l, "nope").is_none());
    }
}
