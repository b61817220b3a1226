//! Place candidate search: filtering, distance ordering, radius-tier
//! fallback, and ranking.
//!
//! The database layer only narrows the catalog by locality code; every rule
//! that decides which places qualify and in what order lives here.

use chrono::Timelike;

use crate::geo::GeoPoint;
use crate::place_resolution::{PlaceCandidate, PlaceProvenance};
use crate::types::Timestamp;

/// Default radius tiers in meters, tried in increasing order.
pub const DEFAULT_RADIUS_TIERS_M: [f64; 4] = [1_000.0, 2_000.0, 3_000.0, 5_000.0];

/// Default minimum result count that stops the tier walk.
pub const DEFAULT_SOFT_MIN: usize = 6;

/// Default maximum number of candidates offered for negotiation.
pub const DEFAULT_HARD_CAP: usize = 9;

/// Minutes in a day, for opening-hours arithmetic.
const MINUTES_PER_DAY: i32 = 24 * 60;

/// A place from the shared catalog, as seen by the search.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPlace {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    /// Activity tags this place suits. Empty means "any activity".
    pub activities: Vec<String>,
    pub is_active: bool,
    /// Opening time in minutes after UTC midnight. `None` means always open.
    pub opens_at_minute: Option<i32>,
    /// Closing time in minutes after UTC midnight. May be earlier than
    /// `opens_at_minute` for places open across midnight.
    pub closes_at_minute: Option<i32>,
    pub provenance: PlaceProvenance,
}

impl CatalogPlace {
    /// Whether the place is open at `now`.
    pub fn is_open_at(&self, now: Timestamp) -> bool {
        let (Some(open), Some(close)) = (self.opens_at_minute, self.closes_at_minute) else {
            return true;
        };
        let minute = (now.hour() * 60 + now.minute()) as i32 % MINUTES_PER_DAY;
        if open == close {
            true
        } else if open < close {
            (open..close).contains(&minute)
        } else {
            minute >= open || minute < close
        }
    }

    /// Whether the place suits the activity filter.
    pub fn suits(&self, activity_filter: Option<&str>) -> bool {
        match activity_filter {
            None => true,
            Some(_) if self.activities.is_empty() => true,
            Some(activity) => self
                .activities
                .iter()
                .any(|a| a.eq_ignore_ascii_case(activity.trim())),
        }
    }
}

/// Parameters for one candidate search.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub center: GeoPoint,
    pub activity_filter: Option<String>,
    pub hard_cap: usize,
    pub soft_min: usize,
    pub radius_tiers_m: Vec<f64>,
}

impl CandidateQuery {
    /// Radius tiers sorted ascending, ignoring non-positive entries.
    pub fn sorted_tiers(&self) -> Vec<f64> {
        let mut tiers: Vec<f64> = self
            .radius_tiers_m
            .iter()
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .collect();
        tiers.sort_by(f64::total_cmp);
        tiers.dedup();
        tiers
    }
}

/// Qualifying places within one radius tier, nearest first (ties by id).
pub fn filter_tier(
    query: &CandidateQuery,
    radius_m: f64,
    places: &[CatalogPlace],
    now: Timestamp,
) -> Vec<(CatalogPlace, f64)> {
    let mut hits: Vec<(CatalogPlace, f64)> = places
        .iter()
        .filter(|p| p.is_active && p.is_open_at(now) && p.suits(query.activity_filter.as_deref()))
        .filter_map(|p| {
            let d = query.center.distance_m(&p.location);
            (d <= radius_m).then(|| (p.clone(), d))
        })
        .collect();

    hits.sort_by(|(a, da), (b, db)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)));
    hits
}

/// Whether a tier's result count is enough to stop widening the search.
pub fn tier_satisfies(query: &CandidateQuery, count: usize) -> bool {
    count >= query.soft_min
}

/// Truncate to the hard cap and assign 1-indexed ranks.
pub fn finalize(sorted: Vec<(CatalogPlace, f64)>, hard_cap: usize) -> Vec<PlaceCandidate> {
    sorted
        .into_iter()
        .take(hard_cap)
        .enumerate()
        .map(|(i, (place, distance_m))| PlaceCandidate {
            place_id: place.id,
            name: place.name,
            lat: place.location.lat,
            lng: place.location.lng,
            distance_m,
            rank: i as i32 + 1,
            provenance: place.provenance,
        })
        .collect()
}

/// Run the full tiered search over an in-memory catalog slice.
pub fn search_catalog(
    query: &CandidateQuery,
    catalog: &[CatalogPlace],
    now: Timestamp,
) -> Vec<PlaceCandidate> {
    let mut last = Vec::new();
    for radius in query.sorted_tiers() {
        last = filter_tier(query, radius, catalog, now);
        if tier_satisfies(query, last.len()) {
            break;
        }
    }
    finalize(last, query.hard_cap)
}
