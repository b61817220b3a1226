//! Tiered place-candidate search against the catalog.
//!
//! One range query over the covering cells of the widest tier loads the
//! catalog slice; the tier loop then runs in memory.

use rendezvous_core::candidates::{search_catalog, CandidateQuery, CatalogPlace};
use rendezvous_core::geo::{covering_cells, GeoPoint};
use rendezvous_core::place_resolution::PlaceCandidate;
use rendezvous_core::types::Timestamp;
use rendezvous_db::repositories::PlaceRepo;
use sqlx::PgExecutor;

use crate::Engine;

/// Run a candidate search. An empty tier list yields no candidates.
pub async fn find_candidates<'e, E: PgExecutor<'e>>(
    executor: E,
    query: &CandidateQuery,
    now: Timestamp,
) -> Result<Vec<PlaceCandidate>, sqlx::Error> {
    let Some(widest) = query.sorted_tiers().last().copied() else {
        return Ok(Vec::new());
    };
    let cells = covering_cells(&query.center, widest);
    let catalog: Vec<CatalogPlace> = PlaceRepo::list_active_in_cells(executor, &cells)
        .await?
        .into_iter()
        .map(CatalogPlace::from)
        .collect();
    Ok(search_catalog(query, &catalog, now))
}

impl Engine {
    /// Query used to populate a match's negotiation list.
    pub(crate) fn negotiation_query(&self, center: GeoPoint, activity: &str) -> CandidateQuery {
        CandidateQuery {
            center,
            activity_filter: Some(activity.to_string()),
            hard_cap: self.config.negotiation_hard_cap,
            soft_min: self.config.negotiation_soft_min,
            radius_tiers_m: self.config.radius_tiers_m.clone(),
        }
    }

    /// Cheap existence check used before an offer is created.
    pub(crate) fn availability_query(&self, center: GeoPoint, activity: &str) -> CandidateQuery {
        CandidateQuery {
            center,
            activity_filter: Some(activity.to_string()),
            hard_cap: 1,
            soft_min: 1,
            radius_tiers_m: self.config.radius_tiers_m.clone(),
        }
    }
}
