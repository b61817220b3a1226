//! Nearby available users for the caller's activity.

use std::collections::HashSet;

use chrono::Utc;
use rendezvous_core::error::CoreError;
use rendezvous_core::geo::{covering_cells, GeoPoint};
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::presence::PresenceSession;
use rendezvous_db::repositories::{BlockRepo, CooldownRepo, PresenceRepo};
use serde::Serialize;

use crate::error::EngineResult;
use crate::Engine;

/// One discoverable user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyUser {
    pub user_id: DbId,
    pub activity: String,
    pub distance_m: f64,
    pub exposure_count: i32,
    pub expires_at: Timestamp,
}

/// Least-exposed first, then nearest, then by id.
pub fn rank_nearby(users: &mut [NearbyUser]) {
    users.sort_by(|a, b| {
        a.exposure_count
            .cmp(&b.exposure_count)
            .then_with(|| a.distance_m.total_cmp(&b.distance_m))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
}

fn within(
    center: &GeoPoint,
    radius_m: f64,
    sessions: Vec<PresenceSession>,
    excluded: &HashSet<DbId>,
) -> Vec<NearbyUser> {
    sessions
        .into_iter()
        .filter(|p| !excluded.contains(&p.user_id))
        .filter_map(|p| {
            let distance_m = center.distance_m(&p.location());
            (distance_m <= radius_m).then(|| NearbyUser {
                user_id: p.user_id,
                activity: p.activity,
                distance_m,
                exposure_count: p.exposure_count,
                expires_at: p.expires_at,
            })
        })
        .collect()
}

impl Engine {
    /// Available users with the caller's activity, widening through the
    /// radius tiers until `limit` is met or the tiers run out.
    pub async fn nearby_users(&self, user_id: DbId, limit: usize) -> EngineResult<Vec<NearbyUser>> {
        let now = Utc::now();
        let limit = limit.clamp(1, self.config.max_discovery_results);

        let me = PresenceRepo::find(&self.pool, user_id)
            .await?
            .filter(|p| p.is_available(now))
            .ok_or_else(|| {
                CoreError::FailedPrecondition(
                    "Start an available presence to see who is nearby".to_string(),
                )
            })?;

        let mut excluded: HashSet<DbId> = BlockRepo::list_block_partners(&self.pool, user_id)
            .await?
            .into_iter()
            .collect();
        excluded.extend(CooldownRepo::list_active_partners(&self.pool, user_id, now).await?);

        let center = me.location();
        let mut tiers = self.config.radius_tiers_m.clone();
        tiers.retain(|r| r.is_finite() && *r > 0.0);
        tiers.sort_by(f64::total_cmp);

        let mut found = Vec::new();
        for radius in tiers {
            let cells = covering_cells(&center, radius);
            let sessions =
                PresenceRepo::list_available_in_cells(&self.pool, &cells, &me.activity, user_id, now)
                    .await?;
            found = within(&center, radius, sessions, &excluded);
            if found.len() >= limit {
                break;
            }
        }

        rank_nearby(&mut found);
        found.truncate(limit);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_id: DbId, exposure_count: i32, distance_m: f64) -> NearbyUser {
        NearbyUser {
            user_id,
            activity: "coffee".to_string(),
            distance_m,
            exposure_count,
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn least_exposed_users_come_first() {
        let mut users = vec![user(1, 3, 100.0), user(2, 0, 900.0), user(3, 1, 50.0)];
        rank_nearby(&mut users);
        let ids: Vec<DbId> = users.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn distance_then_id_break_ties() {
        let mut users = vec![user(9, 0, 200.0), user(4, 0, 200.0), user(5, 0, 10.0)];
        rank_nearby(&mut users);
        let ids: Vec<DbId> = users.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![5, 4, 9]);
    }
}
