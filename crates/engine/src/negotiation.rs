//! Place negotiation: candidate list, per-user choices, and resolution.

use chrono::Utc;
use rendezvous_core::error::CoreError;
use rendezvous_core::geo::{search_center, validate_location, GeoPoint};
use rendezvous_core::matching::{CancelReason, MatchStatus};
use rendezvous_core::place_resolution::{
    choices_agree, find_candidate, next_custom_rank, resolve, same_custom_places, PlaceCandidate,
    PlaceChoice, PlaceProvenance,
};
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::matches::{Match, Side};
use rendezvous_db::models::place::NewPlace;
use rendezvous_db::repositories::{MatchRepo, PlaceRepo, PresenceRepo};
use rendezvous_events::event_types;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::idempotency::{operations, request_key};
use crate::matches::load_for_participant;
use crate::places::find_candidates;
use crate::Engine;

/// Longest accepted custom place name.
pub const MAX_CUSTOM_PLACE_NAME_LEN: usize = 120;

/// What a participant submits as their place choice.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaceChoiceInput {
    /// Pick one of the stored candidates.
    Existing { place_id: String },
    /// Propose a new place; it joins the catalog and the candidate list.
    Custom { name: String, lat: f64, lng: f64 },
    /// Go with whatever the other participant picked.
    Defer,
}

/// Minimal result of [`Engine::set_place_choice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceChoiceResult {
    pub match_id: DbId,
    pub status: MatchStatus,
    pub confirmed_place_id: Option<String>,
}

impl From<&Match> for PlaceChoiceResult {
    fn from(m: &Match) -> Self {
        Self {
            match_id: m.id,
            status: m.status,
            confirmed_place_id: m.confirmed_place.as_ref().map(|p| p.place_id.clone()),
        }
    }
}

fn validate_custom_name(name: &str) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Place name must not be empty".to_string());
    }
    if trimmed.chars().count() > MAX_CUSTOM_PLACE_NAME_LEN {
        return Err(format!(
            "Place name must be at most {MAX_CUSTOM_PLACE_NAME_LEN} characters"
        ));
    }
    Ok(trimmed.to_string())
}

/// Choices to resolve with when `side` defers: theirs is dropped.
fn choices_after_defer(m: &Match, side: Side) -> (Option<&PlaceChoice>, Option<&PlaceChoice>) {
    match side {
        Side::A => (None, m.choice(Side::B)),
        Side::B => (m.choice(Side::A), None),
    }
}

impl Engine {
    /// Midpoint of both participants' presences, or whichever one is still
    /// linked, or the configured default.
    async fn match_center(&self, conn: &mut PgConnection, m: &Match) -> EngineResult<GeoPoint> {
        let mut points = [None, None];
        for (slot, user_id) in points.iter_mut().zip([m.user_a, m.user_b]) {
            *slot = PresenceRepo::find(&mut *conn, user_id)
                .await?
                .filter(|p| p.match_id == Some(m.id))
                .map(|p| p.location());
        }
        Ok(search_center(points[0], points[1], self.config.default_center))
    }

    // -----------------------------------------------------------------------
    // Candidate list
    // -----------------------------------------------------------------------

    /// Candidate places for a match. The first call on a `pending` match
    /// runs the search and opens the decision window.
    pub async fn fetch_candidate_places(
        &self,
        user_id: DbId,
        match_id: DbId,
    ) -> EngineResult<Vec<PlaceCandidate>> {
        self.with_serializable_retry("match.places", || {
            self.fetch_candidates_attempt(user_id, match_id)
        })
        .await
    }

    async fn fetch_candidates_attempt(
        &self,
        user_id: DbId,
        match_id: DbId,
    ) -> EngineResult<Vec<PlaceCandidate>> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let (m, _) = load_for_participant(&mut *tx, user_id, match_id).await?;

        if m.status != MatchStatus::Pending {
            tx.commit().await?;
            return Ok(m.place_candidates.0);
        }

        let center = self.match_center(&mut *tx, &m).await?;
        let query = self.negotiation_query(center, &m.activity);
        let candidates = find_candidates(&mut *tx, &query, now).await?;

        if candidates.is_empty() {
            let cancelled = self
                .cancel_in_tx(&mut *tx, &m, None, CancelReason::NoPlacesAvailable, now)
                .await?;
            tx.commit().await?;
            self.after_match_closed(&cancelled, event_types::MATCH_CANCELLED, None)
                .await;
            return Err(CoreError::FailedPrecondition(
                "No meeting places are available nearby; the match was cancelled".to_string(),
            )
            .into());
        }

        let updated = MatchRepo::begin_location_decision(
            &mut *tx,
            m.id,
            &candidates,
            now + self.config.decision_window,
        )
        .await?
        .ok_or_else(|| {
            CoreError::FailedPrecondition(format!("Match {match_id} changed concurrently"))
        })?;
        tx.commit().await?;

        tracing::info!(match_id, candidates = candidates.len(), "Place negotiation opened");
        Ok(updated.place_candidates.0)
    }

    // -----------------------------------------------------------------------
    // Choices
    // -----------------------------------------------------------------------

    /// Record the caller's place choice, resolving when both agree or the
    /// caller defers.
    pub async fn set_place_choice(
        &self,
        user_id: DbId,
        match_id: DbId,
        input: &PlaceChoiceInput,
        request_id: Option<&str>,
    ) -> EngineResult<PlaceChoiceResult> {
        if let PlaceChoiceInput::Custom { name, lat, lng } = input {
            validate_custom_name(name).map_err(CoreError::Validation)?;
            validate_location(&GeoPoint::new(*lat, *lng), &self.config.region)
                .map_err(CoreError::Validation)?;
        }
        let key = request_key(user_id, operations::MATCH_PLACE_CHOICE, request_id)?;

        self.with_serializable_retry("match.place_choice", || async move {
            let now = Utc::now();
            let mut tx = self.begin().await?;
            if let Some(cached) = self.cached_in_tx(&mut *tx, key).await? {
                tx.commit().await?;
                return Ok(cached);
            }

            let (result, confirmed) = self
                .place_choice_in_tx(&mut *tx, user_id, match_id, input, now)
                .await?;
            self.store_in_tx(&mut *tx, key, &result).await?;
            tx.commit().await?;

            if let Some(m) = confirmed {
                self.notify_match(event_types::MATCH_PLACE_CONFIRMED, &m, None);
            }
            Ok(result)
        })
        .await
    }

    /// Returns the result and, when this call confirmed the place, the
    /// updated match for notification.
    async fn place_choice_in_tx(
        &self,
        conn: &mut PgConnection,
        user_id: DbId,
        match_id: DbId,
        input: &PlaceChoiceInput,
        now: Timestamp,
    ) -> EngineResult<(PlaceChoiceResult, Option<Match>)> {
        let (m, side) = load_for_participant(&mut *conn, user_id, match_id).await?;

        if m.confirmed_place.is_some() {
            return Ok((PlaceChoiceResult::from(&m), None));
        }
        if m.status != MatchStatus::LocationDeciding {
            return Err(CoreError::FailedPrecondition(format!(
                "Cannot choose a place while the match is {}",
                m.status
            ))
            .into());
        }

        let mut candidates = m.place_candidates.0.clone();
        let choice = match input {
            PlaceChoiceInput::Defer => {
                let (a, b) = choices_after_defer(&m, side);
                let (a, b) = (a.cloned(), b.cloned());
                let confirmed = self
                    .resolve_in_tx(&mut *conn, &m, a.as_ref(), b.as_ref())
                    .await?;
                return Ok((PlaceChoiceResult::from(&confirmed), Some(confirmed)));
            }
            PlaceChoiceInput::Existing { place_id } => {
                let candidate = find_candidate(&candidates, place_id).ok_or_else(|| {
                    CoreError::Validation(format!("Place '{place_id}' is not a candidate"))
                })?;
                PlaceChoice {
                    place_id: candidate.place_id.clone(),
                    rank: candidate.rank,
                    provenance: candidate.provenance,
                }
            }
            PlaceChoiceInput::Custom { name, lat, lng } => {
                let name = validate_custom_name(name).map_err(CoreError::Validation)?;
                let reused = self
                    .own_custom_candidate(&mut *conn, &candidates, user_id, &name, *lat, *lng)
                    .await?;
                match reused {
                    Some(existing) => PlaceChoice {
                        place_id: existing.place_id,
                        rank: existing.rank,
                        provenance: PlaceProvenance::Custom,
                    },
                    None => {
                        let location = GeoPoint::new(*lat, *lng);
                        let place = PlaceRepo::create(
                            &mut *conn,
                            &NewPlace {
                                id: format!("custom:{}", Uuid::new_v4()),
                                name,
                                location,
                                activities: vec![m.activity.clone()],
                                opens_at_minute: None,
                                closes_at_minute: None,
                                is_custom: true,
                                created_by: Some(user_id),
                            },
                        )
                        .await?;
                        let center = self.match_center(&mut *conn, &m).await?;
                        let rank = next_custom_rank(&candidates);
                        candidates.push(PlaceCandidate {
                            place_id: place.id.clone(),
                            name: place.name,
                            lat: place.lat,
                            lng: place.lng,
                            distance_m: center.distance_m(&location),
                            rank,
                            provenance: PlaceProvenance::Custom,
                        });
                        PlaceChoice {
                            place_id: place.id,
                            rank,
                            provenance: PlaceProvenance::Custom,
                        }
                    }
                }
            }
        };

        if m.choice(side) == Some(&choice) {
            return Ok((PlaceChoiceResult::from(&m), None));
        }

        let updated = MatchRepo::set_choice(&mut *conn, m.id, side, &choice, &candidates)
            .await?
            .ok_or_else(|| {
                CoreError::FailedPrecondition(format!("Match {match_id} changed concurrently"))
            })?;
        tracing::info!(match_id, user_id, place_id = %choice.place_id, "Place choice recorded");

        if choices_agree(updated.choice(Side::A), updated.choice(Side::B)) {
            let (a, b) = (
                updated.choice(Side::A).cloned(),
                updated.choice(Side::B).cloned(),
            );
            let confirmed = self
                .resolve_in_tx(&mut *conn, &updated, a.as_ref(), b.as_ref())
                .await?;
            return Ok((PlaceChoiceResult::from(&confirmed), Some(confirmed)));
        }
        Ok((PlaceChoiceResult::from(&updated), None))
    }

    /// A custom candidate the caller already proposed at this spot, if any.
    async fn own_custom_candidate(
        &self,
        conn: &mut PgConnection,
        candidates: &[PlaceCandidate],
        user_id: DbId,
        name: &str,
        lat: f64,
        lng: f64,
    ) -> EngineResult<Option<PlaceCandidate>> {
        let same: Vec<PlaceCandidate> = same_custom_places(candidates, name, lat, lng)
            .cloned()
            .collect();
        for candidate in same {
            let place = PlaceRepo::find_by_id(&mut *conn, &candidate.place_id).await?;
            if place.is_some_and(|p| p.created_by == Some(user_id)) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Write the resolved place and advance to `place_confirmed`.
    pub(crate) async fn resolve_in_tx(
        &self,
        conn: &mut PgConnection,
        m: &Match,
        a: Option<&PlaceChoice>,
        b: Option<&PlaceChoice>,
    ) -> EngineResult<Match> {
        let resolution = resolve(m.candidates(), a, b).ok_or_else(|| {
            CoreError::FailedPrecondition("There are no candidate places to choose from".into())
        })?;
        let place = find_candidate(m.candidates(), &resolution.place_id)
            .ok_or_else(|| {
                CoreError::Internal(format!(
                    "Resolved place '{}' is missing from match {}",
                    resolution.place_id, m.id
                ))
            })?
            .clone();

        let confirmed = MatchRepo::confirm_place(&mut *conn, m.id, &place, resolution.reason.as_str())
            .await?
            .ok_or_else(|| {
                CoreError::FailedPrecondition(format!("Match {} changed concurrently", m.id))
            })?;
        tracing::info!(
            match_id = m.id,
            place_id = %place.place_id,
            reason = resolution.reason.as_str(),
            "Place confirmed"
        );
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_names_are_trimmed_and_bounded() {
        assert_eq!(validate_custom_name("  Corner Cafe ").unwrap(), "Corner Cafe");
        assert!(validate_custom_name("   ").is_err());
        assert!(validate_custom_name(&"x".repeat(MAX_CUSTOM_PLACE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn choice_input_uses_kind_tag() {
        let input: PlaceChoiceInput =
            serde_json::from_str(r#"{"kind":"existing","place_id":"osm:42"}"#).unwrap();
        assert_eq!(
            input,
            PlaceChoiceInput::Existing {
                place_id: "osm:42".to_string()
            }
        );
        let defer: PlaceChoiceInput = serde_json::from_str(r#"{"kind":"defer"}"#).unwrap();
        assert_eq!(defer, PlaceChoiceInput::Defer);
    }
}
