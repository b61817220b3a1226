//! Shared fixtures for engine integration tests.

use std::sync::Arc;

use rendezvous_core::geo::GeoPoint;
use rendezvous_core::offer::OfferResponse;
use rendezvous_core::types::DbId;
use rendezvous_db::models::place::NewPlace;
use rendezvous_db::repositories::PlaceRepo;
use rendezvous_engine::offers::ResponseOutcome;
use rendezvous_engine::presence::StartPresence;
use rendezvous_engine::{Engine, EngineConfig};
use rendezvous_events::EventBus;
use sqlx::PgPool;

const METERS_PER_DEGREE: f64 = 111_320.0;

pub fn center() -> GeoPoint {
    GeoPoint::new(52.52, 13.405)
}

/// A point `meters` north of `origin`.
pub fn north_of(origin: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(origin.lat + meters / METERS_PER_DEGREE, origin.lng)
}

pub fn engine(pool: PgPool) -> Engine {
    engine_with(pool, EngineConfig::default())
}

pub fn engine_with(pool: PgPool, config: EngineConfig) -> Engine {
    Engine::new(pool, config, Arc::new(EventBus::default()))
}

/// Insert an always-open coffee place.
pub async fn seed_place(pool: &PgPool, id: &str, location: GeoPoint) {
    PlaceRepo::create(
        pool,
        &NewPlace {
            id: id.to_string(),
            name: format!("Cafe {id}"),
            location,
            activities: vec!["coffee".to_string()],
            opens_at_minute: None,
            closes_at_minute: None,
            is_custom: false,
            created_by: None,
        },
    )
    .await
    .unwrap();
}

/// Start a 30-minute coffee presence at `location`.
pub async fn go_present(engine: &Engine, user_id: DbId, location: GeoPoint) {
    engine
        .start_presence(
            user_id,
            &StartPresence {
                activity: "coffee".to_string(),
                duration_mins: 30,
                lat: location.lat,
                lng: location.lng,
            },
            None,
        )
        .await
        .unwrap();
}

/// Seed a place, bring both users online, and have `b` accept `a`'s offer.
pub async fn matched_pair(engine: &Engine, a: DbId, b: DbId) -> DbId {
    seed_place(engine.pool(), "osm:1", north_of(center(), 150.0)).await;
    go_present(engine, a, center()).await;
    go_present(engine, b, north_of(center(), 300.0)).await;

    let offer = engine.create_offer(a, b, None).await.unwrap();
    let response = engine
        .respond_to_offer(b, offer.offer_id, OfferResponse::Accept, None)
        .await
        .unwrap();
    assert_eq!(response.outcome, ResponseOutcome::Accepted);
    response.match_id.unwrap()
}

pub async fn count_active_matches(pool: &PgPool, a: DbId, b: DbId) -> i64 {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM matches WHERE user_a = $1 AND user_b = $2 \
         AND status IN ('pending', 'location_deciding', 'place_confirmed', 'heading_there', 'arrived')",
    )
    .bind(low)
    .bind(high)
    .fetch_one(pool)
    .await
    .unwrap();
    count
}
