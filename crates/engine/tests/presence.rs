//! Presence lifecycle through the engine.

mod common;

use assert_matches::assert_matches;
use common::{center, engine, engine_with, go_present, matched_pair, north_of, seed_place};
use rendezvous_core::error::CoreError;
use rendezvous_core::offer::OfferStatus;
use rendezvous_db::repositories::OfferRepo;
use rendezvous_engine::presence::StartPresence;
use rendezvous_engine::{EngineConfig, EngineError};
use sqlx::PgPool;

fn coffee(duration_mins: i32) -> StartPresence {
    StartPresence {
        activity: "  Coffee ".to_string(),
        duration_mins,
        lat: 52.52,
        lng: 13.405,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn start_normalizes_activity_and_adds_grace(pool: PgPool) {
    let engine = engine(pool);
    let started = engine.start_presence(1, &coffee(30), None).await.unwrap();

    let session = engine.get_presence(1).await.unwrap().unwrap();
    assert_eq!(session.session_id, started.session_id);
    assert_eq!(session.activity, "coffee");
    let lifetime = session.expires_at - session.created_at;
    assert!(lifetime >= chrono::Duration::minutes(35) - chrono::Duration::seconds(5));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn start_is_business_idempotent(pool: PgPool) {
    let engine = engine(pool);
    let first = engine.start_presence(1, &coffee(30), None).await.unwrap();
    let second = engine.start_presence(1, &coffee(60), None).await.unwrap();
    assert_eq!(first, second);

    let other = StartPresence {
        activity: "tennis".to_string(),
        ..coffee(30)
    };
    assert_matches!(
        engine.start_presence(1, &other, None).await,
        Err(EngineError::Core(CoreError::FailedPrecondition(_)))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn start_rejects_out_of_range_duration(pool: PgPool) {
    let engine = engine(pool);
    assert_matches!(
        engine.start_presence(1, &coffee(5), None).await,
        Err(EngineError::Core(CoreError::Validation(_)))
    );
    assert!(engine.get_presence(1).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn start_is_rate_limited(pool: PgPool) {
    let config = EngineConfig {
        max_starts_per_window: 2,
        ..EngineConfig::default()
    };
    let engine = engine_with(pool, config);

    for _ in 0..2 {
        engine.start_presence(1, &coffee(30), None).await.unwrap();
        engine.end_presence(1, None).await.unwrap();
    }
    assert_matches!(
        engine.start_presence(1, &coffee(30), None).await,
        Err(EngineError::Core(CoreError::ResourceExhausted(_)))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn end_removes_session_and_cancels_offers(pool: PgPool) {
    let engine = engine(pool.clone());
    seed_place(&pool, "osm:1", north_of(center(), 100.0)).await;
    go_present(&engine, 1, center()).await;
    go_present(&engine, 2, north_of(center(), 200.0)).await;
    let offer = engine.create_offer(1, 2, None).await.unwrap();

    let ended = engine.end_presence(1, None).await.unwrap();
    assert!(ended.ended);
    assert_eq!(ended.cancelled_offers, 1);
    assert!(engine.get_presence(1).await.unwrap().is_none());

    let stored = OfferRepo::find_by_id(&pool, offer.offer_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Cancelled);
    assert!(engine.list_inbox(2).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn end_without_session_is_a_no_op(pool: PgPool) {
    let engine = engine(pool);
    let ended = engine.end_presence(1, None).await.unwrap();
    assert!(!ended.ended);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn end_is_refused_while_matched(pool: PgPool) {
    let engine = engine(pool);
    matched_pair(&engine, 1, 2).await;

    assert_matches!(
        engine.end_presence(1, None).await,
        Err(EngineError::Core(CoreError::FailedPrecondition(_)))
    );
    assert!(engine.get_presence(1).await.unwrap().is_some());
}
