//! At-most-once execution of keyed requests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{center, engine, matched_pair, north_of, seed_place};
use rendezvous_core::error::CoreError;
use rendezvous_core::idempotency::IdempotencyStatus;
use rendezvous_db::models::idempotency::IdempotencyKey;
use rendezvous_db::models::matches::Side;
use rendezvous_db::repositories::IdempotencyRepo;
use rendezvous_engine::idempotency::operations;
use rendezvous_engine::negotiation::{PlaceChoiceInput, PlaceChoiceResult};
use rendezvous_engine::presence::StartPresence;
use rendezvous_engine::{Engine, EngineError, EngineResult};
use sqlx::PgPool;

const OP: &str = "test.op";

fn key(request_id: &str) -> IdempotencyKey<'_> {
    IdempotencyKey {
        user_id: 1,
        operation: OP,
        request_id,
    }
}

/// Run a counted operation under the lock, optionally failing.
async fn counted(
    engine: &Engine,
    calls: &Arc<AtomicUsize>,
    request_id: &str,
    fail: bool,
) -> EngineResult<u32> {
    let calls = calls.clone();
    engine
        .with_lock(1, OP, Some(request_id), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
            if fail {
                return Err(EngineError::from(CoreError::Internal("boom".to_string())));
            }
            Ok(n * 10)
        })
        .await
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replay_returns_cached_result(pool: PgPool) {
    let engine = engine(pool.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(counted(&engine, &calls, "r-1", false).await.unwrap(), 10);
    assert_eq!(counted(&engine, &calls, "r-1", false).await.unwrap(), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let record = IdempotencyRepo::find(&pool, key("r-1")).await.unwrap().unwrap();
    assert_eq!(record.status, IdempotencyStatus::Completed);

    // A different request id runs again.
    assert_eq!(counted(&engine, &calls, "r-2", false).await.unwrap(), 20);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_request_may_be_retried(pool: PgPool) {
    let engine = engine(pool.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    assert_matches!(
        counted(&engine, &calls, "r-1", true).await,
        Err(EngineError::Core(CoreError::Internal(_)))
    );
    let record = IdempotencyRepo::find(&pool, key("r-1")).await.unwrap().unwrap();
    assert_eq!(record.status, IdempotencyStatus::Failed);

    assert_eq!(counted(&engine, &calls, "r-1", false).await.unwrap(), 20);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn in_flight_duplicate_conflicts(pool: PgPool) {
    let engine = engine(pool.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let now = Utc::now();
    IdempotencyRepo::try_insert_processing(&pool, key("r-1"), now, now + Duration::hours(1))
        .await
        .unwrap();

    assert_matches!(
        counted(&engine, &calls, "r-1", false).await,
        Err(EngineError::Core(CoreError::Conflict(_)))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_lock_is_taken_over(pool: PgPool) {
    let engine = engine(pool.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Utc::now() - Duration::minutes(5);
    IdempotencyRepo::try_insert_processing(&pool, key("r-1"), started, started + Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(counted(&engine, &calls, "r-1", false).await.unwrap(), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn blank_request_id_is_rejected(pool: PgPool) {
    let engine = engine(pool);
    let calls = Arc::new(AtomicUsize::new(0));

    assert_matches!(
        counted(&engine, &calls, "   ", false).await,
        Err(EngineError::Core(CoreError::Validation(_)))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn presence_start_replays_after_end(pool: PgPool) {
    let engine = engine(pool.clone());
    let input = StartPresence {
        activity: "coffee".to_string(),
        duration_mins: 30,
        lat: center().lat,
        lng: center().lng,
    };

    let first = engine.start_presence(1, &input, Some("start-1")).await.unwrap();
    engine.end_presence(1, None).await.unwrap();

    let replayed = engine.start_presence(1, &input, Some("start-1")).await.unwrap();
    assert_eq!(replayed, first);
    assert!(engine.get_presence(1).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Transaction-scoped records (place choice)
// ---------------------------------------------------------------------------

fn choice_key(request_id: &str) -> IdempotencyKey<'_> {
    IdempotencyKey {
        user_id: 1,
        operation: operations::MATCH_PLACE_CHOICE,
        request_id,
    }
}

fn existing(place_id: &str) -> PlaceChoiceInput {
    PlaceChoiceInput::Existing {
        place_id: place_id.to_string(),
    }
}

/// A match between users 1 and 2 in `location_deciding`.
async fn negotiating(engine: &Engine) -> i64 {
    seed_place(engine.pool(), "osm:2", north_of(center(), 250.0)).await;
    let match_id = matched_pair(engine, 1, 2).await;
    engine.fetch_candidate_places(1, match_id).await.unwrap();
    match_id
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn place_choice_replays_inside_the_transaction(pool: PgPool) {
    let engine = engine(pool.clone());
    let match_id = negotiating(&engine).await;

    let first = engine
        .set_place_choice(1, match_id, &existing("osm:2"), Some("pc-1"))
        .await
        .unwrap();
    let record = IdempotencyRepo::find(&pool, choice_key("pc-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, IdempotencyStatus::Completed);
    assert_eq!(record.result, Some(serde_json::to_value(&first).unwrap()));
    let before = engine.get_match(1, match_id).await.unwrap();

    // Same request id with a different body still replays the first result.
    let replayed = engine
        .set_place_choice(1, match_id, &existing("osm:1"), Some("pc-1"))
        .await
        .unwrap();
    assert_eq!(replayed, first);

    let after = engine.get_match(1, match_id).await.unwrap();
    assert_eq!(after.choice(Side::A).unwrap().place_id, "osm:2");
    assert_eq!(after.updated_at, before.updated_at);
    let unchanged = IdempotencyRepo::find(&pool, choice_key("pc-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.result, record.result);
    assert_eq!(unchanged.updated_at, record.updated_at);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_place_choices_share_one_outcome(pool: PgPool) {
    let engine = engine(pool.clone());
    let match_id = negotiating(&engine).await;

    let spawn_choice = |place_id: &'static str| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .set_place_choice(1, match_id, &existing(place_id), Some("pc-1"))
                .await
        })
    };
    let (left, right) = tokio::join!(spawn_choice("osm:2"), spawn_choice("osm:1"));
    let left: PlaceChoiceResult = left.unwrap().unwrap();
    let right: PlaceChoiceResult = right.unwrap().unwrap();
    assert_eq!(left, right);

    // Whichever call won, the stored choice and cached result agree.
    let record = IdempotencyRepo::find(&pool, choice_key("pc-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.result, Some(serde_json::to_value(&left).unwrap()));
    let m = engine.get_match(1, match_id).await.unwrap();
    assert!(m.choice(Side::A).is_some());
    assert!(m.choice(Side::B).is_none());
}
