//! Background sweeps: expiry, lapse reconciliation, and housekeeping.

mod common;

use chrono::{Duration, Utc};
use common::{center, count_active_matches, engine, go_present, matched_pair, north_of, seed_place};
use rendezvous_core::confirmation::MeetingResponse;
use rendezvous_core::matching::{MatchStatus, UserMatchStatus};
use rendezvous_core::offer::{OfferResponse, OfferStatus};
use rendezvous_core::presence::PresenceStatus;
use rendezvous_db::repositories::{
    CooldownRepo, OfferRepo, PairGuardRepo, PresenceRepo, ReliabilityRepo,
};
use rendezvous_engine::negotiation::PlaceChoiceInput;
use rendezvous_engine::offers::ResponseOutcome;
use rendezvous_engine::Engine;
use sqlx::PgPool;

async fn lapse_presences(pool: &PgPool, user_ids: &[i64]) {
    sqlx::query(
        "UPDATE presence_sessions SET \
            expires_at = NOW() - INTERVAL '1 minute', \
            original_expires_at = NOW() - INTERVAL '1 minute' \
         WHERE user_id = ANY($1)",
    )
    .bind(user_ids)
    .execute(pool)
    .await
    .unwrap();
}

/// A match with a confirmed place and both users at the given sub-status.
async fn meeting(pool: &PgPool, progress: [UserMatchStatus; 2]) -> (Engine, i64) {
    let engine = engine(pool.clone());
    let match_id = matched_pair(&engine, 1, 2).await;
    engine.fetch_candidate_places(1, match_id).await.unwrap();
    let choice = PlaceChoiceInput::Existing {
        place_id: "osm:1".to_string(),
    };
    for user_id in [1, 2] {
        engine
            .set_place_choice(user_id, match_id, &choice, None)
            .await
            .unwrap();
    }
    for (user_id, status) in [1, 2].into_iter().zip(progress) {
        engine
            .update_match_status(user_id, match_id, status, None)
            .await
            .unwrap();
    }
    (engine, match_id)
}

// ---------------------------------------------------------------------------
// Presence lapse
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn lapsed_available_presence_is_removed(pool: PgPool) {
    let engine = engine(pool.clone());
    go_present(&engine, 1, center()).await;
    lapse_presences(&pool, &[1]).await;

    let report = engine.sweep_expired_presences(Utc::now()).await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(PresenceRepo::find(&pool, 1).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lapse_before_place_cancels_match(pool: PgPool) {
    let engine = engine(pool.clone());
    let match_id = matched_pair(&engine, 1, 2).await;
    lapse_presences(&pool, &[1]).await;

    engine.sweep_expired_presences(Utc::now()).await.unwrap();

    let m = engine.get_match(2, match_id).await.unwrap();
    assert_eq!(m.status, MatchStatus::Cancelled);
    assert_eq!(m.cancel_reason.as_deref(), Some("presence_expired"));
    assert_eq!(m.cancelled_by, None);
    assert!(PresenceRepo::find(&pool, 1).await.unwrap().is_none());
    let other = PresenceRepo::find(&pool, 2).await.unwrap().unwrap();
    assert_eq!(other.status, PresenceStatus::Available);
    assert!(PairGuardRepo::find(&pool, 1, 2).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unanswered_confirmation_resolves_unconfirmed(pool: PgPool) {
    let (engine, match_id) = meeting(&pool, [UserMatchStatus::Arrived; 2]).await;
    lapse_presences(&pool, &[1, 2]).await;

    engine.sweep_expired_presences(Utc::now()).await.unwrap();

    let m = engine.get_match(1, match_id).await.unwrap();
    assert_eq!(m.status, MatchStatus::ExpiredPendingConfirmation);
    assert_eq!(m.confirmation_pending, vec![1, 2]);
    assert!(PresenceRepo::find(&pool, 1).await.unwrap().is_none());
    assert!(PresenceRepo::find(&pool, 2).await.unwrap().is_none());

    // Not due yet.
    let early = engine.sweep_expired_confirmations(Utc::now()).await.unwrap();
    assert_eq!(early.processed, 0);

    engine
        .sweep_expired_confirmations(Utc::now() + Duration::hours(25))
        .await
        .unwrap();
    let m = engine.get_match(1, match_id).await.unwrap();
    assert_eq!(m.status, MatchStatus::Cancelled);
    assert_eq!(m.outcome.as_deref(), Some("unconfirmed"));
    assert_eq!(m.cancel_reason.as_deref(), Some("not_met"));
    assert!(m.confirmation_pending.is_empty());
    assert!(PairGuardRepo::find(&pool, 1, 2).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn both_met_completes_after_lapse(pool: PgPool) {
    let (engine, match_id) = meeting(&pool, [UserMatchStatus::Arrived; 2]).await;
    lapse_presences(&pool, &[1, 2]).await;
    engine.sweep_expired_presences(Utc::now()).await.unwrap();

    let first = engine
        .confirm_meeting(1, match_id, MeetingResponse::Met, None)
        .await
        .unwrap();
    assert_eq!(first.status, MatchStatus::ExpiredPendingConfirmation);
    let second = engine
        .confirm_meeting(2, match_id, MeetingResponse::Met, None)
        .await
        .unwrap();
    assert_eq!(second.status, MatchStatus::Completed);

    let m = engine.get_match(2, match_id).await.unwrap();
    assert_eq!(m.outcome.as_deref(), Some("both_confirmed"));
    let stats = ReliabilityRepo::find(&pool, 1).await.unwrap().unwrap();
    assert_eq!(stats.completed_meetups, 1);

    // Answering again is a no-op.
    let again = engine
        .confirm_meeting(1, match_id, MeetingResponse::NotMet, None)
        .await
        .unwrap();
    assert_eq!(again.status, MatchStatus::Completed);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reported_completion_counts_as_met(pool: PgPool) {
    let (engine, match_id) =
        meeting(&pool, [UserMatchStatus::Completed, UserMatchStatus::Arrived]).await;
    lapse_presences(&pool, &[1, 2]).await;
    engine.sweep_expired_presences(Utc::now()).await.unwrap();

    let m = engine.get_match(1, match_id).await.unwrap();
    assert_eq!(m.confirmation_pending, vec![2]);
    assert_eq!(m.user_a_confirmation.as_deref(), Some("met"));

    let done = engine
        .confirm_meeting(2, match_id, MeetingResponse::NotMet, None)
        .await
        .unwrap();
    assert_eq!(done.status, MatchStatus::Cancelled);
    let m = engine.get_match(1, match_id).await.unwrap();
    assert_eq!(m.outcome.as_deref(), Some("disputed"));
}

// ---------------------------------------------------------------------------
// Matches and offers
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_pending_match_times_out(pool: PgPool) {
    let engine = engine(pool.clone());
    let match_id = matched_pair(&engine, 1, 2).await;

    let early = engine.sweep_stale_pending_matches(Utc::now()).await.unwrap();
    assert_eq!(early.processed, 0);

    let report = engine
        .sweep_stale_pending_matches(Utc::now() + Duration::minutes(16))
        .await
        .unwrap();
    assert_eq!(report.processed, 1);

    let m = engine.get_match(1, match_id).await.unwrap();
    assert_eq!(m.status, MatchStatus::Cancelled);
    assert_eq!(m.cancel_reason.as_deref(), Some("timeout"));
    for user_id in [1, 2] {
        let p = PresenceRepo::find(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(p.status, PresenceStatus::Available);
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lapsed_offers_expire(pool: PgPool) {
    let engine = engine(pool.clone());
    seed_place(&pool, "osm:1", north_of(center(), 150.0)).await;
    go_present(&engine, 1, center()).await;
    go_present(&engine, 2, north_of(center(), 300.0)).await;
    let offer = engine.create_offer(1, 2, None).await.unwrap();

    let report = engine
        .sweep_expired_offers(Utc::now() + Duration::minutes(11))
        .await
        .unwrap();
    assert_eq!(report.processed, 1);

    let stored = OfferRepo::find_by_id(&pool, offer.offer_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Expired);
    let sender = PresenceRepo::find(&pool, 1).await.unwrap().unwrap();
    assert!(sender.outgoing_offer_ids.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn accept_racing_expiry_has_one_outcome(pool: PgPool) {
    let engine = engine(pool.clone());
    seed_place(&pool, "osm:1", north_of(center(), 150.0)).await;
    go_present(&engine, 1, center()).await;
    go_present(&engine, 2, north_of(center(), 300.0)).await;
    let offer = engine.create_offer(1, 2, None).await.unwrap();

    let accept = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .respond_to_offer(2, offer.offer_id, OfferResponse::Accept, None)
                .await
        })
    };
    let sweep = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .sweep_expired_offers(Utc::now() + Duration::minutes(11))
                .await
        })
    };
    let accepted = accept.await.unwrap();
    sweep.await.unwrap().unwrap();

    let stored = OfferRepo::find_by_id(&pool, offer.offer_id).await.unwrap().unwrap();
    match stored.status {
        OfferStatus::Accepted => {
            assert_eq!(accepted.unwrap().outcome, ResponseOutcome::Accepted);
            assert_eq!(count_active_matches(&pool, 1, 2).await, 1);
        }
        OfferStatus::Expired => {
            assert!(accepted.is_err());
            assert_eq!(count_active_matches(&pool, 1, 2).await, 0);
        }
        other => panic!("unexpected offer status {other}"),
    }
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn orphaned_guard_is_purged(pool: PgPool) {
    let engine = engine(pool.clone());
    let match_id = matched_pair(&engine, 1, 2).await;

    let report = engine.sweep_orphaned_guards(Utc::now()).await.unwrap();
    assert_eq!(report.processed, 0);

    // Terminal match whose guard release never ran.
    sqlx::query("UPDATE matches SET status = 'cancelled' WHERE id = $1")
        .bind(match_id)
        .execute(&pool)
        .await
        .unwrap();

    let report = engine.sweep_orphaned_guards(Utc::now()).await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(PairGuardRepo::find(&pool, 1, 2).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn housekeeping_purges_lapsed_cooldowns(pool: PgPool) {
    let engine = engine(pool.clone());
    let now = Utc::now();
    CooldownRepo::set_pair(&pool, 1, 2, now + Duration::hours(6))
        .await
        .unwrap();

    engine.sweep_idempotency_records(now).await.unwrap();
    assert!(CooldownRepo::is_active(&pool, 1, 2, now).await.unwrap());

    let report = engine
        .sweep_idempotency_records(now + Duration::hours(7))
        .await
        .unwrap();
    assert!(report.processed >= 1);
    assert!(!CooldownRepo::is_active(&pool, 2, 1, now).await.unwrap());
}
