//! Tiered candidate search against the stored catalog.

mod common;

use chrono::Utc;
use common::{center, north_of, seed_place};
use rendezvous_core::candidates::CandidateQuery;
use rendezvous_engine::places::find_candidates;
use sqlx::PgPool;

async fn seed_line(pool: &PgPool) {
    seed_place(pool, "osm:a", north_of(center(), 100.0)).await;
    seed_place(pool, "osm:b", north_of(center(), 400.0)).await;
    seed_place(pool, "osm:c", north_of(center(), 900.0)).await;
}

fn query(tiers: &[f64], soft_min: usize, hard_cap: usize) -> CandidateQuery {
    CandidateQuery {
        center: center(),
        activity_filter: Some("coffee".to_string()),
        hard_cap,
        soft_min,
        radius_tiers_m: tiers.to_vec(),
    }
}

fn ranked(candidates: &[rendezvous_core::place_resolution::PlaceCandidate]) -> Vec<(&str, i32)> {
    candidates
        .iter()
        .map(|c| (c.place_id.as_str(), c.rank))
        .collect()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn widens_until_soft_minimum(pool: PgPool) {
    seed_line(&pool).await;

    let found = find_candidates(&pool, &query(&[1000.0, 250.0], 2, 5), Utc::now())
        .await
        .unwrap();
    assert_eq!(ranked(&found), vec![("osm:a", 1), ("osm:b", 2), ("osm:c", 3)]);

    let narrow = find_candidates(&pool, &query(&[1000.0, 250.0], 1, 5), Utc::now())
        .await
        .unwrap();
    assert_eq!(ranked(&narrow), vec![("osm:a", 1)]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn hard_cap_truncates_nearest_first(pool: PgPool) {
    seed_line(&pool).await;

    let found = find_candidates(&pool, &query(&[1000.0], 1, 2), Utc::now())
        .await
        .unwrap();
    assert_eq!(ranked(&found), vec![("osm:a", 1), ("osm:b", 2)]);
    assert!(found[0].distance_m < found[1].distance_m);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn activity_and_tiers_gate_results(pool: PgPool) {
    seed_line(&pool).await;

    let mut tennis = query(&[1000.0], 1, 5);
    tennis.activity_filter = Some("tennis".to_string());
    assert!(find_candidates(&pool, &tennis, Utc::now()).await.unwrap().is_empty());

    assert!(find_candidates(&pool, &query(&[], 1, 5), Utc::now())
        .await
        .unwrap()
        .is_empty());
}
