//! Repository for the `places` catalog.

use sqlx::PgExecutor;

use crate::models::place::{NewPlace, Place};

/// Column list for `places` queries.
const COLUMNS: &str = "id, name, lat, lng, locality_code, activities, is_active, \
                       opens_at_minute, closes_at_minute, is_custom, created_by, \
                       created_at, updated_at";

/// Provides data access for the shared place catalog.
pub struct PlaceRepo;

impl PlaceRepo {
    /// Insert a catalog entry. An existing id is left untouched and returned.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewPlace,
    ) -> Result<Place, sqlx::Error> {
        let query = format!(
            "INSERT INTO places \
                (id, name, lat, lng, locality_code, activities, opens_at_minute, \
                 closes_at_minute, is_custom, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET id = places.id \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Place>(&query)
            .bind(&input.id)
            .bind(&input.name)
            .bind(input.location.lat)
            .bind(input.location.lng)
            .bind(input.location.locality_code())
            .bind(&input.activities)
            .bind(input.opens_at_minute)
            .bind(input.closes_at_minute)
            .bind(input.is_custom)
            .bind(input.created_by)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: &str,
    ) -> Result<Option<Place>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM places WHERE id = $1");
        sqlx::query_as::<_, Place>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Active places whose locality code starts with one of `cells`.
    ///
    /// This is the coarse range query; exact distance, opening hours and
    /// activity filtering happen in the candidate search.
    pub async fn list_active_in_cells<'e, E: PgExecutor<'e>>(
        executor: E,
        cells: &[String],
    ) -> Result<Vec<Place>, sqlx::Error> {
        let patterns: Vec<String> = cells.iter().map(|c| format!("{c}%")).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM places \
             WHERE is_active AND locality_code LIKE ANY($1) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Place>(&query)
            .bind(&patterns)
            .fetch_all(executor)
            .await
    }
}
