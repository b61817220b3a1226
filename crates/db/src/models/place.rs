//! Place catalog rows (`places`).

use rendezvous_core::candidates::CatalogPlace;
use rendezvous_core::geo::GeoPoint;
use rendezvous_core::place_resolution::PlaceProvenance;
use rendezvous_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `places` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub locality_code: String,
    pub activities: Vec<String>,
    pub is_active: bool,
    pub opens_at_minute: Option<i32>,
    pub closes_at_minute: Option<i32>,
    pub is_custom: bool,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Place> for CatalogPlace {
    fn from(place: Place) -> Self {
        CatalogPlace {
            id: place.id,
            name: place.name,
            location: GeoPoint::new(place.lat, place.lng),
            activities: place.activities,
            is_active: place.is_active,
            opens_at_minute: place.opens_at_minute,
            closes_at_minute: place.closes_at_minute,
            provenance: if place.is_custom {
                PlaceProvenance::Custom
            } else {
                PlaceProvenance::Catalog
            },
        }
    }
}

/// Insert DTO for a catalog entry.
#[derive(Debug, Clone)]
pub struct NewPlace {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    pub activities: Vec<String>,
    pub opens_at_minute: Option<i32>,
    pub closes_at_minute: Option<i32>,
    pub is_custom: bool,
    pub created_by: Option<DbId>,
}
