//! Geographic primitives: points, great-circle distance, midpoints, the
//! operating region, and geohash locality codes used for range queries.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Precision used when storing a locality code for a presence or place.
pub const STORED_GEOHASH_PRECISION: usize = 9;

/// Geohash base-32 alphabet.
const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` if both components are finite and within WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// Geographic midpoint between two points along the great circle.
    pub fn midpoint(&self, other: &GeoPoint) -> GeoPoint {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let lng1 = self.lng.to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let bx = lat2.cos() * dlng.cos();
        let by = lat2.cos() * dlng.sin();

        let lat = (lat1.sin() + lat2.sin()).atan2(((lat1.cos() + bx).powi(2) + by.powi(2)).sqrt());
        let lng = lng1 + by.atan2(lat1.cos() + bx);

        GeoPoint {
            lat: lat.to_degrees(),
            lng: (lng.to_degrees() + 540.0) % 360.0 - 180.0,
        }
    }

    /// Locality code stored alongside rows for prefix range queries.
    pub fn locality_code(&self) -> String {
        encode_geohash(self, STORED_GEOHASH_PRECISION)
    }
}

/// Pick the search center for a pair: the midpoint of both points, or
/// whichever one is known, or the fallback.
pub fn search_center(a: Option<GeoPoint>, b: Option<GeoPoint>, fallback: GeoPoint) -> GeoPoint {
    match (a, b) {
        (Some(a), Some(b)) => a.midpoint(&b),
        (Some(p), None) | (None, Some(p)) => p,
        (None, None) => fallback,
    }
}

// ---------------------------------------------------------------------------
// Operating region
// ---------------------------------------------------------------------------

/// Rectangular operating region. Presence locations outside it are rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl RegionBounds {
    /// The whole globe.
    pub const WORLD: RegionBounds = RegionBounds {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lng: -180.0,
        max_lng: 180.0,
    };

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.is_valid()
            && (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

/// Validate a location against the operating region.
pub fn validate_location(point: &GeoPoint, region: &RegionBounds) -> Result<(), String> {
    if !point.is_valid() {
        return Err(format!(
            "Location ({}, {}) is not a valid coordinate",
            point.lat, point.lng
        ));
    }
    if !region.contains(point) {
        return Err("Location is outside the operating region".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Geohash
// ---------------------------------------------------------------------------

/// Encode a point as a geohash of the given precision (characters).
pub fn encode_geohash(point: &GeoPoint, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lng_range = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bit = 0;
    let mut idx = 0usize;

    while hash.len() < precision {
        if even_bit {
            let mid = (lng_range.0 + lng_range.1) / 2.0;
            if point.lng >= mid {
                idx = idx * 2 + 1;
                lng_range.0 = mid;
            } else {
                idx *= 2;
                lng_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if point.lat >= mid {
                idx = idx * 2 + 1;
                lat_range.0 = mid;
            } else {
                idx *= 2;
                lat_range.1 = mid;
            }
        }
        even_bit = !even_bit;

        bit += 1;
        if bit == 5 {
            hash.push(BASE32[idx] as char);
            bit = 0;
            idx = 0;
        }
    }

    hash
}

/// Cell size in degrees `(lat_height, lng_width)` for a geohash precision.
fn cell_size_degrees(precision: usize) -> (f64, f64) {
    let bits = 5 * precision as i32;
    let lng_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    (180.0 / 2f64.powi(lat_bits), 360.0 / 2f64.powi(lng_bits))
}

/// Largest precision whose cells are at least `radius_m` tall and wide at
/// the given latitude, so a cell plus its eight neighbours covers the radius.
pub fn precision_for_radius(radius_m: f64, lat: f64) -> usize {
    let lng_scale = lat.to_radians().cos().abs().max(0.01);
    let mut chosen = 1;
    for precision in 1..=STORED_GEOHASH_PRECISION {
        let (h, w) = cell_size_degrees(precision);
        let height_m = h * METERS_PER_DEGREE;
        let width_m = w * METERS_PER_DEGREE * lng_scale;
        if height_m >= radius_m && width_m >= radius_m {
            chosen = precision;
        } else {
            break;
        }
    }
    chosen
}

/// Geohash prefixes (the center cell and its neighbours) whose union covers
/// a circle of `radius_m` around `center`. Deduplicated and sorted.
pub fn covering_cells(center: &GeoPoint, radius_m: f64) -> Vec<String> {
    let precision = precision_for_radius(radius_m, center.lat);
    let (h, w) = cell_size_degrees(precision);

    let mut cells: Vec<String> = Vec::with_capacity(9);
    for dlat in [-1.0, 0.0, 1.0] {
        for dlng in [-1.0, 0.0, 1.0] {
            let lat = (center.lat + dlat * h).clamp(-90.0, 90.0);
            let mut lng = center.lng + dlng * w;
            if lng > 180.0 {
                lng -= 360.0;
            } else if lng < -180.0 {
                lng += 360.0;
            }
            cells.push(encode_geohash(&GeoPoint::new(lat, lng), precision));
        }
    }
    cells.sort();
    cells.dedup();
    cells
}
