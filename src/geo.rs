// src/geo.rs
//! Coordinate resolution for location phrases extracted from the user query.
//!
//! Resolution order:
//! 1. Relative phrases ("이 근처", "여기", ...) skip geocoding entirely.
//! 2. Forward geocoding of the raw phrase.
//! 3. On a miss, a place search; the first hit's address is geocoded instead.
//! 4. Anything else falls back to the caller-supplied coordinates.
//!
//! The resolver never fails: every path ends in *some* coordinate pair.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::providers::Geocoder;

/// WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Phrases that refer to the caller's current position; geocoding them is pointless.
const RELATIVE_PHRASES: &[&str] = &["이 근처", "여기", "근처", "이 동네", "이 근방"];

pub fn is_relative_phrase(location: &str) -> bool {
    RELATIVE_PHRASES.contains(&location.trim())
}

/// Turn a location phrase into coordinates, falling back to `fallback` on any miss.
pub async fn resolve_coordinates(
    geocoder: &dyn Geocoder,
    location: Option<&str>,
    fallback: Coordinates,
) -> Coordinates {
    let Some(raw) = location else {
        return fallback;
    };
    let location = raw.trim();
    if location.is_empty() || is_relative_phrase(location) {
        debug!(target: "geo", "relative or empty location phrase, using fallback");
        return fallback;
    }

    // 1) Direct forward geocoding of the phrase.
    match geocoder.forward_geocode(location).await {
        Ok(Some(coords)) => {
            debug!(target: "geo", provider = geocoder.name(), lat = coords.lat, lon = coords.lon, "forward geocode hit");
            return coords;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(target: "geo", error = ?e, "forward geocode failed");
            return fallback;
        }
    }

    // 2) Place search, then geocode the first hit's address.
    match geocoder.place_search(location, 1).await {
        Ok(hits) => {
            if let Some(hit) = hits.first() {
                if let Ok(Some(coords)) = geocoder.forward_geocode(&hit.address).await {
                    debug!(target: "geo", provider = geocoder.name(), "geocoded via place search");
                    return coords;
                }
            }
        }
        Err(e) => {
            warn!(target: "geo", error = ?e, "place search failed");
        }
    }

    fallback
}

/// Great-circle distance between two coordinates in meters (haversine).
pub fn haversine_meters(a: Coordinates, b: Coordinates) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}
