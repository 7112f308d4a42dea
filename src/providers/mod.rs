// src/providers/mod.rs
//! External collaborator interfaces: geocoding, place/review lookup, and the
//! answer-generation LLM. Each is a capability trait with a stub
//! implementation used under test and in degraded mode; the real Naver-backed
//! implementations live in `naver.rs`.

pub mod naver;

use anyhow::{bail, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::geo::Coordinates;

/// One place candidate as returned by the map provider.
#[derive(Debug, Clone)]
pub struct PlaceCandidate {
    /// Provider-side id; absent for some sources.
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    pub category_tags: Vec<String>,
    pub distance_m: Option<f64>,
    pub address: Option<String>,
    pub coords: Option<Coordinates>,
}

/// One visitor review.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    pub text: String,
}

impl Review {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            author: None,
            rating: None,
            text: text.into(),
        }
    }
}

/// A place-search hit used as a geocoding fallback.
#[derive(Debug, Clone)]
pub struct PlaceSearchHit {
    pub name: String,
    pub address: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Forward-geocode free text; `Ok(None)` on a miss.
    async fn forward_geocode(&self, text: &str) -> Result<Option<Coordinates>>;
    /// Keyword place search; used when forward geocoding misses.
    async fn place_search(&self, text: &str, limit: usize) -> Result<Vec<PlaceSearchHit>>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait PlaceProvider: Send + Sync {
    /// One page of candidates around `center`. `category_filter` is the
    /// normalized place type; providers match it against category strings.
    async fn places_around(
        &self,
        center: Coordinates,
        radius_m: u32,
        offset: usize,
        page_size: usize,
        category_filter: Option<&str>,
    ) -> Result<Vec<PlaceCandidate>>;

    /// Up to `max_count` recent visitor reviews for one candidate.
    async fn reviews_for(&self, provider_place_id: &str, max_count: usize) -> Result<Vec<Review>>;

    fn name(&self) -> &'static str;
}

/// Answer-generation backend consuming the retrieval context.
/// Returning `None` means "no answer"; the caller falls back to the
/// deterministic answer text.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    async fn answer(&self, llm_context: &str, user_query: &str) -> Option<String>;
    fn provider_name(&self) -> &'static str;
}

// ------------------------------------------------------------
// Stubs
// ------------------------------------------------------------

/// Returns `None` always; used when answer generation is disabled.
pub struct DisabledAnswerer;

#[async_trait]
impl AnswerClient for DisabledAnswerer {
    async fn answer(&self, _llm_context: &str, _user_query: &str) -> Option<String> {
        None
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed-answer mock for tests.
pub struct FixedAnswerer(pub String);

#[async_trait]
impl AnswerClient for FixedAnswerer {
    async fn answer(&self, _llm_context: &str, _user_query: &str) -> Option<String> {
        Some(self.0.clone())
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Always-erroring provider; exercises the degraded paths.
pub struct Unavailable;

#[async_trait]
impl Geocoder for Unavailable {
    async fn forward_geocode(&self, _text: &str) -> Result<Option<Coordinates>> {
        bail!("geocoder unavailable")
    }
    async fn place_search(&self, _text: &str, _limit: usize) -> Result<Vec<PlaceSearchHit>> {
        bail!("geocoder unavailable")
    }
    fn name(&self) -> &'static str {
        "unavailable"
    }
}

#[async_trait]
impl PlaceProvider for Unavailable {
    async fn places_around(
        &self,
        _center: Coordinates,
        _radius_m: u32,
        _offset: usize,
        _page_size: usize,
        _category_filter: Option<&str>,
    ) -> Result<Vec<PlaceCandidate>> {
        bail!("place provider unavailable")
    }
    async fn reviews_for(&self, _id: &str, _max_count: usize) -> Result<Vec<Review>> {
        bail!("place provider unavailable")
    }
    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Fixed-table geocoder for tests and offline runs.
pub struct StubGeocoder;

const STUB_REGIONS: &[(&str, f64, f64)] = &[
    ("강남역", 37.4979, 127.0276),
    ("강남", 37.4979, 127.0276),
    ("홍대", 37.5563, 126.9220),
    ("서울역", 37.5547, 126.9706),
    ("충무로", 37.5613, 126.9940),
    ("잠실", 37.5133, 127.1001),
    ("해운대", 35.1587, 129.1604),
];

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn forward_geocode(&self, text: &str) -> Result<Option<Coordinates>> {
        let query = text.trim();
        Ok(STUB_REGIONS
            .iter()
            .find(|(name, _, _)| query.starts_with(name))
            .map(|(_, lat, lon)| Coordinates::new(*lat, *lon)))
    }

    async fn place_search(&self, text: &str, limit: usize) -> Result<Vec<PlaceSearchHit>> {
        let query = text.trim();
        Ok(STUB_REGIONS
            .iter()
            .filter(|(name, _, _)| query.contains(name))
            .take(limit)
            .map(|(name, _, _)| PlaceSearchHit {
                name: (*name).to_string(),
                address: (*name).to_string(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

// ------------------------------------------------------------
// Embedded nearby-places sample (degraded mode / tests)
// ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct SamplePlace {
    id: String,
    name: String,
    category: String,
    distance: f64,
    address: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct SampleDataset {
    places: Vec<SamplePlace>,
    reviews: std::collections::HashMap<String, Vec<String>>,
}

static NEARBY_SAMPLE: Lazy<SampleDataset> = Lazy::new(|| {
    let raw = include_str!("nearby_sample.json");
    serde_json::from_str(raw).expect("valid embedded nearby sample")
});

/// Place provider backed by the embedded sample dataset.
pub struct StubPlaceProvider {
    fail_reviews: bool,
}

impl Default for StubPlaceProvider {
    fn default() -> Self {
        Self { fail_reviews: false }
    }
}

impl StubPlaceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variant whose review endpoint always errors; candidates still resolve.
    pub fn with_failing_reviews() -> Self {
        Self { fail_reviews: true }
    }
}

#[async_trait]
impl PlaceProvider for StubPlaceProvider {
    async fn places_around(
        &self,
        _center: Coordinates,
        radius_m: u32,
        offset: usize,
        page_size: usize,
        category_filter: Option<&str>,
    ) -> Result<Vec<PlaceCandidate>> {
        let places = &NEARBY_SAMPLE.places;
        if offset >= places.len() {
            return Ok(Vec::new());
        }
        let end = (offset + page_size).min(places.len());
        let page = places[offset..end]
            .iter()
            .filter(|p| p.distance <= radius_m as f64)
            .filter(|p| match category_filter {
                Some(filter) => p.category.contains(filter),
                None => true,
            })
            .map(|p| PlaceCandidate {
                id: Some(p.id.clone()),
                name: p.name.clone(),
                category: p.category.clone(),
                category_tags: vec![p.category.clone()],
                distance_m: Some(p.distance),
                address: Some(p.address.clone()),
                coords: Some(Coordinates::new(p.lat, p.lon)),
            })
            .collect();
        Ok(page)
    }

    async fn reviews_for(&self, provider_place_id: &str, max_count: usize) -> Result<Vec<Review>> {
        if self.fail_reviews {
            bail!("review endpoint unavailable");
        }
        Ok(NEARBY_SAMPLE
            .reviews
            .get(provider_place_id)
            .map(|texts| {
                texts
                    .iter()
                    .take(max_count)
                    .map(|t| Review::text_only(t.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "embedded_sample"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_geocoder_hits_known_regions() {
        let g = StubGeocoder;
        let hit = g.forward_geocode("강남역").await.unwrap();
        assert!(hit.is_some());
        let miss = g.forward_geocode("아무데나").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn stub_place_provider_serves_sample_pages() {
        let p = StubPlaceProvider::new();
        let center = Coordinates::new(37.5613, 126.9940);
        let page = p
            .places_around(center, 1000, 0, 60, Some("카페"))
            .await
            .unwrap();
        assert!(page.len() >= 5, "sample should hold several cafes");

        let beyond = p
            .places_around(center, 1000, 60, 60, None)
            .await
            .unwrap();
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn stub_reviews_resolve_by_place_id() {
        let p = StubPlaceProvider::new();
        let center = Coordinates::new(37.5613, 126.9940);
        let page = p.places_around(center, 1000, 0, 60, None).await.unwrap();
        let first_id = page[0].id.clone().unwrap();
        let reviews = p.reviews_for(&first_id, 3).await.unwrap();
        assert!(!reviews.is_empty());
        assert!(reviews.len() <= 3);
    }
}
