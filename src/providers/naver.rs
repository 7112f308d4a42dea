// src/providers/naver.rs
//! Naver-backed geocoder and place/review provider.
//!
//! Credentials come from the environment:
//! - `NAVER_MAP_CLIENT_ID` / `NAVER_MAP_CLIENT_SECRET` (cloud geocoding API)
//! - `NAVER_SEARCH_CLIENT_ID` / `NAVER_SEARCH_CLIENT_SECRET` (local search API)
//!
//! Missing credentials make the corresponding call a clean miss instead of an
//! error, so the pipeline degrades rather than failing.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::geo::Coordinates;
use crate::providers::{Geocoder, PlaceCandidate, PlaceProvider, PlaceSearchHit, Review};

const GEOCODE_URL: &str = "https://maps.apigw.ntruss.com/map-geocode/v2/geocode";
const LOCAL_SEARCH_URL: &str = "https://openapi.naver.com/v1/search/local.json";
const SMART_AROUND_URL: &str = "https://map.naver.com/p/api/smart-around/places";
const PLACE_GRAPHQL_URL: &str = "https://pcmap-api.place.naver.com/place/graphql";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

fn build_http() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(10))
        .build()
        .context("reqwest client")
}

fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Forward geocoding + keyword search against the Naver open APIs.
pub struct NaverGeocoder {
    http: reqwest::Client,
    map_client_id: String,
    map_client_secret: String,
    search_client_id: String,
    search_client_secret: String,
}

impl NaverGeocoder {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http: build_http()?,
            map_client_id: std::env::var("NAVER_MAP_CLIENT_ID").unwrap_or_default(),
            map_client_secret: std::env::var("NAVER_MAP_CLIENT_SECRET").unwrap_or_default(),
            search_client_id: std::env::var("NAVER_SEARCH_CLIENT_ID").unwrap_or_default(),
            search_client_secret: std::env::var("NAVER_SEARCH_CLIENT_SECRET").unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Geocoder for NaverGeocoder {
    async fn forward_geocode(&self, text: &str) -> Result<Option<Coordinates>> {
        if self.map_client_id.is_empty() || self.map_client_secret.is_empty() {
            return Ok(None);
        }
        let resp = self
            .http
            .get(GEOCODE_URL)
            .query(&[("query", text)])
            .header("x-ncp-apigw-api-key-id", &self.map_client_id)
            .header("x-ncp-apigw-api-key", &self.map_client_secret)
            .send()
            .await
            .context("geocode request")?;
        if !resp.status().is_success() {
            anyhow::bail!("geocode endpoint returned {}", resp.status());
        }
        let body: Value = resp.json().await.context("geocode body")?;
        let Some(first) = body
            .get("addresses")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
        else {
            return Ok(None);
        };
        // Naver returns x = longitude, y = latitude, both as strings.
        let lon = first.get("x").and_then(value_f64);
        let lat = first.get("y").and_then(value_f64);
        Ok(match (lat, lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        })
    }

    async fn place_search(&self, text: &str, limit: usize) -> Result<Vec<PlaceSearchHit>> {
        if self.search_client_id.is_empty() || self.search_client_secret.is_empty() {
            return Ok(Vec::new());
        }
        let display = limit.to_string();
        let resp = self
            .http
            .get(LOCAL_SEARCH_URL)
            .query(&[("query", text), ("display", display.as_str())])
            .header("X-Naver-Client-Id", &self.search_client_id)
            .header("X-Naver-Client-Secret", &self.search_client_secret)
            .send()
            .await
            .context("local search request")?;
        if !resp.status().is_success() {
            anyhow::bail!("local search returned {}", resp.status());
        }
        let body: Value = resp.json().await.context("local search body")?;
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(items
            .iter()
            .filter_map(|item| {
                let name = item.get("title").and_then(Value::as_str)?;
                let address = item
                    .get("roadAddress")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .or_else(|| item.get("address").and_then(Value::as_str))?;
                Some(PlaceSearchHit {
                    name: strip_markup(name),
                    address: address.to_string(),
                })
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "naver"
    }
}

/// Search-result titles embed `<b>` highlights.
fn strip_markup(s: &str) -> String {
    static TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    re.replace_all(s, "").to_string()
}

/// Nearby-place and visitor-review provider over the public map endpoints.
pub struct NaverPlaceProvider {
    http: reqwest::Client,
}

impl NaverPlaceProvider {
    pub fn new() -> Result<Self> {
        Ok(Self { http: build_http()? })
    }
}

#[async_trait]
impl PlaceProvider for NaverPlaceProvider {
    async fn places_around(
        &self,
        center: Coordinates,
        radius_m: u32,
        offset: usize,
        page_size: usize,
        category_filter: Option<&str>,
    ) -> Result<Vec<PlaceCandidate>> {
        // searchCoord is "longitude;latitude".
        let coord = format!("{};{}", center.lon, center.lat);
        let limit = page_size.to_string();
        let offset = offset.to_string();
        let resp = self
            .http
            .get(SMART_AROUND_URL)
            .query(&[
                ("searchCoord", coord.as_str()),
                ("limit", limit.as_str()),
                ("sortType", "RECOMMEND"),
                ("offset", offset.as_str()),
            ])
            .header("Accept-Language", "ko-KR,ko;q=0.8,en-US;q=0.6,en;q=0.4")
            .header("referer", "https://map.naver.com/p?c=15.00,0,0,0,dh")
            .send()
            .await
            .context("smart-around request")?;
        if !resp.status().is_success() {
            anyhow::bail!("smart-around returned {}", resp.status());
        }
        let body: Value = resp.json().await.context("smart-around body")?;
        let items = body
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut places = Vec::new();
        for item in &items {
            // The API reports distance in kilometers.
            let Some(dist_m) = item.get("distance").and_then(value_f64).map(|km| km * 1000.0)
            else {
                continue;
            };
            if dist_m > radius_m as f64 {
                continue;
            }

            let tags: Vec<String> = item
                .get("category")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let category_name = item
                .get("categoryName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if let Some(filter) = category_filter {
                let in_name = category_name.contains(filter);
                let in_tags = tags.iter().any(|t| t.contains(filter));
                if !in_name && !in_tags {
                    continue;
                }
            }

            let Some(name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            let lat = item.get("y").and_then(value_f64);
            let lon = item.get("x").and_then(value_f64);

            places.push(PlaceCandidate {
                id: item.get("id").and_then(Value::as_str).map(str::to_string),
                name: name.to_string(),
                category: category_name,
                category_tags: tags,
                distance_m: Some(dist_m),
                address: item
                    .get("roadAddress")
                    .or_else(|| item.get("address"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                coords: match (lat, lon) {
                    (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
                    _ => None,
                },
            });
        }
        Ok(places)
    }

    async fn reviews_for(&self, provider_place_id: &str, max_count: usize) -> Result<Vec<Review>> {
        let payload = serde_json::json!({
            "operationName": "getVisitorReviews",
            "query": "query getVisitorReviews($input: VisitorReviewsInput) { visitorReviews(input: $input) { total items { id body translatedText created } } }",
            "variables": {
                "input": {
                    "businessId": provider_place_id,
                    "businessType": "restaurant",
                    "includeContent": true,
                    "page": 1,
                    "size": max_count,
                    "sort": "recent"
                }
            }
        });
        let resp = self
            .http
            .post(PLACE_GRAPHQL_URL)
            .json(&payload)
            .send()
            .await
            .context("review request")?;
        if !resp.status().is_success() {
            anyhow::bail!("review endpoint returned {}", resp.status());
        }
        let body: Value = resp.json().await.context("review body")?;
        let items = body
            .get("data")
            .and_then(|d| d.get("visitorReviews"))
            .and_then(|v| v.get("items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(items
            .iter()
            .filter_map(|item| {
                let text = item
                    .get("body")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| item.get("translatedText").and_then(Value::as_str))?;
                Some(Review::text_only(text.trim().to_string()))
            })
            .take(max_count)
            .collect())
    }

    fn name(&self) -> &'static str {
        "naver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_stripped_from_titles() {
        assert_eq!(strip_markup("<b>스타벅스</b> 동국대점"), "스타벅스 동국대점");
    }

    #[test]
    fn string_numbers_coerce() {
        assert_eq!(value_f64(&serde_json::json!("0.42")), Some(0.42));
        assert_eq!(value_f64(&serde_json::json!(1.5)), Some(1.5));
        assert_eq!(value_f64(&serde_json::json!(null)), None);
    }
}
