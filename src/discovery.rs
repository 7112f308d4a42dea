// src/discovery.rs
//! # Merchant Discovery
//! Collects nearby merchants for `(center, place_type)`: paginates the map
//! provider, filters by normalized category, samples down to the target
//! count, and fetches recent reviews per candidate under a concurrency cap.
//!
//! Per-candidate review failures substitute an empty list; only a fully empty
//! candidate set yields `success = false`, and callers treat that as
//! "no merchants" rather than an error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::geo::{haversine_meters, Coordinates};
use crate::providers::{PlaceCandidate, PlaceProvider, Review};

/// Hard cap on reviews attached per store.
pub const MAX_REVIEWS_PER_STORE: usize = 5;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "discovery_candidates_total",
            "Candidates collected from the place provider."
        );
        describe_counter!(
            "discovery_review_errors_total",
            "Per-candidate review fetch failures."
        );
    });
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub radius_m: u32,
    /// Target number of merchants (N).
    pub max_places: usize,
    /// Reviews requested per merchant (R).
    pub reviews_per_place: usize,
    pub page_size: usize,
    pub max_pages: usize,
    /// Concurrency cap for review fetches.
    pub review_concurrency: usize,
    /// Seed for the uniform candidate sample; fixed seed = stable sample.
    pub sample_seed: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            radius_m: 1_000,
            max_places: 10,
            reviews_per_place: 3,
            page_size: 60,
            max_pages: 10,
            review_concurrency: 4,
            sample_seed: 0x6265_6e65_6669_7473,
        }
    }
}

/// Discovery result, keyed by merchant display name; downstream stages join
/// on the name.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryData {
    pub success: bool,
    pub message: String,
    pub stores: Vec<String>,
    pub reviews: HashMap<String, Vec<Review>>,
    pub distances: HashMap<String, f64>,
    pub locations: HashMap<String, Coordinates>,
    pub addresses: HashMap<String, String>,
    pub categories: HashMap<String, String>,
    pub meta: DiscoveryMeta,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryMeta {
    pub source: String,
    pub place_type: Option<String>,
    pub attributes: Vec<String>,
    pub coordinates: Option<Coordinates>,
}

impl DiscoveryData {
    /// Empty result used for degraded discovery.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Normalize a user-facing place type to the provider's category vocabulary:
/// "맛집" becomes "음식점" and a trailing "집" is stripped ("중식집" → "중식").
pub fn normalize_place_type(place_type: &str) -> Option<String> {
    let pt = place_type.trim();
    if pt.is_empty() {
        return None;
    }
    if pt == "맛집" {
        return Some("음식점".to_string());
    }
    if pt.chars().count() > 1 {
        if let Some(stripped) = pt.strip_suffix('집') {
            return Some(stripped.to_string());
        }
    }
    Some(pt.to_string())
}

/// Preference words are not categories; they search as plain restaurants.
pub fn map_to_search_term(place_type: &str) -> String {
    const PREFERENCE_WORDS: &[&str] = &["분위기", "가성비", "모임", "회식", "총합", "전체"];
    let trimmed = place_type.trim();
    if PREFERENCE_WORDS.contains(&trimmed) {
        "음식점".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalize crawled review text: entity-decode, strip tags, collapse
/// whitespace.
pub fn normalize_review_text(raw: &str) -> String {
    let mut out = html_escape::decode_html_entities(raw).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Run discovery end to end for one request.
pub async fn discover(
    provider: Arc<dyn PlaceProvider>,
    center: Coordinates,
    place_type: Option<&str>,
    attributes: &[String],
    cfg: &DiscoveryConfig,
) -> DiscoveryData {
    ensure_metrics_described();

    let search_term = place_type
        .map(map_to_search_term)
        .as_deref()
        .and_then(normalize_place_type);

    // 1) Paginate until enough candidates are gathered, deduping by
    //    provider id. Ids may be absent; such candidates are always kept.
    let mut candidates: Vec<PlaceCandidate> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut offset = 0usize;

    for _ in 0..cfg.max_pages {
        if candidates.len() >= cfg.max_places {
            break;
        }
        let batch = match provider
            .places_around(
                center,
                cfg.radius_m,
                offset,
                cfg.page_size,
                search_term.as_deref(),
            )
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(target: "discovery", error = ?e, provider = provider.name(), "places_around failed");
                break;
            }
        };
        if batch.is_empty() {
            break;
        }
        for place in batch {
            if let Some(id) = &place.id {
                if !seen_ids.insert(id.clone()) {
                    continue;
                }
            }
            candidates.push(place);
            if candidates.len() >= cfg.max_places {
                break;
            }
        }
        offset += cfg.page_size;
    }

    counter!("discovery_candidates_total").increment(candidates.len() as u64);

    if candidates.is_empty() {
        debug!(target: "discovery", ?search_term, "no candidates found");
        return DiscoveryData {
            meta: DiscoveryMeta {
                source: provider.name().to_string(),
                place_type: place_type.map(str::to_string),
                attributes: attributes.to_vec(),
                coordinates: Some(center),
            },
            ..DiscoveryData::unavailable("주변 매장을 찾지 못했습니다.")
        };
    }

    // 2) Uniform sample without replacement, stable for a fixed seed.
    let selected: Vec<PlaceCandidate> = if candidates.len() > cfg.max_places {
        let mut rng = StdRng::seed_from_u64(cfg.sample_seed);
        rand::seq::index::sample(&mut rng, candidates.len(), cfg.max_places)
            .into_iter()
            .map(|i| candidates[i].clone())
            .collect()
    } else {
        candidates
    };

    // 3) Review fetches, concurrent under the per-stage cap. Failures
    //    substitute an empty list for that candidate only.
    let semaphore = Arc::new(Semaphore::new(cfg.review_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (idx, candidate) in selected.iter().enumerate() {
        let provider = Arc::clone(&provider);
        let semaphore = Arc::clone(&semaphore);
        let place_id = candidate.id.clone();
        let count = cfg.reviews_per_place;
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let reviews = match place_id {
                Some(pid) => match provider.reviews_for(&pid, count).await {
                    Ok(reviews) => reviews,
                    Err(e) => {
                        warn!(target: "discovery", error = ?e, place_id = %pid, "review fetch failed");
                        counter!("discovery_review_errors_total").increment(1);
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            (idx, reviews)
        });
    }

    let mut reviews_by_idx: Vec<Vec<Review>> = vec![Vec::new(); selected.len()];
    while let Some(joined) = tasks.join_next().await {
        if let Ok((idx, reviews)) = joined {
            reviews_by_idx[idx] = reviews;
        }
    }

    // 4) Assemble the name-keyed output.
    let mut data = DiscoveryData {
        success: true,
        message: "주변 매장 검색 완료".to_string(),
        meta: DiscoveryMeta {
            source: provider.name().to_string(),
            place_type: place_type.map(str::to_string),
            attributes: attributes.to_vec(),
            coordinates: Some(center),
        },
        ..Default::default()
    };

    for (candidate, reviews) in selected.into_iter().zip(reviews_by_idx) {
        let name = candidate.name.clone();

        let distance = candidate.distance_m.or_else(|| {
            candidate
                .coords
                .map(|coords| haversine_meters(center, coords))
        });
        if let Some(d) = distance {
            data.distances.insert(name.clone(), round2(d));
        }
        if let Some(coords) = candidate.coords {
            data.locations.insert(name.clone(), coords);
        }
        if let Some(address) = candidate.address.clone() {
            data.addresses.insert(name.clone(), address);
        }
        data.categories.insert(name.clone(), candidate.category.clone());

        let normalized: Vec<Review> = reviews
            .into_iter()
            .take(MAX_REVIEWS_PER_STORE)
            .map(|mut r| {
                r.text = normalize_review_text(&r.text);
                r
            })
            .filter(|r| !r.text.is_empty())
            .collect();
        data.reviews.insert(name.clone(), normalized);

        data.stores.push(name);
    }

    data
}
