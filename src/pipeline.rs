// src/pipeline.rs
//! # Pipeline Orchestrator
//! Drives the full query-to-recommendations run:
//! validate → extract keywords → geocode → discover merchants → resolve
//! discounts → rank → build retrieval context → answer.
//!
//! Stage failures and timeouts degrade to empty output and advance the run;
//! only validation failure rejects the request. I/O stages run under
//! per-stage deadlines; intra-phase fan-out uses `tokio::join!`. Dropping the
//! returned future cancels in-flight work (review fetches and resolver tasks
//! live in `JoinSet`s, which abort on drop).

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::catalog::{DiscountCatalog, DiscountResolver, ResolveOutcome};
use crate::discount::DEFAULT_REFERENCE_AMOUNT;
use crate::discovery::{self, DiscoveryConfig, DiscoveryData};
use crate::filter::{self, llm::KeywordExtractor};
use crate::geo::{self, Coordinates};
use crate::profile::UserProfile;
use crate::providers::{AnswerClient, Geocoder, PlaceProvider};
use crate::rank::{self, Rankings};
use crate::retrieval::{RetrievalBuilder, RetrievalOutput, Variant};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_requests_total", "Requests entering the pipeline.");
        describe_counter!("pipeline_rejected_total", "Requests rejected by validation.");
        describe_counter!(
            "pipeline_stage_degraded_total",
            "Stages degraded to empty output."
        );
        describe_histogram!("pipeline_latency_ms", "End-to-end pipeline latency.");
    });
}

/// Per-stage deadlines. A timeout degrades the stage, never the request.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    pub geocode: std::time::Duration,
    pub discovery: std::time::Duration,
    pub discount_resolve: std::time::Duration,
    pub ranking: std::time::Duration,
    pub context_build: std::time::Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            geocode: std::time::Duration::from_secs(2),
            discovery: std::time::Duration::from_secs(15),
            discount_resolve: std::time::Duration::from_secs(5),
            ranking: std::time::Duration::from_millis(500),
            context_build: std::time::Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timeouts: StageTimeouts,
    pub reference_amount: i64,
    pub top_k: usize,
    /// Used when neither the request nor the profile carries coordinates.
    pub default_coords: Coordinates,
    pub discovery: DiscoveryConfig,
    pub variant: Variant,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeouts: StageTimeouts::default(),
            reference_amount: DEFAULT_REFERENCE_AMOUNT,
            top_k: crate::retrieval::DEFAULT_TOP_K,
            // 충무로역 일대.
            default_coords: Coordinates::new(37.5613, 126.9940),
            discovery: DiscoveryConfig::default(),
            variant: Variant::Baseline,
        }
    }
}

/// Pipeline state reached by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Received,
    Filtered,
    Geocoded,
    Discovered,
    Resolved,
    Ranked,
    ContextBuilt,
    Answered,
    Degraded,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub stage: Stage,
    pub degraded: Vec<String>,
}

/// Request contract. `variant` is honored by evaluation harnesses that build
/// one pipeline per variant; a running pipeline keeps its constructed variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendRequest {
    pub user_query: String,
    pub user_profile: Option<UserProfile>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub session_id: Option<String>,
    pub variant: Option<Variant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub merchants: Rankings,
    pub retrieval: RetrievalOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub diagnostics: Diagnostics,
}

impl RecommendResponse {
    fn rejected(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            merchants: Rankings::default(),
            retrieval: RetrievalOutput {
                top_k: Vec::new(),
                llm_context: String::new(),
                fallback_answer: String::new(),
                total_documents: 0,
            },
            answer: None,
            diagnostics: Diagnostics {
                stage: Stage::Rejected,
                degraded: Vec::new(),
            },
        }
    }
}

/// The orchestrator. Collaborators are wired at construction; the ablation
/// variant is fixed per instance.
pub struct Pipeline {
    geocoder: Arc<dyn Geocoder>,
    places: Arc<dyn PlaceProvider>,
    resolver: DiscountResolver,
    retrieval: RetrievalBuilder,
    keywords: KeywordExtractor,
    answerer: Arc<dyn AnswerClient>,
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        places: Arc<dyn PlaceProvider>,
        catalog: Arc<dyn DiscountCatalog>,
        answerer: Arc<dyn AnswerClient>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            geocoder,
            places,
            resolver: DiscountResolver::new(catalog),
            retrieval: RetrievalBuilder::new(cfg.variant).with_top_k(cfg.top_k),
            keywords: KeywordExtractor::rule_based(),
            answerer,
            cfg,
        }
    }

    /// Wire an LLM keyword extractor in front of the rule tables.
    pub fn with_keyword_llm(mut self, llm: Arc<dyn filter::llm::KeywordClient>) -> Self {
        self.keywords = KeywordExtractor::with_llm(llm);
        self
    }

    /// Drop a session's retrieval documents.
    pub fn clear_session(&self, session_id: &str) {
        self.retrieval.clear_session(session_id);
    }

    /// Run one request end to end. Infallible by contract: validation
    /// failures reject, everything else degrades.
    pub async fn handle(&self, request: RecommendRequest) -> RecommendResponse {
        ensure_metrics_described();
        counter!("pipeline_requests_total").increment(1);
        let t0 = Instant::now();

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let query_hash = anon_hash(&request.user_query);
        info!(target: "pipeline", hash = %query_hash, session = %session_id, "request received");

        let mut degraded: Vec<String> = Vec::new();

        // --- FILTERED ---------------------------------------------------
        let validation = filter::validate(&request.user_query, request.user_profile.as_ref());
        if !validation.ok {
            counter!("pipeline_rejected_total").increment(1);
            info!(target: "pipeline", hash = %query_hash, reason = %validation.message, "request rejected");
            return RecommendResponse::rejected(validation.message);
        }
        let query = validation.query.unwrap_or_default();

        let keywords = self.keywords.extract(&query).await;
        if keywords.place_type.is_none() {
            // Best-effort discovery without a place type.
            info!(target: "pipeline", hash = %query_hash, "no place type extracted, degraded discovery mode");
        }

        // --- GEOCODED (geocoding and profile normalization fan out) -----
        let fallback = request
            .latitude
            .zip(request.longitude)
            .map(|(lat, lon)| Coordinates::new(lat, lon))
            .or_else(|| request.user_profile.as_ref().and_then(|p| p.coords()))
            .unwrap_or(self.cfg.default_coords);

        let geocode_fut = timeout(
            self.cfg.timeouts.geocode,
            geo::resolve_coordinates(self.geocoder.as_ref(), keywords.location.as_deref(), fallback),
        );
        let profile_fut = async {
            request
                .user_profile
                .as_ref()
                .map(UserProfile::normalized)
        };
        let (geocoded, profile) = tokio::join!(geocode_fut, profile_fut);
        let center = match geocoded {
            Ok(coords) => coords,
            Err(_) => {
                warn!(target: "pipeline", "geocode timed out");
                degraded.push("geocode".to_string());
                fallback
            }
        };

        // --- DISCOVERED -------------------------------------------------
        let discovery_result = timeout(
            self.cfg.timeouts.discovery,
            discovery::discover(
                Arc::clone(&self.places),
                center,
                keywords.place_type.as_deref(),
                &keywords.attributes,
                &self.cfg.discovery,
            ),
        )
        .await;
        let discovery = match discovery_result {
            Ok(data) => {
                if !data.success {
                    degraded.push("discovery".to_string());
                }
                data
            }
            Err(_) => {
                warn!(target: "pipeline", "discovery timed out");
                degraded.push("discovery".to_string());
                DiscoveryData::unavailable("주변 매장 검색이 시간 내에 끝나지 않았습니다.")
            }
        };

        let norm_profile = profile.clone().unwrap_or_default();

        // No merchants: skip resolve/rank and answer with the notice.
        if discovery.stores.is_empty() {
            let rankings = Rankings::default();
            let output =
                self.retrieval
                    .process(&session_id, &query, &discovery, &rankings, profile.as_ref());
            return self
                .finish(query, session_id, rankings, output, degraded, t0)
                .await;
        }

        // --- RESOLVED (resolver and distance precompute fan out) --------
        let now = chrono::Local::now().naive_local();
        let resolve_fut = timeout(
            self.cfg.timeouts.discount_resolve,
            self.resolver.resolve(&norm_profile, &discovery.stores, now),
        );
        let order_fut = async { rank::distance_order(&discovery.stores, &discovery.distances) };
        let (resolve_result, distance_order) = tokio::join!(resolve_fut, order_fut);

        let outcome = match resolve_result {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(target: "pipeline", "discount resolve timed out");
                degraded.push("discount_resolve".to_string());
                ResolveOutcome {
                    success: false,
                    message: "할인 정보 조회가 시간 내에 끝나지 않았습니다.".to_string(),
                    total: 0,
                    results: Vec::new(),
                }
            }
        };

        // --- RANKED -----------------------------------------------------
        // Ranking and context assembly are CPU-only and run on this task;
        // their budgets bound the stages but cannot preempt mid-computation.
        let payload = serde_json::to_value(&outcome).unwrap_or(Value::Null);
        let rankings = match timeout(self.cfg.timeouts.ranking, async {
            rank::rank_with_distance_order(
                &discovery.stores,
                &payload,
                &discovery.distances,
                &norm_profile,
                self.cfg.reference_amount,
                &distance_order,
            )
        })
        .await
        {
            Ok(rankings) => rankings,
            Err(_) => {
                degraded.push("ranking".to_string());
                Rankings::default()
            }
        };

        // --- CONTEXT_BUILT ----------------------------------------------
        let output = match timeout(self.cfg.timeouts.context_build, async {
            self.retrieval
                .process(&session_id, &query, &discovery, &rankings, profile.as_ref())
        })
        .await
        {
            Ok(output) => output,
            Err(_) => {
                degraded.push("context_build".to_string());
                RetrievalOutput {
                    top_k: Vec::new(),
                    llm_context: format!("사용자 요청: {query}\n검색된 매장이 없습니다."),
                    fallback_answer: format!(
                        "'{query}'에 대한 추천 정보를 찾지 못했습니다. 다른 위치나 조건으로 다시 요청해 주세요."
                    ),
                    total_documents: 0,
                }
            }
        };

        self.finish(query, session_id, rankings, output, degraded, t0)
            .await
    }

    // --- ANSWERED -------------------------------------------------------
    async fn finish(
        &self,
        query: String,
        session_id: String,
        rankings: Rankings,
        output: RetrievalOutput,
        degraded: Vec<String>,
        t0: Instant,
    ) -> RecommendResponse {
        let answer = match self.answerer.answer(&output.llm_context, &query).await {
            Some(text) => text,
            None => output.fallback_answer.clone(),
        };

        for stage in &degraded {
            counter!("pipeline_stage_degraded_total", "stage" => stage.clone()).increment(1);
        }
        histogram!("pipeline_latency_ms").record(t0.elapsed().as_millis() as f64);

        let stage = if degraded.is_empty() {
            Stage::Answered
        } else {
            Stage::Degraded
        };
        info!(
            target: "pipeline",
            session = %session_id,
            ?stage,
            merchants = rankings.by_distance.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "request finished"
        );

        RecommendResponse {
            success: true,
            message: Some("OK".to_string()),
            merchants: rankings,
            retrieval: output,
            answer: Some(answer),
            diagnostics: Diagnostics { stage, degraded },
        }
    }
}

/// Short anonymized hash for logs; raw query text is never logged.
fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("충무로 맛집");
        let b = anon_hash("충무로 맛집");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert_ne!(a, anon_hash("다른 질문"));
    }

    #[test]
    fn request_deserializes_from_contract_json() {
        let raw = r#"{
            "userQuery": "강남역 카페 추천",
            "userProfile": { "telco": "SKT", "cards": ["신한카드"] },
            "latitude": 37.4979,
            "longitude": 127.0276,
            "sessionId": "s-1",
            "variant": "no_rerank"
        }"#;
        let req: RecommendRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.user_query, "강남역 카페 추천");
        assert_eq!(req.variant, Some(Variant::NoRerank));
        assert_eq!(req.user_profile.unwrap().telco.as_deref(), Some("SKT"));
    }

    #[test]
    fn stage_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&Stage::ContextBuilt).unwrap(),
            "\"CONTEXT_BUILT\""
        );
    }
}
