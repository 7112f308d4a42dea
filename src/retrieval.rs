// src/retrieval.rs
//! # Retrieval Context Builder
//! Session-scoped lexical index over merchant documents, cosine scoring with
//! a rank bonus, and assembly of the LLM context plus a deterministic
//! fallback answer.
//!
//! The rank bonus is *added* to a cosine similarity in `[0, 1]`, so scores
//! may exceed 1.0. That is intentional and kept for parity with the scoring
//! the answers were tuned against.
//!
//! Ablation variants swap the scorer / context formatter at construction;
//! contracts do not change.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discount::{discount_rate, program_value, DEFAULT_REFERENCE_AMOUNT};
use crate::discovery::DiscoveryData;
use crate::profile::NormalizedProfile;
use crate::rank::Rankings;

/// Default number of documents returned per search.
pub const DEFAULT_TOP_K: usize = 3;

/// Review snippets are cut at this many characters.
const REVIEW_SNIPPET_CHARS: usize = 150;

/// Ablation variant, selected at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Baseline,
    NoRerank,
    NoContext,
}

/// Representative benefit attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitSummary {
    pub name: String,
    pub rate: Option<f64>,
}

/// Metadata carried by every session document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocMetadata {
    pub store_id: String,
    pub store_name: String,
    pub category: Option<String>,
    pub distance: Option<f64>,
    pub best_discount: Option<BenefitSummary>,
    pub discount_rank: Option<usize>,
    pub distance_rank: Option<usize>,
    pub review_highlight: Option<String>,
}

/// One indexed document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub tokens: HashMap<String, usize>,
    pub metadata: DocMetadata,
}

/// One scored search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredDoc {
    pub doc_id: String,
    pub document: String,
    pub similarity: f64,
    pub metadata: DocMetadata,
}

/// Full retrieval output for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOutput {
    pub top_k: Vec<ScoredDoc>,
    pub llm_context: String,
    pub fallback_answer: String,
    pub total_documents: usize,
}

/* ----------------------------
Tokenization & similarity
---------------------------- */

static RE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9A-Za-z가-힣]+").expect("token regex"));

/// Lower-cased alphanumeric/Hangul runs as a term multiset.
pub fn tokenize(text: &str) -> HashMap<String, usize> {
    let lower = text.to_lowercase();
    let mut counts = HashMap::new();
    for m in RE_TOKEN.find_iter(&lower) {
        *counts.entry(m.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

fn norm(tokens: &HashMap<String, usize>) -> f64 {
    (tokens.values().map(|&v| (v * v) as f64).sum::<f64>()).sqrt()
}

fn cosine(query: &HashMap<String, usize>, q_norm: f64, doc: &HashMap<String, usize>) -> f64 {
    if q_norm == 0.0 {
        return 0.0;
    }
    let doc_norm = norm(doc);
    if doc_norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = query
        .iter()
        .map(|(term, &qv)| (qv * doc.get(term).copied().unwrap_or(0)) as f64)
        .sum();
    dot / (q_norm * doc_norm)
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/* ----------------------------
Strategy objects (ablation)
---------------------------- */

trait ScoreStrategy: Send + Sync {
    fn score(&self, base_similarity: f64, metadata: &DocMetadata) -> f64;
}

/// Baseline: cosine plus `0.15/discountRank + 0.10/distanceRank`.
struct RankBonusScorer;

impl ScoreStrategy for RankBonusScorer {
    fn score(&self, base_similarity: f64, metadata: &DocMetadata) -> f64 {
        let mut bonus = 0.0;
        if let Some(rank) = metadata.discount_rank {
            if rank > 0 {
                bonus += 0.15 / rank as f64;
            }
        }
        if let Some(rank) = metadata.distance_rank {
            if rank > 0 {
                bonus += 0.10 / rank as f64;
            }
        }
        base_similarity + bonus
    }
}

/// `no_rerank`: the raw cosine only.
struct RawCosineScorer;

impl ScoreStrategy for RawCosineScorer {
    fn score(&self, base_similarity: f64, _metadata: &DocMetadata) -> f64 {
        base_similarity
    }
}

trait ContextStrategy: Send + Sync {
    fn build(
        &self,
        query: &str,
        results: &[ScoredDoc],
        profile: Option<&NormalizedProfile>,
    ) -> String;
}

struct FullContext;

impl ContextStrategy for FullContext {
    fn build(
        &self,
        query: &str,
        results: &[ScoredDoc],
        profile: Option<&NormalizedProfile>,
    ) -> String {
        if results.is_empty() {
            return format!("사용자 요청: {query}\n검색된 매장이 없습니다.");
        }

        let mut lines = vec![
            "당신은 위치 기반 맛집/카페 추천 비서입니다.".to_string(),
            format!("사용자 요청: {query}"),
        ];

        if let Some(profile) = profile {
            let mut profile_lines = Vec::new();
            if let Some(telco) = &profile.telco {
                profile_lines.push(format!("- 통신사: {telco}"));
            }
            if !profile.cards.is_empty() {
                profile_lines.push(format!("- 카드: {}", profile.cards.join(", ")));
            }
            if !profile.memberships.is_empty() {
                profile_lines.push(format!("- 멤버십: {}", profile.memberships.join(", ")));
            }
            if !profile_lines.is_empty() {
                lines.push("사용자 프로필:".to_string());
                lines.extend(profile_lines);
            }
        }

        lines.push("\n검색된 후보:".to_string());
        for (idx, result) in results.iter().enumerate() {
            let meta = &result.metadata;
            let discount_text = match &meta.best_discount {
                Some(benefit) => format!(
                    "{} {}% 혜택 가능",
                    benefit.name,
                    format_rate(benefit.rate.unwrap_or(0.0))
                ),
                None => "적용 가능한 할인 없음".to_string(),
            };
            let review = meta.review_highlight.clone().unwrap_or_default();
            lines.push(format!(
                "{}. {} – {}, 거리 {}m. {}",
                idx + 1,
                meta.store_name,
                discount_text,
                meta.distance.map(format_distance).unwrap_or_else(|| "N/A".into()),
                review
            ));
        }

        lines.push(
            "\n지침: 위 후보만을 근거로, 사용자가 실제로 받을 수 있는 할인과 분위기를 강조하여 \
             답변하세요. 추가 정보가 없으면 '정보가 없습니다'라고 답하세요."
                .to_string(),
        );

        lines.join("\n")
    }
}

/// `no_context`: candidate count only.
struct StubContext;

impl ContextStrategy for StubContext {
    fn build(
        &self,
        query: &str,
        results: &[ScoredDoc],
        _profile: Option<&NormalizedProfile>,
    ) -> String {
        format!(
            "사용자 요청: {query}\n컨텍스트 생략 (ablation; 후보 {}개)",
            results.len()
        )
    }
}

fn format_distance(d: f64) -> String {
    if d.fract() == 0.0 {
        format!("{}", d as i64)
    } else {
        format!("{d:.1}")
    }
}

fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{}", rate as i64)
    } else {
        format!("{rate}")
    }
}

/* ----------------------------
Builder
---------------------------- */

/// Session-scoped document store plus the scorer / formatter pair.
pub struct RetrievalBuilder {
    sessions: RwLock<HashMap<String, Vec<Document>>>,
    scorer: Box<dyn ScoreStrategy>,
    context: Box<dyn ContextStrategy>,
    top_k: usize,
    reference_amount: i64,
}

impl RetrievalBuilder {
    pub fn new(variant: Variant) -> Self {
        let scorer: Box<dyn ScoreStrategy> = match variant {
            Variant::NoRerank => Box::new(RawCosineScorer),
            _ => Box::new(RankBonusScorer),
        };
        let context: Box<dyn ContextStrategy> = match variant {
            Variant::NoContext => Box::new(StubContext),
            _ => Box::new(FullContext),
        };
        Self {
            sessions: RwLock::new(HashMap::new()),
            scorer,
            context,
            top_k: DEFAULT_TOP_K,
            reference_amount: DEFAULT_REFERENCE_AMOUNT,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Build and store this session's documents; replaces any prior set.
    /// Returns the document count.
    pub fn index_session(
        &self,
        session_id: &str,
        discovery: &DiscoveryData,
        rankings: &Rankings,
    ) -> usize {
        let documents = self.build_documents(session_id, discovery, rankings);
        let count = documents.len();
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(session_id.to_string(), documents);
        }
        debug!(target: "retrieval", session = session_id, documents = count, "session indexed");
        count
    }

    /// Score this session's documents against the query; top `k` hits.
    pub fn search(&self, session_id: &str, query: &str, top_k: usize) -> Vec<ScoredDoc> {
        let query_tokens = tokenize(query);
        let q_norm = norm(&query_tokens);

        let Ok(sessions) = self.sessions.read() else {
            return Vec::new();
        };
        let Some(documents) = sessions.get(session_id) else {
            return Vec::new();
        };

        let mut scored: Vec<ScoredDoc> = documents
            .iter()
            .map(|doc| {
                let base = cosine(&query_tokens, q_norm, &doc.tokens);
                let similarity = round4(self.scorer.score(base, &doc.metadata));
                ScoredDoc {
                    doc_id: doc.id.clone(),
                    document: doc.text.clone(),
                    similarity,
                    metadata: doc.metadata.clone(),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(top_k.max(1));
        scored
    }

    /// Discard a session's documents.
    pub fn clear_session(&self, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(session_id);
        }
    }

    /// Index, search, and assemble context + fallback in one pass.
    pub fn process(
        &self,
        session_id: &str,
        query: &str,
        discovery: &DiscoveryData,
        rankings: &Rankings,
        profile: Option<&NormalizedProfile>,
    ) -> RetrievalOutput {
        let total_documents = self.index_session(session_id, discovery, rankings);
        let top_k = self.search(session_id, query, self.top_k);
        let llm_context = self.context.build(query, &top_k, profile);
        let fallback_answer = build_fallback_answer(query, &top_k, profile);
        RetrievalOutput {
            top_k,
            llm_context,
            fallback_answer,
            total_documents,
        }
    }

    /// Compose one document per discovered merchant, ". "-joined.
    fn build_documents(
        &self,
        session_id: &str,
        discovery: &DiscoveryData,
        rankings: &Rankings,
    ) -> Vec<Document> {
        // Rank lookups are joined by merchant name.
        let mut discount_ranks: HashMap<&str, usize> = HashMap::new();
        let mut benefits: HashMap<&str, BenefitSummary> = HashMap::new();
        for entry in &rankings.by_discount {
            discount_ranks.insert(entry.name.as_str(), entry.rank);
            let best = entry
                .all_benefits
                .iter()
                .filter(|d| d.is_discount)
                .max_by_key(|d| program_value(d, self.reference_amount));
            if let Some(best) = best {
                let value = program_value(best, self.reference_amount);
                benefits.insert(
                    entry.name.as_str(),
                    BenefitSummary {
                        name: best.discount_name.clone(),
                        rate: Some(discount_rate(value, self.reference_amount)),
                    },
                );
            }
        }
        let distance_ranks: HashMap<&str, usize> = rankings
            .by_distance
            .iter()
            .map(|entry| (entry.name.as_str(), entry.rank))
            .collect();

        discovery
            .stores
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let store_id = format!("s{}", idx + 1);
                let category = discovery.categories.get(name).cloned();
                let distance = discovery.distances.get(name).copied();
                let review_highlight = discovery
                    .reviews
                    .get(name)
                    .and_then(|reviews| reviews.first())
                    .map(review_snippet);

                let metadata = DocMetadata {
                    store_id: store_id.clone(),
                    store_name: name.clone(),
                    category: category.clone(),
                    distance,
                    best_discount: benefits.get(name.as_str()).cloned(),
                    discount_rank: discount_ranks.get(name.as_str()).copied(),
                    distance_rank: distance_ranks.get(name.as_str()).copied(),
                    review_highlight: review_highlight.clone(),
                };

                let mut chunks =
                    vec![format!("{} ({})", name, category.unwrap_or_default())];
                if let Some(address) = discovery.addresses.get(name) {
                    chunks.push(format!("주소: {address}"));
                }
                if let Some(d) = distance {
                    chunks.push(format!("현재 위치에서 {}m 거리", format_distance(d)));
                }
                if let Some(rank) = metadata.discount_rank {
                    chunks.push(format!("할인 우선순위 {rank}위"));
                }
                if let Some(rank) = metadata.distance_rank {
                    chunks.push(format!("거리 우선순위 {rank}위"));
                }
                if let Some(benefit) = &metadata.best_discount {
                    chunks.push(format!(
                        "{} 혜택 {}% 대상",
                        benefit.name,
                        format_rate(benefit.rate.unwrap_or(0.0))
                    ));
                }
                if let Some(review) = &review_highlight {
                    chunks.push(review.clone());
                }

                let text = chunks.join(". ");
                Document {
                    id: format!("{session_id}_{store_id}_{idx}"),
                    tokens: tokenize(&text),
                    text,
                    metadata,
                }
            })
            .collect()
    }
}

/// Deterministic answer used when the LLM collaborator is unavailable.
pub fn build_fallback_answer(
    query: &str,
    results: &[ScoredDoc],
    profile: Option<&NormalizedProfile>,
) -> String {
    if results.is_empty() {
        return format!(
            "'{query}'에 대한 추천 정보를 찾지 못했습니다. 다른 위치나 조건으로 다시 요청해 주세요."
        );
    }

    let mut lines = vec![format!("{query}에 대한 추천 결과입니다:")];
    for (idx, result) in results.iter().enumerate() {
        let meta = &result.metadata;
        let discount_text = match &meta.best_discount {
            Some(benefit) => format!(
                "{} {}% 혜택",
                benefit.name,
                format_rate(benefit.rate.unwrap_or(0.0))
            ),
            None => "할인 정보 없음".to_string(),
        };
        let review = meta
            .review_highlight
            .clone()
            .unwrap_or_else(|| "분위기가 양호한 것으로 확인되었습니다.".to_string());
        lines.push(format!(
            "{}. {} (약 {}m) – {}. {}",
            idx + 1,
            meta.store_name,
            meta.distance.map(format_distance).unwrap_or_else(|| "N/A".into()),
            discount_text,
            review
        ));
    }
    if profile.is_some() {
        lines.push("사용자 프로필에 맞는 혜택 순으로 정렬했습니다.".to_string());
    }
    lines.join("\n")
}

/// One review as a highlight line: optional author and star rating, content
/// capped at 150 characters.
fn review_snippet(review: &crate::providers::Review) -> String {
    let author = review.author.clone().unwrap_or_else(|| "익명".to_string());
    let prefix = match review.rating {
        Some(rating) => format!("{author} ({rating}★)"),
        None => author,
    };
    let content: String = review.text.chars().take(REVIEW_SNIPPET_CHARS).collect();
    let ellipsis = if review.text.chars().count() > REVIEW_SNIPPET_CHARS {
        "..."
    } else {
        ""
    };
    format!("{prefix} 후기: {content}{ellipsis}")
}
