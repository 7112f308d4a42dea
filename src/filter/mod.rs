// src/filter/mod.rs
//! # Query Filter
//! Input validation (prompt-injection screening, keyword gating, profile
//! checks) ahead of everything else in the pipeline. Purely local; a
//! classification miss degrades to empty fields rather than failing the
//! request.

pub mod keywords;
pub mod llm;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::profile::UserProfile;

/// Hard cap on query length; longer input is truncated, not rejected.
pub const MAX_QUERY_CHARS: usize = 500;

/// Queries shorter than this skip the allowed-keyword gate.
const ALLOWED_GATE_MIN_CHARS: usize = 20;

/// Prompt-injection patterns (Korean + English phrasings).
static INJECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"이전\s*(지시|명령|프롬프트|instruction)",
        r"(무시|ignore|forget|disregard)",
        r"시스템\s*프롬프트",
        r"system\s*prompt",
        r"너는\s*(이제|지금부터)",
        r"you\s*are\s*now",
        r"역할\s*변경",
        r"pretend\s*to\s*be",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("injection pattern regex"))
    .collect()
});

/// Topics the engine can actually answer about.
const ALLOWED_KEYWORDS: &[&str] = &[
    "음식점", "식당", "맛집", "카페", "할인", "쿠폰", "추천", "위치", "근처",
    "주변", "디저트", "치킨", "한식", "중식", "분식", "양식", "일식", "회",
    "초밥", "족발", "보쌈", "고기", "구이", "도시락", "죽", "찜", "탕",
    "샐러드", "아시안", "버거", "피자", "파스타", "술집", "저녁", "점심",
];

/// Off-topic keywords that short-circuit validation.
const BLOCKED_KEYWORDS: &[&str] = &[
    "코딩", "프로그래밍", "정치", "주식", "의료", "법률", "파이썬", "자바",
    "javascript", "투자", "진료", "변호사",
];

/// Validation outcome; `query` carries the sanitized text on success.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub ok: bool,
    pub message: String,
    pub query: Option<String>,
}

impl Validation {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            query: None,
        }
    }
}

/// Trim and cap the query at [`MAX_QUERY_CHARS`] characters. Idempotent.
pub fn sanitize(query: &str) -> String {
    let trimmed = query.trim();
    let capped: String = trimmed.chars().take(MAX_QUERY_CHARS).collect();
    capped.trim().to_string()
}

/// True when any injection pattern matches.
pub fn contains_injection(query: &str) -> bool {
    let lower = query.to_lowercase();
    INJECTION_PATTERNS.iter().any(|re| re.is_match(&lower))
}

/// Blocked-keyword and allowed-keyword gates.
fn check_keywords(query: &str) -> Result<(), String> {
    let lower = query.to_lowercase();

    for blocked in BLOCKED_KEYWORDS {
        if lower.contains(blocked) {
            return Err(format!(
                "'{blocked}' 관련 질문은 지원하지 않습니다. 음식점이나 카페 추천을 요청해주세요."
            ));
        }
    }

    if query.chars().count() < ALLOWED_GATE_MIN_CHARS {
        return Ok(());
    }

    if ALLOWED_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Ok(())
    } else {
        Err("음식점, 카페, 할인 관련 질문만 가능합니다. 예: '강남역 근처 맛집 추천'".to_string())
    }
}

/// Full validation pipeline: sanitize, injection screen, keyword gates,
/// profile check.
pub fn validate(query: &str, profile: Option<&UserProfile>) -> Validation {
    let query = sanitize(query);

    if query.is_empty() {
        return Validation::rejected("질문을 입력해주세요.");
    }

    if contains_injection(&query) {
        return Validation::rejected(
            "올바르지 않은 요청입니다. 음식점이나 카페 추천을 요청해주세요.",
        );
    }

    if let Err(message) = check_keywords(&query) {
        return Validation::rejected(message);
    }

    if let Some(profile) = profile {
        if let Err(message) = profile.validate() {
            return Validation::rejected(message);
        }
    }

    Validation {
        ok: true,
        message: "OK".to_string(),
        query: Some(query),
    }
}
