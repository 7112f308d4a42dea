// src/filter/llm.rs
//! Optional LLM-backed keyword extraction. When a backend is wired in it runs
//! ahead of the rule tables; any failure (or a result without a place type)
//! falls back to the rules. The extractor never invents values on its own.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::keywords::{KeywordEngine, Keywords};

/// Keyword-extraction backend. `None` means "no usable result".
#[async_trait]
pub trait KeywordClient: Send + Sync {
    async fn extract_keywords(&self, query: &str) -> Option<Keywords>;
    fn provider_name(&self) -> &'static str;
}

/// Returns `None` always; used when no LLM backend is configured.
pub struct DisabledKeywordClient;

#[async_trait]
impl KeywordClient for DisabledKeywordClient {
    async fn extract_keywords(&self, _query: &str) -> Option<Keywords> {
        None
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed-result mock for tests.
#[derive(Clone)]
pub struct MockKeywordClient {
    pub fixed: Keywords,
}

#[async_trait]
impl KeywordClient for MockKeywordClient {
    async fn extract_keywords(&self, _query: &str) -> Option<Keywords> {
        Some(self.fixed.clone())
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Rule tables plus an optional LLM backend in front of them.
pub struct KeywordExtractor {
    engine: &'static KeywordEngine,
    llm: Option<Arc<dyn KeywordClient>>,
}

impl KeywordExtractor {
    /// Rules only.
    pub fn rule_based() -> Self {
        Self {
            engine: KeywordEngine::embedded(),
            llm: None,
        }
    }

    /// Rules with an LLM backend in front.
    pub fn with_llm(llm: Arc<dyn KeywordClient>) -> Self {
        Self {
            engine: KeywordEngine::embedded(),
            llm: Some(llm),
        }
    }

    /// Extract keywords; the LLM result is used only when it carries a place
    /// type, otherwise the rule tables decide.
    pub async fn extract(&self, query: &str) -> Keywords {
        if let Some(llm) = &self.llm {
            match llm.extract_keywords(query).await {
                Some(keywords) if keywords.place_type.is_some() => {
                    debug!(target: "filter", provider = llm.provider_name(), "llm keywords used");
                    return keywords;
                }
                _ => {
                    debug!(target: "filter", provider = llm.provider_name(), "llm keywords unusable, using rules");
                }
            }
        }
        self.engine.extract(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_result_wins_when_it_has_a_place_type() {
        let llm = Arc::new(MockKeywordClient {
            fixed: Keywords {
                place_type: Some("카페".into()),
                attributes: vec!["조용한".into()],
                location: Some("홍대".into()),
            },
        });
        let extractor = KeywordExtractor::with_llm(llm);
        let k = extractor.extract("아무 문장").await;
        assert_eq!(k.place_type.as_deref(), Some("카페"));
        assert_eq!(k.attributes, vec!["조용한"]);
    }

    #[tokio::test]
    async fn missing_place_type_falls_back_to_rules() {
        let llm = Arc::new(MockKeywordClient {
            fixed: Keywords::default(),
        });
        let extractor = KeywordExtractor::with_llm(llm);
        let k = extractor.extract("강남역 카페 추천").await;
        assert_eq!(k.place_type.as_deref(), Some("카페"));
        assert_eq!(k.location.as_deref(), Some("강남역"));
    }

    #[tokio::test]
    async fn disabled_backend_means_rules() {
        let extractor = KeywordExtractor::with_llm(Arc::new(DisabledKeywordClient));
        let k = extractor.extract("조용한 분식집").await;
        assert_eq!(k.place_type.as_deref(), Some("분식"));
    }
}
