// src/filter/keywords.rs
//! Rule-based keyword extraction: curated pattern tables mapping query text to
//! `{place_type, attributes, location}`. Tables are loaded from TOML
//! (embedded by default, `KEYWORDS_CONFIG_PATH` overrides) and compiled once.

use std::collections::BTreeSet;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYWORDS_CONFIG_PATH: &str = "config/keywords.toml";
pub const ENV_KEYWORDS_CONFIG_PATH: &str = "KEYWORDS_CONFIG_PATH";

/// Extracted query keywords. Fields stay empty when nothing matches; the
/// extractor never invents values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Keywords {
    pub place_type: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    pub location: Option<String>,
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
struct KeywordsRoot {
    #[serde(default)]
    attributes: Vec<PatternEntry>,
    #[serde(default)]
    places: Vec<PatternEntry>,
    #[serde(default)]
    locations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PatternEntry {
    name: String,
    patterns: Vec<String>,
}

/* ----------------------------
Compiled engine
---------------------------- */

#[derive(Debug)]
struct CompiledEntry {
    name: String,
    patterns: Vec<Regex>,
}

/// Compiled pattern tables.
#[derive(Debug)]
pub struct KeywordEngine {
    attributes: Vec<CompiledEntry>,
    places: Vec<CompiledEntry>,
    locations: Vec<Regex>,
}

static RE_RESTAURANT_FALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"식당|음식점|레스토랑").expect("fallback regex"));
static RE_LATE_NIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"야식").expect("fallback regex"));
static RE_WHAT_TO_EAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"뭐\s*먹").expect("fallback regex"));
static RE_NO_FRANCHISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"프랜차이즈\s*말고|체인\s*말고|유명한.*말고").expect("fallback regex")
});

/// Engine built from the embedded table, shared process-wide.
static EMBEDDED_ENGINE: Lazy<KeywordEngine> = Lazy::new(|| {
    KeywordEngine::from_toml_str(include_str!("../../config/keywords.toml"))
        .expect("embedded keyword table compiles")
});

impl KeywordEngine {
    /// Load from `KEYWORDS_CONFIG_PATH` when set, otherwise compile the
    /// embedded table.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var(ENV_KEYWORDS_CONFIG_PATH) {
            Ok(path) => {
                let path = PathBuf::from(path);
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!("Failed to read keyword config at {}: {}", path.display(), e)
                })?;
                Self::from_toml_str(&content)
            }
            Err(_) => Self::from_toml_str(include_str!("../../config/keywords.toml")),
        }
    }

    /// Compile an engine from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: KeywordsRoot = toml::from_str(toml_str)?;

        let compile_entries = |entries: &[PatternEntry], kind: &str| {
            entries
                .iter()
                .map(|entry| {
                    let patterns = entry
                        .patterns
                        .iter()
                        .map(|p| {
                            Regex::new(p).map_err(|e| {
                                anyhow::anyhow!("{kind} `{}` regex error: {}", entry.name, e)
                            })
                        })
                        .collect::<anyhow::Result<Vec<_>>>()?;
                    Ok(CompiledEntry {
                        name: entry.name.clone(),
                        patterns,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()
        };

        let attributes = compile_entries(&root.attributes, "attribute")?;
        let places = compile_entries(&root.places, "place")?;
        let locations = root
            .locations
            .iter()
            .map(|p| Regex::new(p).map_err(|e| anyhow::anyhow!("location regex error: {}", e)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            attributes,
            places,
            locations,
        })
    }

    /// Shared engine compiled from the embedded table.
    pub fn embedded() -> &'static KeywordEngine {
        &EMBEDDED_ENGINE
    }

    /// Scan the pattern tables. Attributes accumulate (first matching pattern
    /// per entry); the first matching place entry wins; locations return the
    /// matched text itself.
    pub fn extract(&self, text: &str) -> Keywords {
        let mut attributes = Vec::new();
        let mut seen = BTreeSet::new();
        for entry in &self.attributes {
            if entry.patterns.iter().any(|re| re.is_match(text)) && seen.insert(&entry.name) {
                attributes.push(entry.name.clone());
            }
        }

        let mut place_type = None;
        for entry in &self.places {
            if entry.patterns.iter().any(|re| re.is_match(text)) {
                place_type = Some(entry.name.clone());
                break;
            }
        }

        // Fallback heuristics when no place matched.
        if place_type.is_none()
            && (RE_RESTAURANT_FALLBACK.is_match(text)
                || RE_LATE_NIGHT.is_match(text)
                || RE_WHAT_TO_EAT.is_match(text))
        {
            place_type = Some("맛집".to_string());
        }

        // "no franchises, please" implies the hidden-gem attribute.
        if RE_NO_FRANCHISE.is_match(text) && !attributes.iter().any(|a| a == "숨겨진") {
            attributes.push("숨겨진".to_string());
        }

        let mut location = None;
        for re in &self.locations {
            if let Some(m) = re.find(text) {
                location = Some(m.as_str().trim().to_string());
                break;
            }
        }

        Keywords {
            place_type,
            attributes,
            location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> &'static KeywordEngine {
        KeywordEngine::embedded()
    }

    #[test]
    fn cafe_query_extracts_place_attribute_and_location() {
        let k = engine().extract("강남역 근처 분위기 좋은 카페 추천해줘");
        assert_eq!(k.place_type.as_deref(), Some("카페"));
        assert!(k.attributes.iter().any(|a| a == "분위기좋은"));
        assert_eq!(k.location.as_deref(), Some("강남역"));
    }

    #[test]
    fn restaurant_words_fall_back_to_matjip() {
        let k = engine().extract("근처 음식점 아무데나");
        assert_eq!(k.place_type.as_deref(), Some("맛집"));

        let k = engine().extract("뭐 먹을까");
        assert_eq!(k.place_type.as_deref(), Some("맛집"));
    }

    #[test]
    fn bare_hoe_does_not_fire_inside_hoesik() {
        let k = engine().extract("회식 장소 추천");
        assert_ne!(k.place_type.as_deref(), Some("회/초밥"));
        assert!(k.attributes.iter().any(|a| a == "회식"));

        let k = engine().extract("신선한 회 먹고 싶다");
        assert_eq!(k.place_type.as_deref(), Some("회/초밥"));
    }

    #[test]
    fn no_franchise_phrasing_adds_hidden_attribute() {
        let k = engine().extract("프랜차이즈 말고 조용한 카페");
        assert!(k.attributes.iter().any(|a| a == "숨겨진"));
        assert!(k.attributes.iter().any(|a| a == "조용한"));
    }

    #[test]
    fn relative_locations_are_extracted_verbatim() {
        let k = engine().extract("이 근처 치킨집");
        assert_eq!(k.location.as_deref(), Some("이 근처"));
        assert_eq!(k.place_type.as_deref(), Some("치킨"));
    }

    #[test]
    fn nothing_matches_nothing_invented() {
        let k = engine().extract("아무 의미 없는 문장");
        assert!(k.place_type.is_none());
        assert!(k.location.is_none());
    }

    #[test]
    fn minimal_inline_config_compiles() {
        let toml = r#"
locations = ['강남역?']

[[attributes]]
name = "뜨끈한"
patterns = ['뜨끈한', '따뜻한']

[[places]]
name = "찜/탕"
patterns = ['찜', '탕']
"#;
        let engine = KeywordEngine::from_toml_str(toml).expect("inline config");
        let k = engine.extract("강남 뜨끈한 탕 요리");
        assert_eq!(k.place_type.as_deref(), Some("찜/탕"));
        assert_eq!(k.attributes, vec!["뜨끈한"]);
        assert_eq!(k.location.as_deref(), Some("강남"));
    }
}
