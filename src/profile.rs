// src/profile.rs
//! User profile model and normalization.
//!
//! Telco and loyalty-program names arrive in many spellings ("LG 유플러스",
//! "엘지유플러스", ...). Matching against the discount catalog happens on the
//! normalized, upper-cased forms only.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

/// Canonical telco names accepted by the catalog.
pub const KNOWN_TELCOS: &[&str] = &["SKT", "KT", "LG U+"];

/// Raw profile as supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub user_id: Option<String>,
    pub telco: Option<String>,
    pub cards: Vec<String>,
    pub memberships: Vec<String>,
    pub affiliations: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Preference tags ("분위기", "가성비", ...); used for tie-breaks only.
    pub categories: Vec<String>,
}

impl UserProfile {
    pub fn coords(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }

    /// A profile is valid iff its telco (when present) normalizes into the
    /// known set and every collection entry is a non-empty string.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(telco) = &self.telco {
            let normalized = normalize_telco(telco);
            match normalized.as_deref() {
                Some(t) if KNOWN_TELCOS.contains(&t) => {}
                _ => return Err(format!("알 수 없는 통신사: {telco}")),
            }
        }
        for (field, values) in [
            ("cards", &self.cards),
            ("memberships", &self.memberships),
            ("affiliations", &self.affiliations),
        ] {
            if values.iter().any(|v| v.trim().is_empty()) {
                return Err(format!("{field} 항목에 빈 문자열이 있습니다"));
            }
        }
        Ok(())
    }

    /// Normalize for matching: canonical telco, upper-cased trimmed collections.
    pub fn normalized(&self) -> NormalizedProfile {
        NormalizedProfile {
            user_id: self
                .user_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
            telco: self.telco.as_deref().and_then(normalize_telco),
            cards: upper_set(&self.cards),
            memberships: self
                .memberships
                .iter()
                .map(|m| normalize_membership(m))
                .collect(),
            affiliations: upper_set(&self.affiliations),
            categories: self.categories.clone(),
        }
    }
}

/// Profile after normalization; the only form the resolver and evaluator see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedProfile {
    pub user_id: String,
    pub telco: Option<String>,
    pub cards: Vec<String>,
    pub memberships: Vec<String>,
    pub affiliations: Vec<String>,
    pub categories: Vec<String>,
}

fn upper_set(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_uppercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Fold telco spelling variants into SKT / KT / LG U+.
///
/// Exact matches win; otherwise the longest known substring decides. Unknown
/// names are passed through unchanged so the validator can reject them.
pub fn normalize_telco(telco: &str) -> Option<String> {
    let trimmed = telco.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_uppercase();

    const EXACT: &[(&str, &str)] = &[
        ("SKT", "SKT"),
        ("SK텔레콤", "SKT"),
        ("SK 텔레콤", "SKT"),
        ("에스케이티", "SKT"),
        ("에스케이텔레콤", "SKT"),
        ("KT", "KT"),
        ("케이티", "KT"),
        ("케이티텔레콤", "KT"),
        ("LG U+", "LG U+"),
        ("LG U PLUS", "LG U+"),
        ("LGU+", "LG U+"),
        ("LG유플러스", "LG U+"),
        ("LG 유플러스", "LG U+"),
        ("엘지유플러스", "LG U+"),
        ("엘지 유플러스", "LG U+"),
    ];
    for (pattern, canonical) in EXACT {
        if upper == pattern.to_uppercase() {
            return Some((*canonical).to_string());
        }
    }

    // Partial match, longest patterns first so "SK텔레콤" beats "KT".
    const PARTIAL: &[(&str, &str)] = &[
        ("에스케이텔레콤", "SKT"),
        ("SK텔레콤", "SKT"),
        ("에스케이티", "SKT"),
        ("케이티텔레콤", "KT"),
        ("LG유플러스", "LG U+"),
        ("LG 유플러스", "LG U+"),
        ("엘지유플러스", "LG U+"),
        ("엘지 유플러스", "LG U+"),
        ("케이티", "KT"),
        ("SKT", "SKT"),
        ("LG", "LG U+"),
        ("KT", "KT"),
    ];
    for (pattern, canonical) in PARTIAL {
        if upper.contains(&pattern.to_uppercase()) {
            return Some((*canonical).to_string());
        }
    }

    Some(upper)
}

/// Fold membership spelling variants into the catalog's canonical names.
pub fn normalize_membership(membership: &str) -> String {
    let upper = membership.trim().to_uppercase();
    const MAP: &[(&str, &str)] = &[
        ("해피포인트", "HAPPY POINT"),
        ("해피 포인트", "HAPPY POINT"),
        ("HAPPY POINT", "HAPPY POINT"),
        ("CJ ONE", "CJ ONE"),
        ("CJONE", "CJ ONE"),
        ("씨제이원", "CJ ONE"),
        ("L.POINT", "L.POINT"),
        ("LPOINT", "L.POINT"),
        ("L포인트", "L.POINT"),
        ("엘포인트", "L.POINT"),
        ("OK캐쉬백", "OK CASHBAG"),
        ("OKCASHBAG", "OK CASHBAG"),
        ("신세계포인트", "SHINSEGAE POINT"),
        ("신세계 포인트", "SHINSEGAE POINT"),
    ];
    for (pattern, canonical) in MAP {
        if upper == pattern.to_uppercase() {
            return (*canonical).to_string();
        }
    }
    upper
}
