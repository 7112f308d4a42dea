// src/rank.rs
//! # Recommendation Ranker
//! Two ranked lists out of merchants + discounts + profile:
//!
//! - personalized: merchants with at least one applicable discount, ordered by
//!   best applicable savings on the reference amount, then distance;
//! - by-distance: every merchant, ordered by distance alone.
//!
//! Discount payloads are flattened through `discount::payload::normalize`
//! first, so any of the historical wire shapes ranks identically.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::discount::{is_applicable, payload, program_value, DiscountProgram};
use crate::profile::NormalizedProfile;

/// Each output list carries at most this many entries.
pub const TOP_N: usize = 3;

/// One ranked merchant entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStore {
    pub store_id: String,
    pub name: String,
    pub distance_meters: Option<f64>,
    #[serde(rename = "all_benefits")]
    pub all_benefits: Vec<DiscountProgram>,
    pub rank: usize,
}

/// The two ranked lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rankings {
    pub by_discount: Vec<RankedStore>,
    pub by_distance: Vec<RankedStore>,
}

fn cmp_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Distance-only merchant order; needs no discount data, so the orchestrator
/// may precompute it while discounts resolve.
pub fn distance_order(stores: &[String], distances: &HashMap<String, f64>) -> Vec<String> {
    let mut order: Vec<&String> = stores.iter().collect();
    order.sort_by(|a, b| {
        cmp_distance(distances.get(*a).copied(), distances.get(*b).copied())
            .then_with(|| a.cmp(b))
    });
    order.into_iter().cloned().collect()
}

/// Rank with a precomputed distance order (see [`distance_order`]).
pub fn rank_with_distance_order(
    stores: &[String],
    discounts_payload: &Value,
    distances: &HashMap<String, f64>,
    profile: &NormalizedProfile,
    reference_amount: i64,
    order: &[String],
) -> Rankings {
    let discounts_by_store = payload::normalize(discounts_payload);

    // Stable store ids are synthesized from the input position ("s1", "s2", ...).
    let ids: HashMap<&String, String> = stores
        .iter()
        .enumerate()
        .map(|(idx, name)| (name, format!("s{}", idx + 1)))
        .collect();
    let id_of = |name: &String| ids.get(name).cloned().unwrap_or_else(|| "s0".to_string());

    // --- personalized -------------------------------------------------
    struct Scored {
        entry: RankedStore,
        max_value: i64,
    }

    let mut personalized: Vec<Scored> = Vec::new();
    for name in stores {
        let Some(programs) = discounts_by_store.get(name) else {
            continue;
        };
        let applicable: Vec<DiscountProgram> = programs
            .iter()
            .filter(|d| is_applicable(profile, d))
            .cloned()
            .collect();
        if applicable.is_empty() {
            continue;
        }
        // Accrual programs stay listed but never contribute savings value.
        let max_value = applicable
            .iter()
            .filter(|d| d.is_discount)
            .map(|d| program_value(d, reference_amount))
            .max()
            .unwrap_or(0);

        personalized.push(Scored {
            entry: RankedStore {
                store_id: id_of(name),
                name: name.clone(),
                distance_meters: distances.get(name).copied(),
                all_benefits: applicable,
                rank: 0,
            },
            max_value,
        });
    }

    personalized.sort_by(|a, b| {
        b.max_value
            .cmp(&a.max_value)
            .then_with(|| cmp_distance(a.entry.distance_meters, b.entry.distance_meters))
            .then_with(|| a.entry.name.cmp(&b.entry.name))
    });

    let by_discount: Vec<RankedStore> = personalized
        .into_iter()
        .take(TOP_N)
        .enumerate()
        .map(|(idx, mut scored)| {
            scored.entry.rank = idx + 1;
            scored.entry
        })
        .collect();

    // --- by distance --------------------------------------------------
    let by_distance: Vec<RankedStore> = order
        .iter()
        .take(TOP_N)
        .enumerate()
        .map(|(idx, name)| RankedStore {
            store_id: id_of(name),
            name: name.clone(),
            distance_meters: distances.get(name).copied(),
            all_benefits: discounts_by_store.get(name).cloned().unwrap_or_default(),
            rank: idx + 1,
        })
        .collect();

    Rankings {
        by_discount,
        by_distance,
    }
}

/// Rank from scratch (computes the distance order itself).
pub fn rank(
    stores: &[String],
    discounts_payload: &Value,
    distances: &HashMap<String, f64>,
    profile: &NormalizedProfile,
    reference_amount: i64,
) -> Rankings {
    let order = distance_order(stores, distances);
    rank_with_distance_order(
        stores,
        discounts_payload,
        distances,
        profile,
        reference_amount,
        &order,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discount::DEFAULT_REFERENCE_AMOUNT;
    use serde_json::json;

    fn profile() -> NormalizedProfile {
        NormalizedProfile {
            user_id: "u1".into(),
            telco: Some("SKT".into()),
            cards: vec!["신한카드".into()],
            ..Default::default()
        }
    }

    fn stores() -> Vec<String> {
        vec!["카페A".to_string(), "카페B".to_string()]
    }

    fn payload() -> Value {
        json!({
            "카페A": { "discounts": [
                {
                    "discountName": "T멤버십 1000원당 150원",
                    "providerType": "TELCO",
                    "providerName": "SKT",
                    "shape": { "kind": "PER_UNIT",
                               "unitRule": { "unitAmount": 1000.0, "perUnitValue": 150.0,
                                             "maxDiscountAmount": 3000.0 } },
                    "requiredConditions": { "telcos": [ { "telcoName": "SKT" } ] }
                },
                {
                    "discountName": "신한카드 20% 할인",
                    "providerType": "PAYMENT",
                    "providerName": "신한카드",
                    "shape": { "kind": "PERCENT", "amount": 20.0, "maxAmount": 100000.0 },
                    "requiredConditions": { "payments": [ { "paymentName": "신한카드" } ] }
                }
            ]},
            "카페B": { "discounts": [
                {
                    "discountName": "T멤버십 10%",
                    "providerType": "TELCO",
                    "providerName": "SKT",
                    "shape": { "kind": "PERCENT", "amount": 10.0 },
                    "requiredConditions": { "telcos": [ { "telcoName": "SKT" } ] }
                }
            ]}
        })
    }

    fn distances() -> HashMap<String, f64> {
        HashMap::from([("카페A".to_string(), 120.0), ("카페B".to_string(), 260.0)])
    }

    #[test]
    fn personalized_orders_by_best_applicable_value() {
        let r = rank(
            &stores(),
            &payload(),
            &distances(),
            &profile(),
            DEFAULT_REFERENCE_AMOUNT,
        );

        // 카페A best value: 신한카드 20% of 12 000 = 2 400 (> SKT per-unit 1 800).
        // 카페B: 10% of 12 000 = 1 200.
        let names: Vec<&str> = r.by_discount.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["카페A", "카페B"]);
        assert_eq!(r.by_discount[0].rank, 1);
        assert_eq!(r.by_discount[1].rank, 2);

        let by_distance: Vec<&str> = r.by_distance.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(by_distance, vec!["카페A", "카페B"]);
    }

    #[test]
    fn personalized_carries_applicable_benefits_only() {
        let mut payload = payload();
        payload["카페A"]["discounts"].as_array_mut().unwrap().push(json!({
            "discountName": "LG U+ 전용",
            "providerType": "TELCO",
            "providerName": "LG U+",
            "shape": { "kind": "AMOUNT", "amount": 9000.0 },
            "requiredConditions": { "telcos": [ { "telcoName": "LG U+" } ] }
        }));
        let r = rank(
            &stores(),
            &payload,
            &distances(),
            &profile(),
            DEFAULT_REFERENCE_AMOUNT,
        );
        let cafe_a = &r.by_discount[0];
        assert_eq!(cafe_a.name, "카페A");
        assert!(
            cafe_a.all_benefits.iter().all(|d| d.provider_name != "LG U+"),
            "the non-matching benefit must be filtered from the personalized entry"
        );
    }

    #[test]
    fn by_distance_keeps_all_parsed_benefits() {
        let r = rank(
            &stores(),
            &payload(),
            &distances(),
            &NormalizedProfile::default(),
            DEFAULT_REFERENCE_AMOUNT,
        );
        // No applicable telco/card for the empty profile, yet the distance
        // list still lists everything parsed.
        let cafe_a = r.by_distance.iter().find(|e| e.name == "카페A").unwrap();
        assert_eq!(cafe_a.all_benefits.len(), 2);
    }

    #[test]
    fn merchants_without_applicable_discounts_drop_from_personalized() {
        let r = rank(
            &stores(),
            &payload(),
            &distances(),
            &NormalizedProfile::default(),
            DEFAULT_REFERENCE_AMOUNT,
        );
        assert!(r.by_discount.is_empty());
        assert_eq!(r.by_distance.len(), 2);
    }

    #[test]
    fn missing_distances_sort_last() {
        let stores = vec!["근거리".to_string(), "미지거리".to_string()];
        let distances = HashMap::from([("근거리".to_string(), 90.0)]);
        let order = distance_order(&stores, &distances);
        assert_eq!(order, vec!["근거리", "미지거리"]);
    }

    #[test]
    fn accrual_programs_do_not_drive_savings_rank() {
        let payload = json!({
            "적립만": { "discounts": [
                { "discountName": "포인트 적립 5000", "providerType": "MEMBERSHIP",
                  "providerName": "CJ ONE", "isDiscount": false,
                  "shape": { "kind": "AMOUNT", "amount": 5000.0 },
                  "requiredConditions": {} }
            ]},
            "소액할인": { "discounts": [
                { "discountName": "500원 할인", "providerType": "STORE",
                  "providerName": "소액할인",
                  "shape": { "kind": "AMOUNT", "amount": 500.0 },
                  "requiredConditions": {} }
            ]}
        });
        let stores = vec!["적립만".to_string(), "소액할인".to_string()];
        let r = rank(
            &stores,
            &payload,
            &HashMap::new(),
            &NormalizedProfile::default(),
            DEFAULT_REFERENCE_AMOUNT,
        );
        // The accrual-only merchant is listed (public program) but its 5 000
        // points must not outrank the real 500-won discount.
        assert_eq!(r.by_discount[0].name, "소액할인");
    }

    #[test]
    fn ranking_is_deterministic() {
        let a = rank(&stores(), &payload(), &distances(), &profile(), 12_000);
        let b = rank(&stores(), &payload(), &distances(), &profile(), 12_000);
        let ja = serde_json::to_string(&a).unwrap();
        let jb = serde_json::to_string(&b).unwrap();
        assert_eq!(ja, jb);
    }

    #[test]
    fn wrapped_payload_ranks_identically_to_by_merchant() {
        let wrapped = json!({ "discounts_by_store": payload() });
        let a = rank(&stores(), &payload(), &distances(), &profile(), 12_000);
        let b = rank(&stores(), &wrapped, &distances(), &profile(), 12_000);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
