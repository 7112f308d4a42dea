// src/discount/payload.rs
//! Normalization of the historical discount payload shapes into
//! `merchant name -> Vec<DiscountProgram>`.
//!
//! Four shapes are accepted, all observed on the wire:
//! 1. `{ "<store>": { "discounts": [...] } }` (by-merchant map)
//! 2. `{ "discounts_by_store": { ... } }` (wrapped)
//! 3. `{ "discount": { "discounts_by_store": { ... } } }` (nested)
//! 4. `[ { "inputStoreName": ..., "discounts": [...] }, ... ]` (raw result
//!    list, also reachable under a top-level `results` key)
//!
//! Individual records (or their `shape` / `constraints` /
//! `requiredConditions` fields) may arrive as stringified ".NET-style"
//! serializations such as `@{kind=PERCENT; amount=20.0; maxAmount=; unitRule=}`.
//! Records the normalizer cannot repair are dropped; the rest proceed.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::DiscountProgram;

/// Classified payload shape. `normalize` is the single entry point; the
/// classification exists so callers can log which historical shape arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    ByMerchant,
    Wrapped,
    Nested,
    RawList,
}

pub fn classify(value: &Value) -> Option<PayloadShape> {
    match value {
        Value::Array(_) => Some(PayloadShape::RawList),
        Value::Object(map) => {
            if map.get("discounts_by_store").map_or(false, Value::is_object) {
                Some(PayloadShape::Wrapped)
            } else if map
                .get("discount")
                .and_then(|d| d.get("discounts_by_store"))
                .map_or(false, Value::is_object)
            {
                Some(PayloadShape::Nested)
            } else if map.get("results").map_or(false, Value::is_array) {
                Some(PayloadShape::RawList)
            } else if map.values().any(looks_like_store_entry) {
                Some(PayloadShape::ByMerchant)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn looks_like_store_entry(value: &Value) -> bool {
    match value {
        Value::Array(_) => true,
        Value::Object(map) => {
            map.contains_key("discounts") || map.contains_key("merchant") || map.contains_key("matched")
        }
        _ => false,
    }
}

/// Flatten any accepted payload shape into `merchant -> programs`.
/// Unrecognized payloads and unparsable records yield empty results, never errors.
pub fn normalize(value: &Value) -> BTreeMap<String, Vec<DiscountProgram>> {
    let mut out = BTreeMap::new();
    match classify(value) {
        Some(PayloadShape::Wrapped) => {
            if let Some(Value::Object(inner)) = value.get("discounts_by_store") {
                collect_merchant_map(inner, &mut out);
            }
        }
        Some(PayloadShape::Nested) => {
            if let Some(Value::Object(inner)) =
                value.get("discount").and_then(|d| d.get("discounts_by_store"))
            {
                collect_merchant_map(inner, &mut out);
            }
        }
        Some(PayloadShape::RawList) => {
            let entries = match value {
                Value::Array(list) => Some(list),
                Value::Object(map) => map.get("results").and_then(Value::as_array),
                _ => None,
            };
            if let Some(entries) = entries {
                for entry in entries {
                    let Some(name) = entry
                        .get("inputStoreName")
                        .or_else(|| entry.get("storeName"))
                        .or_else(|| entry.get("name"))
                        .and_then(Value::as_str)
                    else {
                        continue;
                    };
                    out.insert(name.to_string(), extract_programs(entry));
                }
            }
        }
        Some(PayloadShape::ByMerchant) => {
            if let Value::Object(map) = value {
                collect_merchant_map(map, &mut out);
            }
        }
        None => {}
    }
    out
}

fn collect_merchant_map(map: &Map<String, Value>, out: &mut BTreeMap<String, Vec<DiscountProgram>>) {
    for (name, store_data) in map {
        if looks_like_store_entry(store_data) {
            out.insert(name.clone(), extract_programs(store_data));
        }
    }
}

/// Pull the discount list out of one store entry and repair each record.
fn extract_programs(store_data: &Value) -> Vec<DiscountProgram> {
    let raw_items: Vec<Value> = match store_data {
        Value::Object(map) => match map.get("discounts") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::String(s)) => parse_record_str(s).into_iter().collect(),
            _ => Vec::new(),
        },
        Value::Array(items) => items.clone(),
        Value::String(s) => parse_record_str(s).into_iter().collect(),
        _ => Vec::new(),
    };

    raw_items
        .into_iter()
        .filter_map(|item| {
            let repaired = repair_record(item)?;
            match serde_json::from_value::<DiscountProgram>(repaired) {
                Ok(program) => Some(program),
                Err(e) => {
                    debug!(target: "discount", error = %e, "dropping unparsable discount record");
                    None
                }
            }
        })
        .collect()
}

/// Repair one record: parse stringified fields, fill required-condition lists,
/// coerce stringly-typed booleans. Returns `None` when the record cannot be
/// turned into an object at all.
fn repair_record(record: Value) -> Option<Value> {
    let mut obj = match record {
        Value::Object(map) => map,
        Value::String(s) => match parse_record_str(&s) {
            Some(Value::Object(map)) => map,
            _ => return None,
        },
        _ => return None,
    };

    for key in ["shape", "constraints", "requiredConditions"] {
        let stringified = match obj.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        if let Some(s) = stringified {
            let parsed = parse_record_str(&s).unwrap_or(Value::Null);
            obj.insert(key.to_string(), parsed);
        }
    }

    // requiredConditions: absent lists become empty, scalars become singletons.
    match obj.get_mut("requiredConditions") {
        Some(Value::Object(req)) => {
            for cond_key in ["payments", "telcos", "memberships", "affiliations"] {
                let fixed = match req.remove(cond_key) {
                    None | Some(Value::Null) => Value::Array(vec![]),
                    Some(Value::String(s)) if s == "System.Object[]" => Value::Array(vec![]),
                    Some(Value::Array(items)) => Value::Array(items),
                    Some(other) => Value::Array(vec![other]),
                };
                req.insert(cond_key.to_string(), fixed);
            }
        }
        Some(other) => {
            *other = serde_json::json!({
                "payments": [], "telcos": [], "memberships": [], "affiliations": []
            });
        }
        None => {}
    }

    // shape.unitRule may itself be a stringified record.
    if let Some(Value::Object(shape)) = obj.get_mut("shape") {
        let stringified = match shape.get("unitRule") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        if let Some(s) = stringified {
            let parsed = parse_record_str(&s).unwrap_or(Value::Null);
            shape.insert("unitRule".to_string(), parsed);
        }
    }

    for flag in ["appliedByUserProfile", "isDiscount"] {
        let coerced = match obj.get(flag) {
            Some(Value::String(s)) => Some(s.eq_ignore_ascii_case("true")),
            _ => None,
        };
        if let Some(b) = coerced {
            obj.insert(flag.to_string(), Value::Bool(b));
        }
    }

    Some(Value::Object(obj))
}

// ------------------------------------------------------------
// ".NET-style" record strings
// ------------------------------------------------------------

/// Parse `@{key=value; key=value}` into a JSON object.
///
/// Values: nested `@{...}` groups recurse, the empty string maps to null,
/// `System.Object[]` marks an empty array, `true`/`false` (any case) become
/// booleans, and numbers coerce (integral floats to integers). Semicolons
/// split fields only at nesting depth zero.
pub fn parse_record_str(input: &str) -> Option<Value> {
    let text = input.trim();
    let inner = text.strip_prefix("@{")?.strip_suffix('}')?;
    let inner = inner.trim();
    if inner.is_empty() {
        return Some(Value::Object(Map::new()));
    }

    let mut parts: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut depth: usize = 0;
    for ch in inner.chars() {
        match ch {
            '{' => {
                depth += 1;
                buf.push(ch);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                buf.push(ch);
            }
            ';' if depth == 0 => {
                let part = buf.trim().to_string();
                if !part.is_empty() {
                    parts.push(part);
                }
                buf.clear();
            }
            _ => buf.push(ch),
        }
    }
    let tail = buf.trim().to_string();
    if !tail.is_empty() {
        parts.push(tail);
    }

    let mut parsed = Map::new();
    for part in parts {
        let Some((key, raw_val)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let raw_val = raw_val.trim();

        let value = if raw_val.starts_with("@{") && raw_val.ends_with('}') {
            parse_record_str(raw_val).unwrap_or(Value::Null)
        } else if raw_val.is_empty() {
            Value::Null
        } else if raw_val == "System.Object[]" {
            Value::Array(vec![])
        } else if raw_val.eq_ignore_ascii_case("true") {
            Value::Bool(true)
        } else if raw_val.eq_ignore_ascii_case("false") {
            Value::Bool(false)
        } else if let Ok(num) = raw_val.parse::<f64>() {
            if num.fract() == 0.0 && num.abs() < 9.0e15 {
                Value::Number((num as i64).into())
            } else {
                serde_json::Number::from_f64(num)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        } else {
            Value::String(raw_val.to_string())
        };
        parsed.insert(key, value);
    }

    Some(Value::Object(parsed))
}

/// Re-serialize a parsed record back into `@{...}` form. Together with
/// `parse_record_str` this round-trips every record the parser accepts.
pub fn to_record_string(value: &Value) -> String {
    fn scalar(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(items) if items.is_empty() => "System.Object[]".to_string(),
            Value::Array(_) => "System.Object[]".to_string(),
            Value::Object(_) => to_record_string(value),
        }
    }

    match value {
        Value::Object(map) => {
            let body = map
                .iter()
                .map(|(k, v)| format!("{k}={}", scalar(v)))
                .collect::<Vec<_>>()
                .join("; ");
            format!("@{{{body}}}")
        }
        other => scalar(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discount::{ProviderType, Shape};
    use serde_json::json;

    #[test]
    fn parses_flat_record_with_missing_fields() {
        let v = parse_record_str("@{kind=PERCENT; amount=20.0; maxAmount=; unitRule=}").unwrap();
        assert_eq!(v["kind"], json!("PERCENT"));
        assert_eq!(v["amount"].as_f64(), Some(20.0));
        assert!(v["maxAmount"].is_null());
        assert!(v["unitRule"].is_null());
    }

    #[test]
    fn parses_nested_groups_and_sentinels() {
        let v = parse_record_str(
            "@{shape=@{kind=PER_UNIT; amount=0.0; unitRule=@{unitAmount=1000.0; perUnitValue=150.0; maxDiscountAmount=3000.0}}; requiredConditions=@{payments=System.Object[]; telcos=System.Object[]}; appliedByUserProfile=False; isDiscount=True}",
        )
        .unwrap();
        assert_eq!(v["shape"]["kind"], json!("PER_UNIT"));
        assert_eq!(v["shape"]["unitRule"]["perUnitValue"].as_f64(), Some(150.0));
        assert_eq!(v["requiredConditions"]["payments"], json!([]));
        assert_eq!(v["appliedByUserProfile"], json!(false));
        assert_eq!(v["isDiscount"], json!(true));
    }

    #[test]
    fn record_round_trip_is_stable() {
        let samples = [
            "@{kind=PERCENT; amount=20.0; maxAmount=; unitRule=}",
            "@{kind=AMOUNT; amount=4000.0; maxAmount=; unitRule=}",
            "@{discountName=T멤버십; providerType=TELCO; providerName=SKT; shape=@{kind=PER_UNIT; unitRule=@{unitAmount=1000; perUnitValue=150; maxDiscountAmount=3000}}; requiredConditions=@{payments=System.Object[]; telcos=System.Object[]; memberships=System.Object[]; affiliations=System.Object[]}; appliedByUserProfile=True; isDiscount=True}",
        ];
        for sample in samples {
            let first = parse_record_str(sample).unwrap();
            let serialized = to_record_string(&first);
            let second = parse_record_str(&serialized).unwrap();
            assert_eq!(first, second, "round trip changed: {sample}");
        }
    }

    #[test]
    fn non_record_strings_are_rejected() {
        assert!(parse_record_str("plain text").is_none());
        assert!(parse_record_str("{json: maybe}").is_none());
    }

    #[test]
    fn normalize_accepts_wrapped_payload_with_string_records() {
        let payload = json!({
            "discounts_by_store": {
                "스타벅스 남이섬점": {
                    "matched": true,
                    "discounts": [
                        "@{discountName=우리V카드 20% 청구할인; providerType=PAYMENT; providerName=우리카드; shape=@{kind=PERCENT; amount=20.0; maxAmount=100000.0; unitRule=}; constraints=; requiredConditions=@{payments=System.Object[]; telcos=System.Object[]; memberships=System.Object[]; affiliations=System.Object[]}; appliedByUserProfile=False; isDiscount=True}"
                    ]
                }
            }
        });
        let map = normalize(&payload);
        let programs = &map["스타벅스 남이섬점"];
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].provider_type, ProviderType::Payment);
        assert_eq!(
            programs[0].shape,
            Some(Shape::Percent {
                amount: 20.0,
                max_amount: Some(100_000)
            })
        );
        assert!(!programs[0].applied_by_user_profile);
    }

    #[test]
    fn normalize_accepts_nested_and_raw_list_payloads() {
        let nested = json!({
            "discount": { "discounts_by_store": { "카페A": { "discounts": [] } } }
        });
        assert!(normalize(&nested).contains_key("카페A"));

        let raw = json!({
            "success": true,
            "results": [
                { "inputStoreName": "카페B", "matched": false, "discounts": [] },
                { "inputStoreName": "카페C", "matched": true, "discounts": [
                    { "discountName": "멤버십 적립", "providerType": "MEMBERSHIP",
                      "providerName": "CJ ONE", "isDiscount": false }
                ]}
            ]
        });
        let map = normalize(&raw);
        assert_eq!(map["카페B"].len(), 0);
        assert_eq!(map["카페C"].len(), 1);
        assert!(!map["카페C"][0].is_discount);
    }

    #[test]
    fn malformed_records_are_dropped_not_fatal() {
        let payload = json!({
            "카페A": { "discounts": [
                { "discountName": "정상", "providerType": "STORE", "providerName": "카페A" },
                { "discountName": "고장", "providerType": "NOT_A_TYPE", "providerName": "x" },
                "garbage that is not a record"
            ]}
        });
        let map = normalize(&payload);
        assert_eq!(map["카페A"].len(), 1);
        assert_eq!(map["카페A"][0].discount_name, "정상");
    }

    #[test]
    fn by_merchant_map_with_plain_lists() {
        let payload = json!({
            "카페A": [ { "discountName": "a", "providerType": "STORE", "providerName": "카페A" } ],
            "meta": "ignored"
        });
        let map = normalize(&payload);
        assert_eq!(map.len(), 1);
        assert_eq!(map["카페A"].len(), 1);
    }
}
