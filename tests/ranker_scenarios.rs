// tests/ranker_scenarios.rs
//
// Resolver → payload → ranker integration on literal reference scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use benefit_scout::catalog::{DiscountResolver, MemoryCatalog, ProgramTarget};
use benefit_scout::discount::{
    DiscountProgram, PaymentRef, ProviderType, RequiredConditions, Shape, TelcoRef,
    DEFAULT_REFERENCE_AMOUNT,
};
use benefit_scout::profile::UserProfile;
use benefit_scout::rank;

fn program(name: &str, provider_type: ProviderType, provider: &str, shape: Shape) -> DiscountProgram {
    DiscountProgram {
        discount_id: None,
        discount_name: name.to_string(),
        provider_type,
        provider_name: provider.to_string(),
        shape: Some(shape),
        constraints: None,
        required_conditions: RequiredConditions::default(),
        applied_by_user_profile: false,
        is_discount: true,
    }
}

fn telco_condition(name: &str) -> RequiredConditions {
    RequiredConditions {
        telcos: vec![TelcoRef {
            telco_name: name.to_string(),
            telco_app_name: None,
        }],
        ..Default::default()
    }
}

fn payment_condition(name: &str) -> RequiredConditions {
    RequiredConditions {
        payments: vec![PaymentRef {
            payment_name: name.to_string(),
        }],
        ..Default::default()
    }
}

/// 카페A holds an SKT per-unit program (1 800 on 12 000) and a 신한카드 20%
/// program (2 400); 카페B holds an SKT 10% program (1 200). For an SKT +
/// 신한카드 profile the personalized order is 카페A then 카페B, and the
/// distance order matches (120 m vs 260 m).
#[tokio::test]
async fn telco_and_card_profile_drives_personalization() {
    let mut catalog = MemoryCatalog::new();
    let cafe_a = catalog.add_brand("카페A");
    let cafe_b = catalog.add_brand("카페B");
    catalog.add_program(
        ProgramTarget::Brand(cafe_a),
        program(
            "T멤버십 1000원당 150원",
            ProviderType::Telco,
            "SKT",
            Shape::PerUnit {
                unit_amount: 1_000,
                per_unit_value: 150,
                max_discount_amount: Some(3_000),
            },
        ),
        telco_condition("SKT"),
    );
    catalog.add_program(
        ProgramTarget::Brand(cafe_a),
        program(
            "신한카드 20% 청구할인",
            ProviderType::Payment,
            "신한카드",
            Shape::Percent {
                amount: 20.0,
                max_amount: Some(100_000),
            },
        ),
        payment_condition("신한카드"),
    );
    catalog.add_program(
        ProgramTarget::Brand(cafe_b),
        program(
            "T멤버십 10% 할인",
            ProviderType::Telco,
            "SKT",
            Shape::Percent {
                amount: 10.0,
                max_amount: None,
            },
        ),
        telco_condition("SKT"),
    );

    let profile = UserProfile {
        telco: Some("SKT".into()),
        cards: vec!["신한카드".into()],
        ..Default::default()
    }
    .normalized();

    let stores = vec!["카페A".to_string(), "카페B".to_string()];
    let now = NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();

    let resolver = DiscountResolver::new(Arc::new(catalog));
    let outcome = resolver.resolve(&profile, &stores, now).await;
    let payload = serde_json::to_value(&outcome).unwrap();

    let distances = HashMap::from([("카페A".to_string(), 120.0), ("카페B".to_string(), 260.0)]);
    let rankings = rank::rank(&stores, &payload, &distances, &profile, DEFAULT_REFERENCE_AMOUNT);

    let personalized: Vec<&str> = rankings.by_discount.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(personalized, vec!["카페A", "카페B"]);

    // 카페A's best applicable value is the 20% card discount: 2 400.
    let cafe_a_entry = &rankings.by_discount[0];
    let best = cafe_a_entry
        .all_benefits
        .iter()
        .map(|d| benefit_scout::discount::program_value(d, DEFAULT_REFERENCE_AMOUNT))
        .max()
        .unwrap();
    assert_eq!(best, 2_400);

    let by_distance: Vec<&str> = rankings.by_distance.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(by_distance, vec!["카페A", "카페B"]);

    // Byte-identical across runs.
    let again = rank::rank(&stores, &payload, &distances, &profile, DEFAULT_REFERENCE_AMOUNT);
    assert_eq!(
        serde_json::to_string(&rankings).unwrap(),
        serde_json::to_string(&again).unwrap()
    );
}

/// An LG U+ profile sees none of the SKT programs as applicable, so the
/// personalized list is empty while the distance list still carries entries.
#[tokio::test]
async fn non_matching_profile_gets_distance_list_only() {
    let mut catalog = MemoryCatalog::new();
    let cafe = catalog.add_brand("카페A");
    catalog.add_program(
        ProgramTarget::Brand(cafe),
        program(
            "T멤버십 10%",
            ProviderType::Telco,
            "SKT",
            Shape::Percent {
                amount: 10.0,
                max_amount: None,
            },
        ),
        telco_condition("SKT"),
    );

    let profile = UserProfile {
        telco: Some("LG유플러스".into()),
        ..Default::default()
    }
    .normalized();

    let stores = vec!["카페A".to_string()];
    let now = NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();

    let resolver = DiscountResolver::new(Arc::new(catalog));
    let outcome = resolver.resolve(&profile, &stores, now).await;
    let payload = serde_json::to_value(&outcome).unwrap();

    let rankings = rank::rank(
        &stores,
        &payload,
        &HashMap::new(),
        &profile,
        DEFAULT_REFERENCE_AMOUNT,
    );
    assert!(rankings.by_discount.is_empty());
    assert_eq!(rankings.by_distance.len(), 1);
    assert_eq!(rankings.by_distance[0].all_benefits.len(), 1);
}
