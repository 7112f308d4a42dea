// tests/shape_records.rs
//
// Tolerance tests for the stringified record parser against captures of the
// real catalog wire format.

use benefit_scout::discount::payload::{normalize, parse_record_str, to_record_string};
use benefit_scout::discount::{ProviderType, Shape};
use serde_json::json;

#[test]
fn reference_percent_record_parses_with_nulls_preserved() {
    let v = parse_record_str("@{kind=PERCENT; amount=20.0; maxAmount=; unitRule=}").unwrap();
    assert_eq!(v["kind"], json!("PERCENT"));
    assert_eq!(v["amount"].as_f64(), Some(20.0));
    assert!(v["maxAmount"].is_null());
    assert!(v["unitRule"].is_null());
}

#[test]
fn captured_starbucks_payload_normalizes() {
    // Shortened capture of a real discount-server response: one fully
    // structured record, one record with every nested field stringified.
    let payload = json!({
        "message": "할인 정보 조회 완료",
        "discounts_by_store": {
            "스타벅스 남이섬점": {
                "matched": true,
                "reason": "해당 지점을 찾을 수 없습니다. (브랜드 기준 할인만 조회했습니다.)",
                "discounts": [
                    {
                        "discountName": "NEW 우리V카드 탐앤탐스/스타벅스 20% 청구할인",
                        "providerType": "PAYMENT",
                        "providerName": "우리카드",
                        "shape": "@{kind=PERCENT; amount=20.0; maxAmount=100000.0; unitRule=}",
                        "constraints": "@{validFrom=; validTo=; dayOfWeekMask=; timeFrom=; timeTo=; channelLimit=; requiredLevel=; qualification=전월 국내가맹점 이용액 30만원 이상 시 제공; applicationMenu=커피전문점(탐앤탐스, 스타벅스)}",
                        "requiredConditions": "@{payments=System.Object[]; telcos=System.Object[]; memberships=System.Object[]; affiliations=System.Object[]}",
                        "appliedByUserProfile": false,
                        "isDiscount": true
                    },
                    {
                        "discountName": "전등급 아메리카노 4,000원 할인",
                        "providerType": "TELCO",
                        "providerName": "KT",
                        "shape": "@{kind=AMOUNT; amount=4000.0; maxAmount=; unitRule=}",
                        "constraints": "",
                        "requiredConditions": "System.Object[]",
                        "appliedByUserProfile": "True",
                        "isDiscount": "True"
                    }
                ]
            }
        }
    });

    let map = normalize(&payload);
    let programs = &map["스타벅스 남이섬점"];
    assert_eq!(programs.len(), 2, "records with missing fields are preserved");

    let card = &programs[0];
    assert_eq!(card.provider_type, ProviderType::Payment);
    assert_eq!(
        card.shape,
        Some(Shape::Percent {
            amount: 20.0,
            max_amount: Some(100_000)
        })
    );
    let constraints = card.constraints.as_ref().unwrap();
    assert_eq!(
        constraints.application_menu.as_deref(),
        Some("커피전문점(탐앤탐스, 스타벅스)")
    );
    assert!(card.required_conditions.is_empty());

    let telco = &programs[1];
    assert_eq!(telco.shape, Some(Shape::Amount { amount: 4_000 }));
    assert!(telco.applied_by_user_profile, "stringly-typed True coerces");
    assert!(telco.is_discount);
    assert!(telco.required_conditions.is_empty());
}

#[test]
fn parse_serialize_parse_is_a_fixed_point() {
    let samples = [
        "@{kind=PERCENT; amount=10.0; maxAmount=3000.0; unitRule=}",
        "@{kind=PER_UNIT; amount=0.0; maxAmount=; unitRule=@{unitAmount=1000.0; perUnitValue=150.0; maxDiscountAmount=3000.0}}",
        "@{discountName=지점 한정; providerType=STORE; providerName=카페; appliedByUserProfile=False; isDiscount=True; requiredConditions=@{payments=System.Object[]; telcos=System.Object[]; memberships=System.Object[]; affiliations=System.Object[]}}",
    ];
    for sample in samples {
        let first = parse_record_str(sample).unwrap();
        let second = parse_record_str(&to_record_string(&first)).unwrap();
        assert_eq!(first, second, "fixed point violated for {sample}");
    }
}

#[test]
fn unknown_shape_kinds_drop_only_their_record() {
    let payload = json!({
        "카페A": { "discounts": [
            { "discountName": "좋은 할인", "providerType": "STORE", "providerName": "카페A",
              "shape": { "kind": "PERCENT", "amount": 5.0 } },
            { "discountName": "이상한 할인", "providerType": "STORE", "providerName": "카페A",
              "shape": { "kind": "MYSTERY", "amount": 5.0 } }
        ]}
    });
    let map = normalize(&payload);
    assert_eq!(map["카페A"].len(), 1);
    assert_eq!(map["카페A"][0].discount_name, "좋은 할인");
}
