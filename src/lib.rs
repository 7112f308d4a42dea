// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod catalog;
pub mod discount;
pub mod discovery;
pub mod filter;
pub mod geo;
pub mod pipeline;
pub mod profile;
pub mod providers;
pub mod rank;
pub mod retrieval;

// ---- Re-exports for stable public API ----
pub use crate::geo::Coordinates;
pub use crate::pipeline::{Pipeline, PipelineConfig, RecommendRequest, RecommendResponse, Stage};
pub use crate::profile::UserProfile;
pub use crate::retrieval::Variant;

use std::sync::Arc;

use crate::catalog::{MemoryCatalog, ProgramTarget};
use crate::discount::{DiscountProgram, ProviderType, RequiredConditions, Shape, TelcoRef};
use crate::providers::{DisabledAnswerer, StubGeocoder, StubPlaceProvider};

/// Build a fully offline pipeline: stub geocoder and place provider, a small
/// seeded in-memory catalog, no LLM backends. Useful for demos and smoke
/// tests without any credentials.
pub fn offline_pipeline(cfg: PipelineConfig) -> Pipeline {
    Pipeline::new(
        Arc::new(StubGeocoder),
        Arc::new(StubPlaceProvider::new()),
        Arc::new(seeded_demo_catalog()),
        Arc::new(DisabledAnswerer),
        cfg,
    )
}

/// Small catalog matching a few merchants of the embedded sample dataset.
pub fn seeded_demo_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();

    let fritz = catalog.add_brand("프릳츠");
    catalog.add_branch(fritz, "장충점");
    catalog.add_program(
        ProgramTarget::Brand(fritz),
        DiscountProgram {
            discount_id: None,
            discount_name: "T멤버십 1000원당 150원 할인".into(),
            provider_type: ProviderType::Telco,
            provider_name: "SKT".into(),
            shape: Some(Shape::PerUnit {
                unit_amount: 1_000,
                per_unit_value: 150,
                max_discount_amount: Some(3_000),
            }),
            constraints: None,
            required_conditions: RequiredConditions::default(),
            applied_by_user_profile: false,
            is_discount: true,
        },
        RequiredConditions {
            telcos: vec![TelcoRef {
                telco_name: "SKT".into(),
                telco_app_name: Some("T멤버십".into()),
            }],
            ..Default::default()
        },
    );

    let jangchung = catalog.add_brand("장충동커피");
    catalog.add_program(
        ProgramTarget::Brand(jangchung),
        DiscountProgram {
            discount_id: None,
            discount_name: "아메리카노 500원 할인".into(),
            provider_type: ProviderType::Store,
            provider_name: "장충동커피".into(),
            shape: Some(Shape::Amount { amount: 500 }),
            constraints: None,
            required_conditions: RequiredConditions::default(),
            applied_by_user_profile: false,
            is_discount: true,
        },
        RequiredConditions::default(),
    );

    catalog
}
