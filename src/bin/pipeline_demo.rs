// src/bin/pipeline_demo.rs
// Offline smoke run: stub providers, seeded in-memory catalog, one request.
//
//   cargo run --bin pipeline_demo
//
// Set RUST_LOG=debug for stage-level tracing.

use benefit_scout::{offline_pipeline, PipelineConfig, RecommendRequest, UserProfile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let pipeline = offline_pipeline(PipelineConfig::default());

    let request = RecommendRequest {
        user_query: "충무로역에서 분위기 좋은 카페 추천해줘".to_string(),
        user_profile: Some(UserProfile {
            user_id: Some("demo".to_string()),
            telco: Some("SKT".to_string()),
            cards: vec!["신한카드".to_string()],
            memberships: vec!["해피포인트".to_string()],
            ..Default::default()
        }),
        latitude: Some(37.5613),
        longitude: Some(126.9940),
        session_id: Some("demo".to_string()),
        variant: None,
    };

    let response = pipeline.handle(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
