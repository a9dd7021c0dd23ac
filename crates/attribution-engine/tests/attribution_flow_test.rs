//! End-to-end attribution flow: touchpoints in, conversions attributed
//! under every model, financial metrics and insights out.

use std::sync::Arc;

use chrono::{Duration, Utc};

use attribution_core::config::AppConfig;
use attribution_core::types::{Channel, ConversionEvent, DateRange, ModelType, Touchpoint};
use attribution_engine::{AttributionEngine, InMemoryRepository};

fn engine() -> AttributionEngine {
    AttributionEngine::new(Arc::new(InMemoryRepository::new()), AppConfig::default())
}

async fn seed_journey(engine: &AttributionEngine, user_id: &str) {
    let now = Utc::now();
    let channels = [
        (Channel::Display, 10),
        (Channel::Social, 6),
        (Channel::PaidSearch, 3),
        (Channel::Email, 1),
    ];
    for (channel, days_ago) in channels {
        engine
            .track_touchpoint(Touchpoint::new(
                user_id,
                channel,
                now - Duration::days(days_ago),
            ))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn full_flow_static_models() {
    let engine = engine();
    seed_journey(&engine, "user_1").await;

    let conversion = ConversionEvent::new("user_1", 400.0, Utc::now());
    for model in [
        ModelType::FirstTouch,
        ModelType::LastTouch,
        ModelType::Linear,
        ModelType::TimeDecay,
        ModelType::PositionBased,
    ] {
        let result = engine
            .process_conversion(conversion.clone(), model)
            .await
            .unwrap();
        assert_eq!(result.touchpoints.len(), 4);
        assert!(result.credits_reconcile(), "{model} does not reconcile");
    }

    // Five models, five append-only result records.
    let range = DateRange::new(Utc::now() - Duration::hours(1), Utc::now());
    let report = engine.insights(range).await.unwrap();
    assert_eq!(report.model_performance.len(), 5);
    for row in &report.model_performance {
        assert_eq!(row.results, 1);
        assert!((row.attributed_value - 400.0).abs() < 1e-9);
        assert!((row.avg_touchpoints - 4.0).abs() < 1e-9);
    }

    // One distinct path, display -> social -> paid_search -> email.
    assert_eq!(report.top_paths.len(), 1);
    assert_eq!(report.top_paths[0].conversions, 1);
    assert_eq!(
        report.top_paths[0].path,
        vec![
            Channel::Display,
            Channel::Social,
            Channel::PaidSearch,
            Channel::Email
        ]
    );

    // Channel ROI rows aggregate across all five results.
    assert_eq!(report.channel_roi.len(), 4);
    let total_revenue: f64 = report.channel_roi.iter().map(|c| c.total_revenue).sum();
    assert!((total_revenue - 5.0 * 400.0).abs() < 1e-6);
}

#[tokio::test]
async fn train_then_attribute_data_driven() {
    let engine = engine();
    let now = Utc::now();

    for u in 0..12 {
        let user = format!("user_{u}");
        seed_journey(&engine, &user).await;
        if u % 2 == 0 {
            engine
                .record_conversion(ConversionEvent::new(&user, 100.0, now - Duration::hours(3)))
                .await
                .unwrap();
        }
    }

    let range = DateRange::new(now - Duration::days(30), now);
    let provenance = engine
        .train_data_driven_model(range, None)
        .await
        .unwrap();
    assert_eq!(provenance.journeys, 12);
    assert_eq!(provenance.converted_journeys, 6);
    assert_eq!(engine.data_driven().version(), 1);

    let result = engine
        .process_conversion(
            ConversionEvent::new("user_1", 250.0, now),
            ModelType::DataDriven,
        )
        .await
        .unwrap();
    assert_eq!(result.touchpoints.len(), 4);
    assert!(result.credits_reconcile());
}

#[tokio::test]
async fn concurrent_conversions_attribute_independently() {
    let engine = Arc::new(engine());
    let now = Utc::now();

    let mut handles = Vec::new();
    for u in 0..8 {
        let engine = Arc::clone(&engine);
        let user = format!("user_{u}");
        handles.push(tokio::spawn(async move {
            seed_journey(&engine, &user).await;
            engine
                .process_conversion(
                    ConversionEvent::new(&user, 50.0, now),
                    ModelType::TimeDecay,
                )
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.credits_reconcile());
    }

    let range = DateRange::new(now - Duration::hours(1), Utc::now());
    let performance = engine.channel_performance(range).await.unwrap();
    assert_eq!(performance.len(), 4);
}
