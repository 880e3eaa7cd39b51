//! Drives two detectors' observations through the real stream runner,
//! backed by an in-memory transport, and checks that exactly one alert
//! is published to the alert topic.

use chrono::{Duration, Utc};
use serde_json::json;
use snews_domain_models::{DetectorStatus, EngineConfig};
use snews_engine::engine::Engine;
use snews_engine::runner::Runner;
use snews_infra_transport::{InMemoryTransport, Topic};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[tokio::test]
async fn two_detector_coincidence_publishes_one_alert_end_to_end() {
    let config = EngineConfig { leader: true, ..EngineConfig::default() };
    let engine = Engine::new(config);

    let now = Utc::now();
    engine.record_heartbeat(
        &snews_domain_models::HeartbeatMessage {
            id: "0_Heartbeat_0".into(),
            detector_name: "XENONnT".into(),
            sent_time_utc: now,
            detector_status: DetectorStatus::On,
        },
        now,
    )
    .await;
    engine.record_heartbeat(
        &snews_domain_models::HeartbeatMessage {
            id: "0_Heartbeat_1".into(),
            detector_name: "KamLAND".into(),
            sent_time_utc: now,
            detector_status: DetectorStatus::On,
        },
        now,
    )
    .await;

    let (transport, handle) = InMemoryTransport::new();
    let transport = Arc::new(transport);
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut runner = Runner::new(engine, transport.clone(), None, shutdown);

    let anchor = now - Duration::seconds(10);
    let coincident = anchor + Duration::milliseconds(3500);

    handle.send_observation(json!({
        "id": "1_CoincidenceTier_0",
        "detector_name": "XENONnT",
        "sent_time_utc": now.to_rfc3339(),
        "neutrino_time_utc": anchor.to_rfc3339(),
        "p_val": 0.2,
    }));
    handle.send_observation(json!({
        "id": "2_CoincidenceTier_0",
        "detector_name": "KamLAND",
        "sent_time_utc": now.to_rfc3339(),
        "neutrino_time_utc": coincident.to_rfc3339(),
        "p_val": 0.4,
    }));
    drop(handle);

    runner.run().await;

    let published = transport.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, Topic::Alert);
    assert_eq!(published[0].1["alert_type"], "NEW_MESSAGE");
    assert_eq!(published[0].1["detector_names"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_detector_is_rejected_and_produces_no_alert() {
    let engine = Engine::new(EngineConfig::default());
    let (transport, handle) = InMemoryTransport::new();
    let transport = Arc::new(transport);
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut runner = Runner::new(engine, transport.clone(), None, shutdown);

    handle.send_observation(json!({
        "id": "1_CoincidenceTier_0",
        "detector_name": "NotARealDetector",
        "sent_time_utc": Utc::now().to_rfc3339(),
        "neutrino_time_utc": Utc::now().to_rfc3339(),
    }));
    drop(handle);

    runner.run().await;

    assert!(transport.published().await.is_empty());
}
