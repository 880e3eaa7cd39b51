//! Wires the five core components together: one [`Engine`] owns the
//! coincidence cache and alert decider outright (no other task touches
//! them); the heartbeat monitor lives behind a `RwLock` so its own task
//! can write to it while the false-alarm calculator reads a snapshot
//! without blocking admission.

use chrono::{DateTime, Utc};
use snews_core_cache::{CacheConfig, CoincidenceCache};
use snews_core_calculator::FalseAlarmParams;
use snews_core_decider::AlertDecider;
use snews_core_heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use snews_core_validator::{MessageValidator, RejectReason};
use snews_domain_models::{
    Alert, DetectorStatus, EngineConfig, HeartbeatMessage, InboundMessage, Observation,
    RetractionMessage,
};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Engine {
    config: EngineConfig,
    validator: MessageValidator,
    cache: CoincidenceCache,
    decider: AlertDecider,
    heartbeat: Arc<RwLock<HeartbeatMonitor>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let cache = CoincidenceCache::new(CacheConfig {
            window_seconds: config.coincidence_window_seconds,
            expiration_seconds: config.message_expiration_seconds,
        });
        let decider = AlertDecider::new(config.server_tag.clone());
        let heartbeat = Arc::new(RwLock::new(HeartbeatMonitor::new(HeartbeatConfig {
            retention: chrono::Duration::days(config.heartbeat_retention_days),
            live_window: chrono::Duration::days(config.heartbeat_retention_days),
        })));

        Self { config, validator: MessageValidator::new(), cache, decider, heartbeat }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shares the heartbeat monitor with the task that ticks its silence
    /// scan; the cache and decider are never shared, per the concurrency
    /// model's single-owner rule.
    pub fn heartbeat_handle(&self) -> Arc<RwLock<HeartbeatMonitor>> {
        self.heartbeat.clone()
    }

    pub fn classify(&self, payload: &serde_json::Value, now: DateTime<Utc>) -> Result<InboundMessage, RejectReason> {
        self.validator.classify(payload, now)
    }

    async fn live_detector_count(&self) -> usize {
        self.heartbeat.read().await.live_detectors().len()
    }

    pub async fn admit_observation(&mut self, obs: &Observation, received_time: DateTime<Utc>) -> Vec<Alert> {
        let transitions = self.cache.admit(obs, received_time);
        let Ok(_transitions) = transitions else {
            tracing::error!(detector = %obs.detector_name, "cache admission rejected, state unchanged");
            return Vec::new();
        };
        self.run_decider(received_time).await
    }

    pub async fn admit_retraction(&mut self, retraction: &RetractionMessage) -> Vec<Alert> {
        if self.cache.retract(&retraction.detector_name).is_err() {
            tracing::error!(detector = %retraction.detector_name, "retraction rejected, state unchanged");
            return Vec::new();
        }
        self.run_decider(Utc::now()).await
    }

    async fn run_decider(&mut self, now: DateTime<Utc>) -> Vec<Alert> {
        let live = self.live_detector_count().await;
        let params = FalseAlarmParams {
            window_seconds: self.config.coincidence_window_seconds,
            single_detector_imitation_rate: self.config.single_detector_imitation_rate_per_week / (7.0 * 24.0 * 3600.0),
        };
        self.decider.process(&mut self.cache, live, params, now)
    }

    pub async fn record_heartbeat(&self, hb: &HeartbeatMessage, received_time: DateTime<Utc>) {
        let status = hb.detector_status;
        self.heartbeat.write().await.record(&hb.detector_name, received_time, hb.sent_time_utc, status);
    }

    pub fn reset(&mut self) {
        self.cache.reset();
    }

    pub fn evict_expired(&mut self, now: DateTime<Utc>) {
        self.cache.evict_expired(now);
    }

    /// Read-only lookup used by the archival writer to find the sub-group
    /// behind a just-emitted alert.
    pub fn sub_group(&self, id: u64) -> Option<&snews_domain_models::SubGroup> {
        self.cache.sub_group(id)
    }

    pub async fn live_detector_names(&self) -> Vec<String> {
        self.heartbeat.read().await.live_detectors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn obs(detector: &str, neutrino_time: &str) -> Observation {
        Observation {
            id: format!("1_CoincidenceTier_{detector}"),
            detector_name: detector.to_string(),
            sent_time_utc: Utc::now(),
            neutrino_time_utc: neutrino_time.parse().unwrap(),
            p_val: Some(0.3),
            meta: Value::Null,
            is_test: false,
        }
    }

    #[tokio::test]
    async fn two_detectors_produce_one_alert_through_the_full_pipeline() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.heartbeat.write().await.record("XENONnT", Utc::now(), Utc::now(), DetectorStatus::On);
        engine.heartbeat.write().await.record("KamLAND", Utc::now(), Utc::now(), DetectorStatus::On);

        let first = engine.admit_observation(&obs("XENONnT", "2030-01-01T00:00:00Z"), Utc::now()).await;
        assert!(first.is_empty());

        let second = engine.admit_observation(&obs("KamLAND", "2030-01-01T00:00:03.5Z"), Utc::now()).await;
        assert_eq!(second.len(), 1);
        assert!(second[0].false_alarm_recurrence_years > 0.0);
    }

    #[tokio::test]
    async fn reset_clears_the_cache() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.admit_observation(&obs("XENONnT", "2030-01-01T00:00:00Z"), Utc::now()).await;
        engine.reset();
        assert!(engine.cache.is_empty());
    }
}
