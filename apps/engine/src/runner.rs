//! The stream runner: the cooperative loop that subscribes to the
//! observation topic, classifies and dispatches each payload through the
//! [`Engine`], archives what crossed the wire, and publishes whatever
//! alerts fall out. Connection-test and admin traffic are drained from
//! the same topic rather than a separate one, matching how the upstream
//! bus multiplexes control messages onto the data topics.

use crate::admin;
use crate::engine::Engine;
use chrono::Utc;
use serde_json::Value;
use snews_domain_models::{EngineConfig, InboundMessage};
use snews_infra_db::{ArchivalRepository, SweepRepository};
use snews_infra_transport::{backoff_delay, Topic, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Resolves the operator-configured name for `topic`, honouring the
/// firedrill switch (spec.md §6, `FIREDRILL_*` vs. production topics).
fn topic_name(topic: Topic, config: &EngineConfig) -> &str {
    match topic {
        Topic::Observation => {
            if config.firedrill {
                &config.firedrill_observation_topic
            } else {
                &config.observation_topic
            }
        }
        Topic::FiredrillObservation => &config.firedrill_observation_topic,
        Topic::Alert => {
            if config.firedrill {
                &config.firedrill_alert_topic
            } else {
                &config.alert_topic
            }
        }
        Topic::FiredrillAlert => &config.firedrill_alert_topic,
        Topic::ConnectionTest => &config.connection_test_topic,
    }
}

pub struct Runner<T: Transport> {
    engine: Engine,
    transport: Arc<T>,
    archival: Option<ArchivalRepository>,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport> Runner<T> {
    pub fn new(engine: Engine, transport: Arc<T>, archival: Option<ArchivalRepository>, shutdown: Arc<AtomicBool>) -> Self {
        Self { engine, transport, archival, shutdown }
    }

    /// Runs until the shutdown flag is set or a fatal transport fault is
    /// observed. Each iteration: receive, classify, dispatch, archive,
    /// publish. A retryable receive fault backs off and tries again; a
    /// fatal one ends the loop. The retry counter decays by 1 on every
    /// successful read rather than resetting outright, so a single good
    /// read doesn't erase accumulated backoff pressure from a flaky link.
    pub async fn run(&mut self) {
        let mut consecutive_retries = 0u32;

        while !self.shutdown.load(Ordering::Relaxed) {
            let name = topic_name(Topic::Observation, self.engine.config());
            match self.transport.receive(Topic::Observation, name).await {
                Ok(payload) => {
                    consecutive_retries = consecutive_retries.saturating_sub(1);
                    self.handle_payload(payload).await;
                }
                Err(err) if err.is_retryable() => {
                    consecutive_retries += 1;
                    let max_retries = self.engine.config().transport_max_retries;
                    if consecutive_retries > max_retries {
                        tracing::error!("giving up after {consecutive_retries} consecutive retryable faults");
                        break;
                    }
                    let growth_base = self.engine.config().transport_base_backoff.as_secs_f64();
                    let delay = backoff_delay(consecutive_retries, growth_base, 0.2);
                    tracing::warn!(%err, attempt = consecutive_retries, delay_secs = delay.as_secs_f64(), "retrying after transport fault");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(%err, "fatal transport fault, stopping runner");
                    break;
                }
            }
        }
    }

    async fn handle_payload(&mut self, payload: Value) {
        let now = Utc::now();
        let inbound = match self.engine.classify(&payload, now) {
            Ok(inbound) => inbound,
            Err(reason) => {
                tracing::warn!(code = reason.code(), %reason, "rejected inbound payload");
                return;
            }
        };

        if let Some(archival) = &self.archival {
            if let Err(err) = archival.archive_message(&inbound, &payload, now).await {
                tracing::error!(%err, "failed to archive inbound message");
            }
        }

        let alerts = match &inbound {
            InboundMessage::Observation(obs) => self.engine.admit_observation(obs, now).await,
            InboundMessage::Heartbeat(hb) => {
                self.engine.record_heartbeat(hb, now).await;
                if let Some(archival) = &self.archival {
                    let latency = (now - hb.sent_time_utc).num_nanoseconds().unwrap_or(0) as f64 / 1e9;
                    let status = if hb.detector_status == snews_domain_models::DetectorStatus::On { "ON" } else { "OFF" };
                    if let Err(err) = archival.archive_heartbeat(&hb.detector_name, now, hb.sent_time_utc, latency, status).await {
                        tracing::error!(%err, "failed to archive heartbeat");
                    }
                }
                Vec::new()
            }
            InboundMessage::Retraction(retraction) => self.engine.admit_retraction(retraction).await,
            InboundMessage::Admin(command) => {
                if let Some(response) = admin::dispatch(&mut self.engine, command.clone(), &payload).await {
                    let name = topic_name(response.topic, self.engine.config());
                    if let Err(err) = self.transport.publish(response.topic, name, response.payload).await {
                        tracing::error!(%err, "failed to publish admin response");
                    }
                }
                Vec::new()
            }
        };

        self.publish_alerts(alerts, now).await;
        self.engine.evict_expired(now);
    }

    async fn publish_alerts(&self, alerts: Vec<snews_domain_models::Alert>, now: chrono::DateTime<Utc>) {
        for alert in &alerts {
            if let Some(archival) = &self.archival {
                if let Some(sub_group) = self.engine.sub_group(alert.sub_group_id) {
                    if let Err(err) = archival.archive_sub_group(sub_group, now).await {
                        tracing::error!(%err, "failed to archive sub-group");
                    }
                }
                if let Err(err) = archival.archive_alert(alert).await {
                    tracing::error!(%err, "failed to archive alert");
                }
            }
        }

        if !self.engine.config().leader {
            return;
        }
        for alert in alerts {
            let wire = alert.to_wire();
            let payload = match serde_json::to_value(&wire) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::error!(%err, "failed to serialise alert for publish");
                    continue;
                }
            };
            let name = topic_name(Topic::Alert, self.engine.config());
            if let Err(err) = self.transport.publish(Topic::Alert, name, payload).await {
                tracing::error!(%err, "failed to publish alert");
            }
        }
    }
}

/// Background sweep: periodically evicts cache entries past expiration
/// and scans the heartbeat monitor for silence, logging any warnings
/// that fire. Runs independently of the main receive loop.
pub async fn spawn_maintenance_loop(heartbeat: std::sync::Arc<tokio::sync::RwLock<snews_core_heartbeat::HeartbeatMonitor>>, sweep: Option<SweepRepository>, shutdown: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(StdDuration::from_secs(60));
    while !shutdown.load(Ordering::Relaxed) {
        interval.tick().await;
        let now = Utc::now();

        let warnings = heartbeat.write().await.scan_for_silence(now);
        for warning in warnings {
            tracing::warn!(
                detector = %warning.detector_name,
                silent_for_secs = warning.time_since_last_beat_seconds,
                expected_interval_secs = warning.expected_interval_seconds,
                "detector has gone silent"
            );
        }

        if let Some(sweep) = &sweep {
            match sweep.sweep_expired(now).await {
                Ok(deleted) if deleted > 0 => tracing::info!(deleted, "swept expired archival rows"),
                Ok(_) => {}
                Err(err) => tracing::error!(%err, "archival sweep failed"),
            }
        }
    }
}
