//! Append-only writer draining admitted messages, alerts and heartbeats
//! into the archival tables. Every row's `expires_at` is `received + 48h`,
//! per the bus contract's short rolling window.

use chrono::{DateTime, Duration, Utc};
use libsql::params;
use serde_json::Value;
use snews_domain_models::{Alert, HeartbeatMessage, InboundMessage, Observation, SubGroup};

use crate::client::DbClient;
use crate::errors::DbError;

fn message_retention() -> Duration {
    Duration::hours(48)
}

pub struct ArchivalRepository {
    client: DbClient,
}

impl ArchivalRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    /// Archives the raw decoded payload of any admitted message, regardless
    /// of kind, into the `messages` table.
    pub async fn archive_message(&self, kind: &InboundMessage, raw_payload: &Value, received_at: DateTime<Utc>) -> Result<(), DbError> {
        let (id, detector_name, kind_label) = match kind {
            InboundMessage::Observation(Observation { id, detector_name, .. }) => (id.clone(), detector_name.clone(), "observation"),
            InboundMessage::Heartbeat(HeartbeatMessage { id, detector_name, .. }) => (id.clone(), detector_name.clone(), "heartbeat"),
            InboundMessage::Retraction(r) => (r.id.clone(), r.detector_name.clone(), "retraction"),
            InboundMessage::Admin(_) => return Ok(()),
        };
        let expires_at = received_at + message_retention();

        let connection = self.client.connection()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO messages (id, detector_name, message_kind, payload_json, received_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, detector_name, kind_label, raw_payload.to_string(), received_at.to_rfc3339(), expires_at.to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    /// Archives one row per entry into `signal_archive` (neutrino time and
    /// p-value) and `timing_archive` (offset from the sub-group anchor),
    /// mirroring the sub-group's state at the moment it was touched.
    pub async fn archive_sub_group(&self, sub_group: &SubGroup, received_at: DateTime<Utc>) -> Result<(), DbError> {
        let expires_at = received_at + message_retention();
        let connection = self.client.connection()?;

        for entry in &sub_group.entries {
            connection
                .execute(
                    "INSERT OR REPLACE INTO signal_archive (id, sub_group_id, detector_name, neutrino_time_utc, p_val, received_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        entry.id.clone(),
                        sub_group.id as i64,
                        entry.detector_name.clone(),
                        entry.neutrino_time_utc.to_rfc3339(),
                        entry.p_val,
                        entry.received_time.to_rfc3339(),
                        expires_at.to_rfc3339(),
                    ],
                )
                .await?;

            connection
                .execute(
                    "INSERT OR REPLACE INTO timing_archive (id, sub_group_id, detector_name, offset_seconds, received_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.id.clone(),
                        sub_group.id as i64,
                        entry.detector_name.clone(),
                        entry.offset_seconds,
                        entry.received_time.to_rfc3339(),
                        expires_at.to_rfc3339(),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    /// Archives one published alert into `coincidence_alerts`.
    pub async fn archive_alert(&self, alert: &Alert) -> Result<(), DbError> {
        let expires_at = alert.emitted_at + message_retention();
        let detector_names: Vec<&str> = alert.members.iter().map(|m| m.detector_name.as_str()).collect();

        let connection = self.client.connection()?;
        connection
            .execute(
                "INSERT INTO coincidence_alerts (sub_group_id, alert_type, detector_names_json, false_alarm_prob, is_test, emitted_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    alert.sub_group_id as i64,
                    format!("{:?}", alert.alert_type),
                    serde_json::to_string(&detector_names).unwrap_or_default(),
                    format!("{:.3e}", alert.false_alarm_recurrence_years),
                    alert.is_test as i64,
                    alert.emitted_at.to_rfc3339(),
                    expires_at.to_rfc3339(),
                ],
            )
            .await?;
        Ok(())
    }

    /// Archives one heartbeat into `cached_heartbeats`.
    pub async fn archive_heartbeat(
        &self,
        detector_name: &str,
        received_at: DateTime<Utc>,
        stamped_at: DateTime<Utc>,
        latency_seconds: f64,
        status: &str,
    ) -> Result<(), DbError> {
        let expires_at = received_at + message_retention();
        let connection = self.client.connection()?;
        connection
            .execute(
                "INSERT INTO cached_heartbeats (detector_name, received_at, stamped_at, latency_seconds, status, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![detector_name, received_at.to_rfc3339(), stamped_at.to_rfc3339(), latency_seconds, status, expires_at.to_rfc3339()],
            )
            .await?;
        Ok(())
    }
}
