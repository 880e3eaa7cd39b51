use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The second underscore-delimited token of an inbound `id`, used to route
/// the payload to the right handler before any other field is inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    CoincidenceTier,
    Heartbeat,
    Retraction,
    HardReset,
    TestConnection,
    DisplayHeartbeats,
    GetFeedback,
}

impl MessageKind {
    /// Parses the kind token out of a raw `id` field, e.g. `"123_CoincidenceTier_0"`.
    pub fn from_id(id: &str) -> Option<Self> {
        let token = id.split('_').nth(1)?;
        Some(match token {
            "CoincidenceTier" => Self::CoincidenceTier,
            "Heartbeat" => Self::Heartbeat,
            "Retraction" => Self::Retraction,
            "hard-reset" => Self::HardReset,
            "test-connection" => Self::TestConnection,
            "display-heartbeats" => Self::DisplayHeartbeats,
            "Get-Feedback" => Self::GetFeedback,
            _ => return None,
        })
    }
}

/// Detector liveness flag carried on heartbeat payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectorStatus {
    On,
    Off,
}

/// A validated observation message, immutable once admitted to the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub detector_name: String,
    pub sent_time_utc: DateTime<Utc>,
    pub neutrino_time_utc: DateTime<Utc>,
    pub p_val: Option<f64>,
    #[serde(default)]
    pub meta: Value,
    pub is_test: bool,
}

/// A validated heartbeat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub id: String,
    pub detector_name: String,
    pub sent_time_utc: DateTime<Utc>,
    pub detector_status: DetectorStatus,
}

/// A validated retraction request: remove one detector's entries from the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractionMessage {
    pub id: String,
    pub detector_name: String,
}

/// Remote admin commands, authorised by shared secret before they reach here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdminCommand {
    HardReset,
    TestConnection { raw: Value },
    DisplayHeartbeats,
    GetFeedback { detector_name: String },
}

/// The outcome of classifying one decoded inbound payload.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Observation(Observation),
    Heartbeat(HeartbeatMessage),
    Retraction(RetractionMessage),
    Admin(AdminCommand),
}
