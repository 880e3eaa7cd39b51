//! Stateless classifier for inbound SNEWS payloads.
//!
//! [`MessageValidator::classify`] never panics: every malformed payload is
//! turned into a structured [`RejectReason`] instead.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use snews_domain_models::{
    registry, AdminCommand, DetectorStatus, HeartbeatMessage, InboundMessage, MessageKind,
    Observation, RetractionMessage,
};
use thiserror::Error;

/// A structured validation failure: a stable reason code plus a
/// human-readable message, so the runner can log and count rejections
/// without string-matching.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RejectReason {
    #[error("payload has no 'id' field")]
    MissingId,
    #[error("'id' field is not formatted as '<num>_<kind>_...'")]
    MalformedId,
    #[error("'{0}' is not a registered detector")]
    UnknownDetector(String),
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("'{0}' is not a valid ISO-8601 UTC timestamp")]
    InvalidTimestamp(String),
    #[error("neutrino_time_utc is outside the admissible (now-48h, now] window")]
    NeutrinoTimeOutOfWindow,
    #[error("p_val must be a float in (0,1), got {0}")]
    InvalidPValue(f64),
    #[error("detector_status must be 'ON' or 'OFF', got '{0}'")]
    InvalidStatus(String),
}

impl RejectReason {
    /// A short, stable machine-parseable code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingId => "MISSING_ID",
            Self::MalformedId => "MALFORMED_ID",
            Self::UnknownDetector(_) => "UNKNOWN_DETECTOR",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            Self::NeutrinoTimeOutOfWindow => "NEUTRINO_TIME_OUT_OF_WINDOW",
            Self::InvalidPValue(_) => "INVALID_P_VALUE",
            Self::InvalidStatus(_) => "INVALID_STATUS",
        }
    }
}

const OBSERVATION_LOOKBACK_HOURS: i64 = 48;

/// Classifies decoded payloads into observations, heartbeats, retractions,
/// or admin commands. Holds no mutable state of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageValidator;

impl MessageValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, payload: &Value, now: DateTime<Utc>) -> Result<InboundMessage, RejectReason> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or(RejectReason::MissingId)?;
        let kind = MessageKind::from_id(id).ok_or(RejectReason::MalformedId)?;

        match kind {
            MessageKind::CoincidenceTier => self.classify_observation(id, payload, now).map(InboundMessage::Observation),
            MessageKind::Heartbeat => self.classify_heartbeat(id, payload).map(InboundMessage::Heartbeat),
            MessageKind::Retraction => self.classify_retraction(id, payload).map(InboundMessage::Retraction),
            MessageKind::HardReset => Ok(InboundMessage::Admin(AdminCommand::HardReset)),
            MessageKind::TestConnection => Ok(InboundMessage::Admin(AdminCommand::TestConnection { raw: payload.clone() })),
            MessageKind::DisplayHeartbeats => Ok(InboundMessage::Admin(AdminCommand::DisplayHeartbeats)),
            MessageKind::GetFeedback => {
                let detector_name = required_detector_name(payload)?;
                Ok(InboundMessage::Admin(AdminCommand::GetFeedback { detector_name }))
            }
        }
    }

    fn classify_observation(&self, id: &str, payload: &Value, now: DateTime<Utc>) -> Result<Observation, RejectReason> {
        let detector_name = required_detector_name(payload)?;
        let sent_time_utc = required_timestamp(payload, "sent_time_utc")?;

        let neutrino_time_raw = payload
            .get("neutrino_time_utc")
            .and_then(Value::as_str)
            .ok_or_else(|| RejectReason::MissingField("neutrino_time_utc".into()))?;
        let neutrino_time_utc = parse_iso8601_utc(neutrino_time_raw)
            .ok_or_else(|| RejectReason::InvalidTimestamp(neutrino_time_raw.into()))?;

        let meta = payload.get("meta").cloned().unwrap_or(Value::Null);
        let is_test = meta.get("is_test").and_then(Value::as_bool).unwrap_or(false);

        if !is_test {
            let earliest = now - Duration::hours(OBSERVATION_LOOKBACK_HOURS);
            if neutrino_time_utc <= earliest || neutrino_time_utc > now {
                return Err(RejectReason::NeutrinoTimeOutOfWindow);
            }
        }

        let p_val = match payload.get("p_val") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = value.as_f64().ok_or_else(|| RejectReason::InvalidPValue(f64::NAN))?;
                if !(0.0 < parsed && parsed < 1.0) {
                    return Err(RejectReason::InvalidPValue(parsed));
                }
                Some(parsed)
            }
        };

        Ok(Observation {
            id: id.to_string(),
            detector_name,
            sent_time_utc,
            neutrino_time_utc,
            p_val,
            meta,
            is_test,
        })
    }

    fn classify_heartbeat(&self, id: &str, payload: &Value) -> Result<HeartbeatMessage, RejectReason> {
        let detector_name = required_detector_name(payload)?;
        let sent_time_utc = required_timestamp(payload, "sent_time_utc")?;
        let status_raw = payload
            .get("detector_status")
            .and_then(Value::as_str)
            .ok_or_else(|| RejectReason::MissingField("detector_status".into()))?;
        let detector_status = match status_raw {
            "ON" => DetectorStatus::On,
            "OFF" => DetectorStatus::Off,
            other => return Err(RejectReason::InvalidStatus(other.to_string())),
        };

        Ok(HeartbeatMessage {
            id: id.to_string(),
            detector_name,
            sent_time_utc,
            detector_status,
        })
    }

    fn classify_retraction(&self, id: &str, payload: &Value) -> Result<RetractionMessage, RejectReason> {
        let detector_name = required_detector_name(payload)?;
        Ok(RetractionMessage { id: id.to_string(), detector_name })
    }
}

fn required_detector_name(payload: &Value) -> Result<String, RejectReason> {
    let detector_name = payload
        .get("detector_name")
        .and_then(Value::as_str)
        .ok_or_else(|| RejectReason::MissingField("detector_name".into()))?;
    if !registry::is_known_detector(detector_name) {
        return Err(RejectReason::UnknownDetector(detector_name.to_string()));
    }
    Ok(detector_name.to_string())
}

fn required_timestamp(payload: &Value, field: &str) -> Result<DateTime<Utc>, RejectReason> {
    let raw = payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RejectReason::MissingField(field.into()))?;
    parse_iso8601_utc(raw).ok_or_else(|| RejectReason::InvalidTimestamp(raw.into()))
}

/// Accepts ISO-8601 UTC with up to 12 fractional digits and an optional
/// trailing `Z`.
fn parse_iso8601_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // chrono's RFC3339 parser rejects more than 9 fractional digits; fall
    // back to truncating to nanosecond precision, matching the original
    // implementation's tolerance for up to 12 fractional digits.
    let truncated = truncate_fractional_digits(raw, 9);
    DateTime::parse_from_rfc3339(&truncated)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn truncate_fractional_digits(raw: &str, max_digits: usize) -> String {
    let Some(dot) = raw.find('.') else { return raw.to_string() };
    let (whole, rest) = raw.split_at(dot + 1);
    let digit_count = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_count <= max_digits {
        return raw.to_string();
    }
    let tail = &rest[digit_count..];
    format!("{whole}{}{tail}", &rest[..max_digits])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2030-01-01T00:00:10Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn accepts_a_well_formed_observation() {
        let payload = json!({
            "id": "1_CoincidenceTier_0",
            "detector_name": "XENONnT",
            "sent_time_utc": "2030-01-01T00:00:09Z",
            "neutrino_time_utc": "2030-01-01T00:00:00.000000Z",
            "p_val": 0.5,
            "meta": {}
        });
        let result = MessageValidator::new().classify(&payload, now());
        assert!(matches!(result, Ok(InboundMessage::Observation(_))));
    }

    #[test]
    fn rejects_unknown_detector() {
        let payload = json!({
            "id": "1_CoincidenceTier_0",
            "detector_name": "NotReal",
            "sent_time_utc": "2030-01-01T00:00:09Z",
            "neutrino_time_utc": "2030-01-01T00:00:00Z",
        });
        let err = MessageValidator::new().classify(&payload, now()).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_DETECTOR");
    }

    #[test]
    fn rejects_neutrino_time_outside_48h_window_unless_test() {
        let stale = json!({
            "id": "1_CoincidenceTier_0",
            "detector_name": "XENONnT",
            "sent_time_utc": "2030-01-01T00:00:09Z",
            "neutrino_time_utc": "2020-01-01T00:00:00Z",
        });
        let err = MessageValidator::new().classify(&stale, now()).unwrap_err();
        assert_eq!(err.code(), "NEUTRINO_TIME_OUT_OF_WINDOW");

        let test_stale = json!({
            "id": "1_CoincidenceTier_0",
            "detector_name": "XENONnT",
            "sent_time_utc": "2030-01-01T00:00:09Z",
            "neutrino_time_utc": "2020-01-01T00:00:00Z",
            "meta": {"is_test": true},
        });
        assert!(MessageValidator::new().classify(&test_stale, now()).is_ok());
    }

    #[test]
    fn rejects_p_value_out_of_range() {
        let payload = json!({
            "id": "1_CoincidenceTier_0",
            "detector_name": "XENONnT",
            "sent_time_utc": "2030-01-01T00:00:09Z",
            "neutrino_time_utc": "2030-01-01T00:00:00Z",
            "p_val": 1.5,
        });
        let err = MessageValidator::new().classify(&payload, now()).unwrap_err();
        assert_eq!(err.code(), "INVALID_P_VALUE");
    }

    #[test]
    fn classifies_heartbeat_and_retraction_and_admin() {
        let hb = json!({
            "id": "1_Heartbeat_0",
            "detector_name": "XENONnT",
            "sent_time_utc": "2030-01-01T00:00:09Z",
            "detector_status": "ON",
        });
        assert!(matches!(
            MessageValidator::new().classify(&hb, now()),
            Ok(InboundMessage::Heartbeat(_))
        ));

        let retraction = json!({
            "id": "1_Retraction_0",
            "detector_name": "XENONnT",
        });
        assert!(matches!(
            MessageValidator::new().classify(&retraction, now()),
            Ok(InboundMessage::Retraction(_))
        ));

        let reset = json!({"id": "1_hard-reset_0"});
        assert!(matches!(
            MessageValidator::new().classify(&reset, now()),
            Ok(InboundMessage::Admin(AdminCommand::HardReset))
        ));
    }
}
