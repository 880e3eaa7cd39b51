//! Admin surface: `hard-reset`, `display-heartbeats`, `test-connection`,
//! and `Get-Feedback`. Every command is authorised by comparing a shared
//! secret against `admin_secret` on the raw payload; the comparison runs
//! in constant time so a timing side channel cannot leak how many
//! leading bytes matched. A deployment with no configured secret accepts
//! every admin command unauthenticated (local/dev use only).

use crate::engine::Engine;
use serde_json::Value;
use snews_domain_models::AdminCommand;
use snews_infra_transport::Topic;

/// A response the caller should publish back onto the bus, if any.
pub struct AdminResponse {
    pub topic: Topic,
    pub payload: Value,
}

pub async fn dispatch(engine: &mut Engine, command: AdminCommand, raw_payload: &Value) -> Option<AdminResponse> {
    if !authorised(engine, raw_payload) {
        tracing::warn!("rejected admin command: missing or incorrect shared secret");
        return None;
    }

    match command {
        AdminCommand::HardReset => {
            engine.reset();
            tracing::info!("cache cleared by hard-reset admin command");
            None
        }
        AdminCommand::TestConnection { raw } => {
            let mut echoed = raw;
            echoed["meta"]["status"] = Value::String("received".to_string());
            Some(AdminResponse { topic: Topic::ConnectionTest, payload: echoed })
        }
        AdminCommand::DisplayHeartbeats => {
            let live = engine.live_detector_names().await;
            tracing::info!(?live, "display-heartbeats admin command");
            None
        }
        AdminCommand::GetFeedback { detector_name } => {
            match snews_domain_models::registry::feedback_recipients(&detector_name) {
                Some(recipients) => {
                    tracing::info!(detector = %detector_name, ?recipients, "feedback recipients resolved for Get-Feedback");
                }
                None => tracing::warn!(detector = %detector_name, "Get-Feedback requested for a detector with no recipients on file"),
            }
            None
        }
    }
}

fn authorised(engine: &Engine, raw_payload: &Value) -> bool {
    let Some(expected) = engine.config().admin_shared_secret.as_deref() else {
        return true;
    };
    let provided = raw_payload.get("admin_secret").and_then(Value::as_str).unwrap_or_default();
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(provided.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_rejects_mismatched_length() {
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn constant_time_eq_accepts_identical_secrets() {
        assert!(constant_time_eq(b"topsecret", b"topsecret"));
    }

    #[test]
    fn constant_time_eq_rejects_single_byte_difference() {
        assert!(!constant_time_eq(b"topsecret", b"topsecreu"));
    }
}
