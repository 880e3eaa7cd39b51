use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    NewMessage,
    Update,
    Retraction,
}

impl AlertType {
    fn as_wire_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "NEW_MESSAGE",
            Self::Update => "UPDATE",
            Self::Retraction => "RETRACTION",
        }
    }
}

/// One (detector, neutrino time, p-value) triple carried on an alert, in
/// the sub-group's ascending neutrino-time order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMember {
    pub detector_name: String,
    pub neutrino_time_utc: DateTime<Utc>,
    pub p_val: Option<f64>,
}

/// The internal alert record the decider hands to the publisher. Distinct
/// from the wire schema (`OutboundAlert`) so the decider never has to know
/// about JSON formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub sub_group_id: u64,
    pub members: Vec<AlertMember>,
    pub mean_p_value: Option<f64>,
    pub false_alarm_recurrence_years: f64,
    pub server_tag: String,
    pub alert_type: AlertType,
    pub is_test: bool,
    pub emitted_at: DateTime<Utc>,
}

impl Alert {
    /// Builds the public SNEWS alert schema from this record.
    pub fn to_wire(&self) -> OutboundAlert {
        let is_update = matches!(self.alert_type, AlertType::Update) || self.members.len() > 2;
        let timestamp = self.emitted_at.to_rfc3339();
        let id = if is_update {
            format!("SNEWS_Coincidence_ALERT-UPDATE {timestamp}")
        } else {
            format!("SNEWS_Coincidence_ALERT {timestamp}")
        };
        let alert_type = if self.is_test {
            format!("TEST {}", self.alert_type.as_wire_str())
        } else {
            self.alert_type.as_wire_str().to_string()
        };

        OutboundAlert {
            id,
            alert_type,
            server_tag: self.server_tag.clone(),
            false_alarm_prob: format_recurrence(self.false_alarm_recurrence_years),
            detector_names: self.members.iter().map(|m| m.detector_name.clone()).collect(),
            sent_time: timestamp,
            p_values: self.members.iter().map(|m| m.p_val).collect(),
            neutrino_times: self.members.iter().map(|m| m.neutrino_time_utc.to_rfc3339()).collect(),
            p_values_average: self.mean_p_value,
            sub_list_number: self.sub_group_id,
        }
    }
}

fn format_recurrence(years: f64) -> String {
    if years <= 0.0 {
        return "Would happen every undefined (n < r) years".to_string();
    }
    format!("Would happen every {years:.2e} year")
}

/// The wire shape published to the alert topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundAlert {
    pub id: String,
    pub alert_type: String,
    pub server_tag: String,
    #[serde(rename = "False Alarm Prob")]
    pub false_alarm_prob: String,
    pub detector_names: Vec<String>,
    pub sent_time: String,
    pub p_values: Vec<Option<f64>>,
    pub neutrino_times: Vec<String>,
    #[serde(rename = "p_values average")]
    pub p_values_average: Option<f64>,
    #[serde(rename = "sub list number")]
    pub sub_list_number: u64,
}
