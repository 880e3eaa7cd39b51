//! Classifies cache transitions into alerts. Driven after every admission
//! or retraction: scans every sub-group whose transient state tag is not
//! `None`, decides whether the transition is genuine enough to publish,
//! and clears every tag once the pass completes.

use chrono::{DateTime, Utc};
use snews_core_cache::CoincidenceCache;
use snews_core_calculator::{false_alarm_recurrence_years, FalseAlarmParams};
use snews_domain_models::{Alert, AlertMember, AlertType, SubGroupStateTag};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// What the decider remembers about a sub-group between passes: enough to
/// tell whether a later pass represents a genuine change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Remembered {
    size: usize,
    content_fingerprint: u64,
}

/// Classifies sub-group transitions and builds alert records. Holds the
/// remembered size/content of every sub-group it has seen, so a second
/// admission that leaves a sub-group unchanged publishes nothing
/// (idempotence).
#[derive(Debug, Clone)]
pub struct AlertDecider {
    server_tag: String,
    remembered: HashMap<u64, Remembered>,
}

impl AlertDecider {
    pub fn new(server_tag: impl Into<String>) -> Self {
        Self { server_tag: server_tag.into(), remembered: HashMap::new() }
    }

    /// Runs one decider pass over `cache`: for every sub-group whose state
    /// tag is not `None`, classifies the transition, builds an `Alert` if
    /// it is a genuine change, then clears every tag in the cache.
    pub fn process(
        &mut self,
        cache: &mut CoincidenceCache,
        live_detector_count: usize,
        calc_params: FalseAlarmParams,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for sub_group in cache.sub_groups() {
            if sub_group.state == SubGroupStateTag::None {
                continue;
            }

            let new_size = sub_group.entries.len();
            let previous = self.remembered.get(&sub_group.id).copied();
            let fingerprint = content_fingerprint(sub_group);

            let should_publish = match sub_group.state {
                SubGroupStateTag::None => false,
                SubGroupStateTag::Initial => false,
                SubGroupStateTag::CoincMsg => new_size > previous.map(|p| p.size).unwrap_or(0),
                SubGroupStateTag::CoincMsgStaggered => previous.is_none() && new_size >= 2,
                SubGroupStateTag::Update => {
                    new_size >= 2 && previous.map(|p| p.content_fingerprint != fingerprint).unwrap_or(true)
                }
                SubGroupStateTag::Retraction => new_size < previous.map(|p| p.size).unwrap_or(usize::MAX),
            };

            if should_publish {
                let alert_type = match sub_group.state {
                    SubGroupStateTag::CoincMsg | SubGroupStateTag::CoincMsgStaggered => AlertType::NewMessage,
                    SubGroupStateTag::Update => AlertType::Update,
                    SubGroupStateTag::Retraction => AlertType::Retraction,
                    SubGroupStateTag::Initial | SubGroupStateTag::None => unreachable!(),
                };

                let members: Vec<AlertMember> = sub_group
                    .entries
                    .iter()
                    .map(|e| AlertMember {
                        detector_name: e.detector_name.clone(),
                        neutrino_time_utc: e.neutrino_time_utc,
                        p_val: e.p_val,
                    })
                    .collect();
                let is_test = sub_group.entries.iter().any(|e| e.is_test);
                let recurrence = false_alarm_recurrence_years(live_detector_count, new_size, calc_params);

                alerts.push(Alert {
                    sub_group_id: sub_group.id,
                    members,
                    mean_p_value: sub_group.mean_p_value(),
                    false_alarm_recurrence_years: recurrence,
                    server_tag: self.server_tag.clone(),
                    alert_type,
                    is_test,
                    emitted_at: now,
                });
            }

            self.remembered.insert(sub_group.id, Remembered { size: new_size, content_fingerprint: fingerprint });
        }

        cache.clear_state_tags();
        alerts
    }
}

fn content_fingerprint(sub_group: &snews_domain_models::SubGroup) -> u64 {
    let mut hasher = DefaultHasher::new();
    for entry in &sub_group.entries {
        entry.detector_name.hash(&mut hasher);
        entry.neutrino_time_utc.hash(&mut hasher);
        entry.p_val.map(|v| v.to_bits()).hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use snews_core_cache::CacheConfig;
    use snews_domain_models::Observation;

    fn obs(detector: &str, neutrino_time: &str, p_val: Option<f64>) -> Observation {
        Observation {
            id: format!("1_CoincidenceTier_{detector}"),
            detector_name: detector.to_string(),
            sent_time_utc: Utc::now(),
            neutrino_time_utc: neutrino_time.parse().unwrap(),
            p_val,
            meta: Value::Null,
            is_test: false,
        }
    }

    #[test]
    fn initial_singleton_publishes_nothing() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        let mut decider = AlertDecider::new("snews-test");
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();

        let alerts = decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn two_way_coincidence_publishes_new_message() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        let mut decider = AlertDecider::new("snews-test");
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", Some(0.2)), Utc::now()).unwrap();
        decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());

        cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", Some(0.4)), Utc::now()).unwrap();
        let alerts = decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::NewMessage);
        assert_eq!(alerts[0].members.len(), 2);
        assert_eq!(alerts[0].mean_p_value, Some(0.3));
    }

    #[test]
    fn update_with_no_content_change_publishes_nothing_the_second_time() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        let mut decider = AlertDecider::new("snews-test");
        let first = obs("XENONnT", "2030-01-01T00:00:00Z", Some(0.2));
        let second = obs("KamLAND", "2030-01-01T00:00:03.5Z", Some(0.4));
        cache.admit(&first, Utc::now()).unwrap();
        cache.admit(&second, Utc::now()).unwrap();
        decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());

        // re-admitting the identical XENONnT message is an update with no
        // content change: it must not publish a second alert.
        cache.admit(&first, Utc::now()).unwrap();
        let alerts = decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn genuine_update_publishes_update_alert() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        let mut decider = AlertDecider::new("snews-test");
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", Some(0.2)), Utc::now()).unwrap();
        cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", Some(0.4)), Utc::now()).unwrap();
        decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());

        let updated = obs("XENONnT", "2030-01-01T00:00:00.5Z", Some(0.9));
        cache.admit(&updated, Utc::now()).unwrap();
        let alerts = decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Update);
    }

    #[test]
    fn retraction_publishes_when_size_shrinks() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        let mut decider = AlertDecider::new("snews-test");
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", None), Utc::now()).unwrap();
        decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());

        cache.retract("KamLAND").unwrap();
        let alerts = decider.process(&mut cache, 8, FalseAlarmParams::default(), Utc::now());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Retraction);
        assert_eq!(alerts[0].members.len(), 1);
    }
}
