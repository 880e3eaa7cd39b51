//! End-to-end coincidence scenarios (S1-S6), driving only the cache —
//! alert-decider classification is covered separately in
//! `snews-core-decider`'s own test suite.

use chrono::Utc;
use serde_json::Value;
use snews_core_cache::{CacheConfig, CoincidenceCache};
use snews_domain_models::{Observation, SubGroupStateTag};

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

#[test]
fn s1_single_detector_in_no_alert() {
    let mut cache = CoincidenceCache::new(CacheConfig::default());
    let transitions = cache.admit(&obs("XENONnT", "2030-01-01T00:00:00.000000Z"), Utc::now()).unwrap();

    assert_eq!(cache.sub_groups().len(), 1);
    assert_eq!(transitions[0].state, SubGroupStateTag::Initial);
    assert_eq!(cache.sub_groups()[0].entries.len(), 1);
}

#[test]
fn s2_two_way_coincidence() {
    let mut cache = CoincidenceCache::new(CacheConfig::default());
    cache.admit(&obs("XENONnT", "2030-01-01T00:00:00.000000Z"), Utc::now()).unwrap();
    let transitions = cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.500000Z"), Utc::now()).unwrap();

    assert_eq!(cache.sub_groups().len(), 1);
    let sg = cache.sub_group(transitions[0].sub_group_id).unwrap();
    assert_eq!(sg.entries.len(), 2);
    assert_eq!(sg.detector_names(), vec!["XENONnT", "KamLAND"]);
    assert_eq!(sg.mean_p_value(), Some(0.3));
}

#[test]
fn s3_late_arriving_earlier_message() {
    let mut cache = CoincidenceCache::new(CacheConfig::default());
    cache.admit(&obs("XENONnT", "2030-01-01T00:00:00.000000Z"), Utc::now()).unwrap();
    let transitions = cache.admit(&obs("SK", "2029-12-31T23:59:57.000000Z"), Utc::now()).unwrap();

    assert_eq!(cache.sub_groups().len(), 1, "the original singleton must be superseded, not kept alongside");
    let sg = cache.sub_group(transitions[0].sub_group_id).unwrap();
    assert_eq!(sg.entries[0].detector_name, "SK");
    assert_eq!(sg.entries[0].offset_seconds, 0.0);
    assert!((sg.entries[1].offset_seconds - 3.0).abs() < 1e-6);
}

#[test]
fn s4_update() {
    let mut cache = CoincidenceCache::new(CacheConfig::default());
    cache.admit(&obs("XENONnT", "2030-01-01T00:00:00.000000Z"), Utc::now()).unwrap();
    cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.500000Z"), Utc::now()).unwrap();

    let mut updated = obs("XENONnT", "2030-01-01T00:00:00.500000Z");
    updated.p_val = Some(0.6);
    let transitions = cache.admit(&updated, Utc::now()).unwrap();

    assert_eq!(transitions[0].state, SubGroupStateTag::Update);
    let sg = cache.sub_group(transitions[0].sub_group_id).unwrap();
    assert_eq!(sg.entries.len(), 2, "size is unchanged by an update");
    assert_eq!(sg.entries[0].detector_name, "XENONnT");
    assert_eq!(sg.entries[0].offset_seconds, 0.0);
}

#[test]
fn s5_retraction() {
    let mut cache = CoincidenceCache::new(CacheConfig::default());
    cache.admit(&obs("XENONnT", "2030-01-01T00:00:00.000000Z"), Utc::now()).unwrap();
    cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.500000Z"), Utc::now()).unwrap();

    let transitions = cache.retract("KamLAND").unwrap();
    assert_eq!(transitions[0].state, SubGroupStateTag::Retraction);
    assert_eq!(transitions[0].size, 1);
    assert_eq!(cache.sub_groups().len(), 1, "the sub-group is not deleted, just shrunk");
}

#[test]
fn s6_out_of_window_message() {
    let mut cache = CoincidenceCache::new(CacheConfig::default());
    cache.admit(&obs("XENONnT", "2030-01-01T00:00:00.000000Z"), Utc::now()).unwrap();
    cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.500000Z"), Utc::now()).unwrap();

    let transitions = cache.admit(&obs("Borexino", "2030-01-01T00:00:30.000000Z"), Utc::now()).unwrap();

    assert_eq!(cache.sub_groups().len(), 2);
    assert_eq!(transitions[0].state, SubGroupStateTag::None, "singleton survivor carries no alertable state");
}
