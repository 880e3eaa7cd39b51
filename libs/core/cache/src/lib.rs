//! The coincidence cache: the central data structure of the engine.
//!
//! Holds every observation currently inside the coincidence window,
//! partitioned into sub-groups anchored by an initial neutrino time. See
//! [`CoincidenceCache::admit`] for the four admission cases (empty, update,
//! coincident, not-coincident) and [`CoincidenceCache::retract`] for
//! detector withdrawal.

pub mod config;
pub mod error;
pub mod ops;

use chrono::{DateTime, Utc};
use snews_domain_models::{CacheSnapshot, Observation, SubGroup, SubGroupStateTag};

pub use config::CacheConfig;
pub use error::CacheError;

/// What changed on the most recent [`CoincidenceCache::admit`] or
/// [`CoincidenceCache::retract`] call, per touched sub-group. Consumed by
/// the alert decider; the size recorded is the size *after* the mutation.
#[derive(Debug, Clone, Copy)]
pub struct SubGroupTransition {
    pub sub_group_id: u64,
    pub state: SubGroupStateTag,
    pub size: usize,
}

/// The central coincidence cache. Owns all sub-groups currently inside the
/// window; every public operation either fully applies or leaves the cache
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct CoincidenceCache {
    config: CacheConfig,
    sub_groups: Vec<SubGroup>,
    next_sub_group_id: u64,
}

impl CoincidenceCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { config, sub_groups: Vec::new(), next_sub_group_id: 0 }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn sub_groups(&self) -> &[SubGroup] {
        &self.sub_groups
    }

    pub fn sub_group(&self, id: u64) -> Option<&SubGroup> {
        self.sub_groups.iter().find(|sg| sg.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.sub_groups.is_empty()
    }

    /// Admits a validated observation. Dispatches to the case that applies:
    ///
    /// - empty cache: new singleton sub-group, tag INITIAL
    /// - known detector: update path, tag UPDATE on every sub-group touched
    /// - otherwise: append to every sub-group coincident with the anchor
    ///   (tag COINC_MSG), or, if none are coincident, form new post/early
    ///   sub-groups seeded by the message (tag COINC_MSG_STAGGERED or None
    ///   for a surviving singleton)
    ///
    /// Returns the transitions produced, in the order the sub-groups were
    /// touched. Never partially applies: on [`CacheError`] the cache is
    /// left exactly as it was before the call.
    pub fn admit(
        &mut self,
        obs: &Observation,
        received_time: DateTime<Utc>,
    ) -> Result<Vec<SubGroupTransition>, CacheError> {
        let mut staged = self.sub_groups.clone();
        let mut staged_next_id = self.next_sub_group_id;
        let window = self.config.window_seconds;

        let touched: Vec<u64> = if staged.is_empty() {
            let entry = ops::to_cache_entry(obs, received_time);
            let sub_group = SubGroup {
                id: staged_next_id,
                entries: vec![entry],
                state: SubGroupStateTag::Initial,
            };
            let id = sub_group.id;
            staged_next_id += 1;
            staged.push(sub_group);
            vec![id]
        } else if ops::detector_known(&staged, &obs.detector_name) {
            ops::apply_update(&mut staged, obs, received_time, window)
        } else {
            let coincident = ops::apply_coincident(&mut staged, obs, received_time, window);
            if coincident.is_empty() {
                ops::form_new_subgroups(&mut staged, &mut staged_next_id, obs, received_time, window)
            } else {
                coincident
            }
        };

        validate_invariants(&staged, window)?;

        let transitions = touched
            .iter()
            .filter_map(|id| staged.iter().find(|sg| sg.id == *id))
            .map(|sg| SubGroupTransition { sub_group_id: sg.id, state: sg.state, size: sg.entries.len() })
            .collect();

        self.sub_groups = staged;
        self.next_sub_group_id = staged_next_id;
        Ok(transitions)
    }

    /// Removes every entry authored by `detector_name` from every
    /// sub-group. A sub-group whose anchor is removed gets its offsets
    /// recomputed against the new earliest entry; a sub-group left empty
    /// is deleted. Every touched (non-deleted) sub-group is tagged
    /// RETRACTION.
    pub fn retract(&mut self, detector_name: &str) -> Result<Vec<SubGroupTransition>, CacheError> {
        let mut staged = self.sub_groups.clone();
        let mut touched = Vec::new();

        for sg in staged.iter_mut() {
            let before = sg.entries.len();
            sg.entries.retain(|e| e.detector_name != detector_name);
            if sg.entries.len() != before {
                ops::recompute_offsets(sg);
                sg.state = SubGroupStateTag::Retraction;
                touched.push(sg.id);
            }
        }
        staged.retain(|sg| !sg.entries.is_empty());

        validate_invariants(&staged, self.config.window_seconds)?;

        let transitions = touched
            .iter()
            .filter_map(|id| staged.iter().find(|sg| sg.id == *id))
            .map(|sg| SubGroupTransition { sub_group_id: sg.id, state: sg.state, size: sg.entries.len() })
            .collect();

        self.sub_groups = staged;
        Ok(transitions)
    }

    /// Discards every entry and sub-group; lifecycle returns to empty.
    pub fn reset(&mut self) {
        self.sub_groups.clear();
        self.next_sub_group_id = 0;
    }

    /// Evicts sub-groups whose anchor neutrino time is older than
    /// `now - expiration`.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) {
        let expiration = chrono::Duration::seconds(self.config.expiration_seconds);
        self.sub_groups.retain(|sg| {
            sg.entries.first().map(|anchor| now - anchor.neutrino_time_utc < expiration).unwrap_or(false)
        });
    }

    /// Clears every sub-group's transient state tag to `None`. Called by
    /// the alert decider once it has finished classifying a pass.
    pub fn clear_state_tags(&mut self) {
        for sg in self.sub_groups.iter_mut() {
            sg.state = SubGroupStateTag::None;
        }
    }

    pub fn to_snapshot(&self) -> CacheSnapshot {
        CacheSnapshot { sub_groups: self.sub_groups.clone(), next_sub_group_id: self.next_sub_group_id }
    }

    pub fn from_snapshot(config: CacheConfig, snapshot: CacheSnapshot) -> Self {
        Self { config, sub_groups: snapshot.sub_groups, next_sub_group_id: snapshot.next_sub_group_id }
    }
}

/// Checks invariants 1-3 from the testable-properties list against a
/// staged sub-group set before it is committed. Invariant (d), subset
/// redundancy, is enforced constructively inside [`ops::form_new_subgroups`]
/// rather than checked here, since an update/retraction never introduces a
/// new subset relationship among pre-existing sub-groups.
fn validate_invariants(sub_groups: &[SubGroup], window: f64) -> Result<(), CacheError> {
    for sg in sub_groups {
        let Some(anchor) = sg.entries.first() else { continue };
        if anchor.offset_seconds.abs() > 1e-6 {
            return Err(CacheError::AnchorNotZero(sg.id));
        }
        for entry in &sg.entries {
            if entry.offset_seconds.abs() > window + 1e-6 {
                return Err(CacheError::OffsetOutOfWindow {
                    entry_id: entry.id.clone(),
                    offset: entry.offset_seconds,
                    window,
                });
            }
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &sg.entries {
            if !seen.insert(entry.detector_name.as_str()) {
                return Err(CacheError::DuplicateDetector(sg.id, entry.detector_name.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

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
    fn empty_cache_admits_a_singleton_initial_group() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        let transitions = cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].state, SubGroupStateTag::Initial);
        assert_eq!(cache.sub_groups().len(), 1);
        assert_eq!(cache.sub_groups()[0].entries[0].offset_seconds, 0.0);
    }

    #[test]
    fn two_way_coincidence_appends_with_positive_offset() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", Some(0.2)), Utc::now()).unwrap();
        let transitions = cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", Some(0.4)), Utc::now()).unwrap();

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].state, SubGroupStateTag::CoincMsg);
        let sg = cache.sub_group(transitions[0].sub_group_id).unwrap();
        assert_eq!(sg.entries.len(), 2);
        assert_eq!(sg.entries[0].detector_name, "XENONnT");
        assert!((sg.entries[1].offset_seconds - 3.5).abs() < 1e-9);
    }

    #[test]
    fn out_of_window_message_forms_a_new_singleton() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", None), Utc::now()).unwrap();
        let transitions = cache.admit(&obs("Borexino", "2030-01-01T00:00:30Z", None), Utc::now()).unwrap();

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].state, SubGroupStateTag::None);
        assert_eq!(cache.sub_groups().len(), 2);
    }

    #[test]
    fn late_arriving_earlier_message_becomes_the_new_anchor() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        let transitions = cache.admit(&obs("SK", "2029-12-31T23:59:57Z", None), Utc::now()).unwrap();

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].state, SubGroupStateTag::CoincMsgStaggered);
        let sg = cache.sub_group(transitions[0].sub_group_id).unwrap();
        assert_eq!(sg.entries[0].detector_name, "SK");
        assert_eq!(sg.entries[0].offset_seconds, 0.0);
        assert!((sg.entries[1].offset_seconds - 3.0).abs() < 1e-9);
        // the original singleton sub-group is now a subset and was superseded
        assert_eq!(cache.sub_groups().len(), 1);
    }

    #[test]
    fn update_recomputes_offsets_against_new_minimum() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", Some(0.1)), Utc::now()).unwrap();
        cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", Some(0.2)), Utc::now()).unwrap();

        let update = obs("XENONnT", "2030-01-01T00:00:00.5Z", Some(0.15));
        let transitions = cache.admit(&update, Utc::now()).unwrap();

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].state, SubGroupStateTag::Update);
        let sg = cache.sub_group(transitions[0].sub_group_id).unwrap();
        assert_eq!(sg.entries.len(), 2);
        assert_eq!(sg.entries[0].detector_name, "XENONnT");
        assert_eq!(sg.entries[0].offset_seconds, 0.0);
        assert!((sg.entries[1].offset_seconds - 3.0).abs() < 1e-9);
    }

    #[test]
    fn retraction_shrinks_the_subgroup_without_deleting_it() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", None), Utc::now()).unwrap();

        let transitions = cache.retract("KamLAND").unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].state, SubGroupStateTag::Retraction);
        assert_eq!(transitions[0].size, 1);
        assert_eq!(cache.sub_groups().len(), 1);
    }

    #[test]
    fn retraction_of_the_only_entry_deletes_the_subgroup() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        cache.retract("XENONnT").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn reset_discards_everything() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        cache.reset();
        assert!(cache.is_empty());
    }

    #[test]
    fn snapshot_round_trips() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        cache.admit(&obs("XENONnT", "2030-01-01T00:00:00Z", None), Utc::now()).unwrap();
        cache.admit(&obs("KamLAND", "2030-01-01T00:00:03.5Z", None), Utc::now()).unwrap();

        let snapshot = cache.to_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let reloaded: CacheSnapshot = serde_json::from_str(&json).unwrap();
        let restored = CoincidenceCache::from_snapshot(cache.config(), reloaded);

        assert_eq!(restored.sub_groups().len(), cache.sub_groups().len());
        assert_eq!(
            restored.sub_groups()[0].detector_names(),
            cache.sub_groups()[0].detector_names()
        );
    }

    #[test]
    fn repeated_admission_of_same_message_is_idempotent_in_content() {
        let mut cache = CoincidenceCache::new(CacheConfig::default());
        let message = obs("XENONnT", "2030-01-01T00:00:00Z", Some(0.3));
        cache.admit(&message, Utc::now()).unwrap();
        let before = cache.to_snapshot();
        cache.admit(&message, Utc::now()).unwrap();
        let after = cache.to_snapshot();
        assert_eq!(before.sub_groups.len(), after.sub_groups.len());
        assert_eq!(before.sub_groups[0].entries.len(), after.sub_groups[0].entries.len());
    }
}
