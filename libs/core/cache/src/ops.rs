//! Free functions implementing the sub-group formation rules. Kept
//! separate from [`crate::CoincidenceCache`] so the cache itself only has
//! to worry about staging and validating a mutation, not building one.

use chrono::{DateTime, Utc};
use snews_domain_models::{CacheEntry, Observation, SubGroup, SubGroupStateTag};
use std::collections::{BTreeSet, HashSet};

/// Seconds elapsed from `from` to `to`; negative if `to` precedes `from`.
pub fn delta_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_nanoseconds().unwrap_or(i64::MAX) as f64 / 1_000_000_000.0
}

pub fn to_cache_entry(obs: &Observation, received_time: DateTime<Utc>) -> CacheEntry {
    CacheEntry {
        id: obs.id.clone(),
        detector_name: obs.detector_name.clone(),
        sent_time_utc: obs.sent_time_utc,
        neutrino_time_utc: obs.neutrino_time_utc,
        p_val: obs.p_val,
        meta: obs.meta.clone(),
        is_test: obs.is_test,
        offset_seconds: 0.0,
        received_time,
    }
}

fn entry_id_set(sg: &SubGroup) -> BTreeSet<String> {
    sg.entries.iter().map(|e| e.id.clone()).collect()
}

/// Sorts entries by neutrino time, makes the earliest the anchor, and
/// recomputes every offset against it. Offsets never remain negative.
pub fn recompute_offsets(sg: &mut SubGroup) {
    sg.entries.sort_by_key(|e| e.neutrino_time_utc);
    let Some(anchor_time) = sg.entries.first().map(|e| e.neutrino_time_utc) else { return };
    for entry in sg.entries.iter_mut() {
        entry.offset_seconds = delta_seconds(anchor_time, entry.neutrino_time_utc);
    }
}

/// `true` if the detector already has an entry somewhere in the cache.
pub fn detector_known(sub_groups: &[SubGroup], detector_name: &str) -> bool {
    sub_groups.iter().any(|sg| sg.contains_detector(detector_name))
}

/// Update path: overwrites in place within every sub-group
/// whose anchor is within `window` of the new neutrino time; sub-groups
/// outside the window are left untouched.
pub fn apply_update(
    sub_groups: &mut [SubGroup],
    obs: &Observation,
    received_time: DateTime<Utc>,
    window: f64,
) -> Vec<u64> {
    let mut touched = Vec::new();
    for sg in sub_groups.iter_mut() {
        let Some(position) = sg.entries.iter().position(|e| e.detector_name == obs.detector_name) else {
            continue;
        };
        let anchor_time = sg.entries[0].neutrino_time_utc;
        if delta_seconds(anchor_time, obs.neutrino_time_utc).abs() > window {
            continue;
        }
        sg.entries[position] = to_cache_entry(obs, received_time);
        recompute_offsets(sg);
        sg.state = SubGroupStateTag::Update;
        touched.push(sg.id);
    }
    touched
}

/// Case (c): appends the new message to every sub-group whose anchor
/// precedes it by `0 < delta <= window`. Returns the touched sub-group ids;
/// empty if the message was not coincident with anything.
pub fn apply_coincident(sub_groups: &mut [SubGroup], obs: &Observation, received_time: DateTime<Utc>, window: f64) -> Vec<u64> {
    let mut touched = Vec::new();
    for sg in sub_groups.iter_mut() {
        let anchor_time = sg.entries[0].neutrino_time_utc;
        let delta = delta_seconds(anchor_time, obs.neutrino_time_utc);
        if delta > 0.0 && delta <= window {
            let mut entry = to_cache_entry(obs, received_time);
            entry.offset_seconds = delta;
            sg.entries.push(entry);
            sg.entries.sort_by_key(|e| e.neutrino_time_utc);
            sg.state = SubGroupStateTag::CoincMsg;
            touched.push(sg.id);
        }
    }
    touched
}

/// Case (d): the message is not coincident with any existing sub-group.
/// Forms up to two new sub-groups (post and early), eliminates redundant
/// candidates and supersedes pre-existing sub-groups they make obsolete.
pub fn form_new_subgroups(
    sub_groups: &mut Vec<SubGroup>,
    next_id: &mut u64,
    obs: &Observation,
    received_time: DateTime<Utc>,
    window: f64,
) -> Vec<u64> {
    let anchor_time = obs.neutrino_time_utc;

    let mut seen = HashSet::new();
    let mut all_entries: Vec<CacheEntry> = Vec::new();
    for sg in sub_groups.iter() {
        for entry in &sg.entries {
            let key = (entry.detector_name.clone(), entry.neutrino_time_utc);
            if seen.insert(key) {
                all_entries.push(entry.clone());
            }
        }
    }

    let new_entry = to_cache_entry(obs, received_time);

    let post_entries: Vec<CacheEntry> = all_entries
        .iter()
        .filter(|e| {
            let delta = delta_seconds(anchor_time, e.neutrino_time_utc);
            delta > 0.0 && delta <= window
        })
        .cloned()
        .collect();
    let early_entries: Vec<CacheEntry> = all_entries
        .iter()
        .filter(|e| {
            let delta = delta_seconds(anchor_time, e.neutrino_time_utc);
            delta < 0.0 && delta >= -window
        })
        .cloned()
        .collect();

    let mut candidates: Vec<SubGroup> = Vec::new();

    let mut post_group_entries = vec![new_entry.clone()];
    post_group_entries.extend(post_entries);
    let mut post_group = SubGroup { id: 0, entries: post_group_entries, state: SubGroupStateTag::None };
    recompute_offsets(&mut post_group);
    candidates.push(post_group);

    if !early_entries.is_empty() {
        let mut early_group_entries = vec![new_entry];
        early_group_entries.extend(early_entries);
        let mut early_group = SubGroup { id: 0, entries: early_group_entries, state: SubGroupStateTag::None };
        recompute_offsets(&mut early_group);
        candidates.push(early_group);
    }

    // Redundancy elimination among the freshly formed candidates.
    let candidate_id_sets: Vec<BTreeSet<String>> = candidates.iter().map(entry_id_set).collect();
    let mut surviving: Vec<SubGroup> = Vec::new();
    for (i, candidate) in candidates.into_iter().enumerate() {
        let is_subset_of_sibling = candidate_id_sets.iter().enumerate().any(|(j, other)| {
            i != j && candidate_id_sets[i].is_subset(other) && candidate_id_sets[i].len() < other.len()
        });
        if !is_subset_of_sibling {
            surviving.push(candidate);
        }
    }

    // Redundancy elimination against pre-existing sub-groups (invariant d).
    surviving.retain(|candidate| {
        let candidate_ids = entry_id_set(candidate);
        !sub_groups.iter().any(|sg| {
            let sg_ids = entry_id_set(sg);
            candidate_ids.is_subset(&sg_ids) && candidate_ids.len() < sg_ids.len()
        })
    });

    // Pre-existing sub-groups made obsolete by a surviving candidate are superseded.
    let mut superseded_indices: Vec<usize> = Vec::new();
    for (index, sg) in sub_groups.iter().enumerate() {
        let sg_ids = entry_id_set(sg);
        let superseded = surviving.iter().any(|candidate| {
            let candidate_ids = entry_id_set(candidate);
            sg_ids.is_subset(&candidate_ids) && sg_ids.len() < candidate_ids.len()
        });
        if superseded {
            superseded_indices.push(index);
        }
    }
    for index in superseded_indices.into_iter().rev() {
        sub_groups.remove(index);
    }

    let mut touched = Vec::new();
    for mut candidate in surviving {
        let id = *next_id;
        *next_id += 1;
        candidate.id = id;
        candidate.state = if candidate.entries.len() >= 2 {
            SubGroupStateTag::CoincMsgStaggered
        } else {
            SubGroupStateTag::None
        };
        touched.push(id);
        sub_groups.push(candidate);
    }

    touched
}
