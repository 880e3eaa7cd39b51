use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One observation as held inside the coincidence cache: the original
/// fields plus the bookkeeping the cache assigns on admission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub id: String,
    pub detector_name: String,
    pub sent_time_utc: DateTime<Utc>,
    pub neutrino_time_utc: DateTime<Utc>,
    pub p_val: Option<f64>,
    pub meta: Value,
    pub is_test: bool,
    /// Signed offset in seconds from the owning sub-group's anchor.
    pub offset_seconds: f64,
    /// Engine-assigned wall-clock time of admission.
    pub received_time: DateTime<Utc>,
}

/// Transient classification of what happened to a sub-group on the most
/// recent cache mutation; cleared to `None` after every alert-decider pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubGroupStateTag {
    None,
    Initial,
    CoincMsg,
    CoincMsgStaggered,
    Update,
    Retraction,
}

impl Default for SubGroupStateTag {
    fn default() -> Self {
        Self::None
    }
}

/// A maximal coincident cluster of observations under the coincidence window.
/// Entries are kept sorted by neutrino time ascending; `entries[0]` is always
/// the anchor and always carries `offset_seconds == 0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubGroup {
    pub id: u64,
    pub entries: Vec<CacheEntry>,
    pub state: SubGroupStateTag,
}

impl SubGroup {
    pub fn detector_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.detector_name.as_str()).collect()
    }

    pub fn entry_ids(&self) -> std::collections::BTreeSet<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn contains_detector(&self, detector_name: &str) -> bool {
        self.entries.iter().any(|e| e.detector_name == detector_name)
    }

    pub fn mean_p_value(&self) -> Option<f64> {
        let values: Vec<f64> = self.entries.iter().filter_map(|e| e.p_val).collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// A serialisable, order-independent view of the whole cache, used for the
/// round-trip property and for diagnostic admin commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub sub_groups: Vec<SubGroup>,
    pub next_sub_group_id: u64,
}
