use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

const DETECTORS_JSON: &str = include_str!("assets/detectors.json");
const FEEDBACK_RECIPIENTS_JSON: &str = include_str!("assets/feedback_recipients.json");

static DETECTOR_REGISTRY: Lazy<HashSet<String>> = Lazy::new(|| {
    serde_json::from_str::<Vec<String>>(DETECTORS_JSON)
        .expect("bundled detectors.json must parse")
        .into_iter()
        .collect()
});

static FEEDBACK_RECIPIENTS: Lazy<HashMap<String, Vec<String>>> = Lazy::new(|| {
    serde_json::from_str(FEEDBACK_RECIPIENTS_JSON).expect("bundled feedback_recipients.json must parse")
});

/// Returns true if `detector_name` is a member of the closed detector registry.
pub fn is_known_detector(detector_name: &str) -> bool {
    DETECTOR_REGISTRY.contains(detector_name)
}

/// All detector names in the registry, in no particular order.
pub fn known_detectors() -> Vec<&'static str> {
    DETECTOR_REGISTRY.iter().map(String::as_str).collect()
}

/// Feedback recipient list for a detector, if it has one on file. Used to
/// authorise `Get-Feedback` admin commands before any side effect.
pub fn feedback_recipients(detector_name: &str) -> Option<&'static [String]> {
    FEEDBACK_RECIPIENTS.get(detector_name).map(Vec::as_slice)
}
