//! Rolling-window heartbeat monitor.
//!
//! Tracks per-detector liveness, latency and inter-arrival gaps over a
//! retention horizon (default 7 days), and derives the live-detector set
//! the false-alarm calculator needs. Runs independently of the coincidence
//! cache: the calculator consumes a [`HeartbeatSnapshot`] rather than the
//! monitor itself, so neither side imports the other.

use chrono::{DateTime, Duration, Utc};
use snews_domain_models::DetectorStatus;
use std::collections::HashMap;

/// One recorded heartbeat, after latency and inter-arrival gap have been
/// computed against the same detector's previous entry (0 if none).
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatEntry {
    pub detector_name: String,
    pub received_time: DateTime<Utc>,
    pub stamped_time: DateTime<Utc>,
    pub latency_seconds: f64,
    pub time_since_previous_seconds: f64,
    pub status: DetectorStatus,
}

/// How wide the heartbeat monitor's rolling retention window is, and the
/// window used to decide whether a detector currently counts as live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatConfig {
    pub retention: Duration,
    pub live_window: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { retention: Duration::days(7), live_window: Duration::days(7) }
    }
}

/// Immutable, cheaply-cloneable read-only view of the monitor's current
/// state, handed to the false-alarm calculator instead of the monitor
/// itself. Cloning is O(detectors), not O(heartbeats).
#[derive(Debug, Clone, Default)]
pub struct HeartbeatSnapshot {
    live_detectors: Vec<String>,
}

impl HeartbeatSnapshot {
    pub fn live_detectors(&self) -> &[String] {
        &self.live_detectors
    }

    pub fn live_detector_count(&self) -> usize {
        self.live_detectors.len()
    }
}

/// A silence warning: the named detector's last heartbeat is overdue
/// relative to its own recent beat cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct SilenceWarning {
    pub detector_name: String,
    pub time_since_last_beat_seconds: f64,
    pub expected_interval_seconds: f64,
}

const MIN_ENTRIES_FOR_SILENCE_CHECK: usize = 5;
const SILENCE_LOOKBACK_HOURS: i64 = 24;
const SILENCE_SIGMA_MULTIPLE: f64 = 3.0;

/// Owns the rolling heartbeat window. A single task should own one
/// instance; it writes only to its own state and publishes snapshots for
/// other components to read.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    entries: Vec<HeartbeatEntry>,
    /// Detectors for which a silence warning has already fired since their
    /// last heartbeat, so `scan_for_silence` does not repeat it every tick.
    silence_acknowledged: HashMap<String, bool>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self { config, entries: Vec::new(), silence_acknowledged: HashMap::new() }
    }

    /// Appends a heartbeat entry, computing latency and inter-arrival gap
    /// against the most recent entry from the same detector (0 if this is
    /// the detector's first beat), then drops entries past the retention
    /// horizon.
    pub fn record(&mut self, detector_name: &str, received_time: DateTime<Utc>, stamped_time: DateTime<Utc>, status: DetectorStatus) {
        let previous = self
            .entries
            .iter()
            .filter(|e| e.detector_name == detector_name)
            .max_by_key(|e| e.received_time);

        let time_since_previous_seconds = previous
            .map(|p| (received_time - p.received_time).num_nanoseconds().unwrap_or(0) as f64 / 1e9)
            .unwrap_or(0.0);

        let latency_seconds = (received_time - stamped_time).num_nanoseconds().unwrap_or(0) as f64 / 1e9;

        self.entries.push(HeartbeatEntry {
            detector_name: detector_name.to_string(),
            received_time,
            stamped_time,
            latency_seconds,
            time_since_previous_seconds,
            status,
        });
        self.silence_acknowledged.insert(detector_name.to_string(), false);

        let horizon = received_time - self.config.retention;
        self.entries.retain(|e| e.received_time >= horizon);
    }

    /// Distinct detector names whose most recent heartbeat lies within the
    /// live window and whose status is ON.
    pub fn live_detectors(&self) -> Vec<String> {
        let mut latest: HashMap<&str, &HeartbeatEntry> = HashMap::new();
        for entry in &self.entries {
            latest
                .entry(entry.detector_name.as_str())
                .and_modify(|existing| if entry.received_time > existing.received_time { *existing = entry })
                .or_insert(entry);
        }
        let now_reference = self.entries.iter().map(|e| e.received_time).max().unwrap_or_else(Utc::now);
        latest
            .into_values()
            .filter(|e| e.status == DetectorStatus::On && now_reference - e.received_time <= self.config.live_window)
            .map(|e| e.detector_name.clone())
            .collect()
    }

    pub fn snapshot(&self) -> HeartbeatSnapshot {
        HeartbeatSnapshot { live_detectors: self.live_detectors() }
    }

    /// For every detector with at least 5 entries in the last 24h, emits
    /// one warning if the time since its last beat exceeds mean+3σ of its
    /// recent inter-arrival gaps. A detector is suppressed from repeat
    /// warnings until its next heartbeat arrives.
    pub fn scan_for_silence(&mut self, now: DateTime<Utc>) -> Vec<SilenceWarning> {
        let mut warnings = Vec::new();
        let mut detectors: Vec<&str> = self.entries.iter().map(|e| e.detector_name.as_str()).collect();
        detectors.sort_unstable();
        detectors.dedup();

        for detector_name in detectors {
            if self.silence_acknowledged.get(detector_name).copied().unwrap_or(false) {
                continue;
            }

            let recent: Vec<&HeartbeatEntry> = self
                .entries
                .iter()
                .filter(|e| e.detector_name == detector_name && now - e.received_time <= Duration::hours(SILENCE_LOOKBACK_HOURS))
                .collect();
            if recent.len() < MIN_ENTRIES_FOR_SILENCE_CHECK {
                continue;
            }

            let gaps: Vec<f64> = recent.iter().map(|e| e.time_since_previous_seconds).collect();
            let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
            let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
            let std_dev = variance.sqrt();
            let expected_interval_seconds = mean + SILENCE_SIGMA_MULTIPLE * std_dev;

            let last_beat = recent.iter().map(|e| e.received_time).max().unwrap();
            let time_since_last_beat_seconds = (now - last_beat).num_nanoseconds().unwrap_or(0) as f64 / 1e9;

            if time_since_last_beat_seconds > expected_interval_seconds {
                warnings.push(SilenceWarning {
                    detector_name: detector_name.to_string(),
                    time_since_last_beat_seconds,
                    expected_interval_seconds,
                });
                self.silence_acknowledged.insert(detector_name.to_string(), true);
            }
        }
        warnings
    }
}
