//! Pure function turning a sub-group size and a live-detector count into a
//! mean false-alarm recurrence interval, in years.
//!
//! Assumes every live detector imitates a genuine signal independently at
//! `single_detector_imitation_rate` (default once per week). Holds no
//! state; every input the formula needs is passed explicitly.

const SECONDS_PER_YEAR: f64 = 31_556_926.0;
const SECONDS_PER_WEEK: f64 = 604_800.0;

/// Tunable parameters for the recurrence formula. `window_seconds` and
/// `single_detector_imitation_rate` default to the values the network has
/// always used: a 10s coincidence window and a once-per-week per-detector
/// false trigger rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FalseAlarmParams {
    pub window_seconds: f64,
    pub single_detector_imitation_rate: f64,
}

impl Default for FalseAlarmParams {
    fn default() -> Self {
        Self { window_seconds: 10.0, single_detector_imitation_rate: 1.0 / SECONDS_PER_WEEK }
    }
}

/// `n choose r`, computed without overflowing by building the product
/// incrementally rather than taking a ratio of two factorials. Returns 0
/// for `r > n` (an undefined combination — the cache should never ask for
/// more coincident detectors than are currently live, but the monitor may
/// briefly disagree with the cache's stale count).
fn binomial(n: u64, r: u64) -> f64 {
    if r > n {
        return 0.0;
    }
    let r = r.min(n - r);
    let mut result = 1.0_f64;
    for i in 0..r {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

/// Mean recurrence interval, in years, for `sub_group_size` detectors
/// coinciding within `params.window_seconds` out of `live_detector_count`
/// currently-live detectors.
///
/// `live_detector_count < sub_group_size` is undefined (a coincidence of
/// more detectors than are currently live cannot happen by the model) and
/// returns 0 so the caller can render a placeholder rather than divide by
/// zero.
///
/// The `+1` term matches the historical combinatorial formula this engine
/// has always used: `(C(n,r) + 1) * f^r * W^(r-1)` combined imitation
/// frequency per second, inverted and converted to years.
pub fn false_alarm_recurrence_years(
    live_detector_count: usize,
    sub_group_size: usize,
    params: FalseAlarmParams,
) -> f64 {
    if live_detector_count < sub_group_size || sub_group_size == 0 {
        return 0.0;
    }

    let n = live_detector_count as u64;
    let r = sub_group_size as u64;
    let combinations = binomial(n, r);

    let combined_imitation_rate_per_second = (combinations + 1.0)
        * params.single_detector_imitation_rate.powi(r as i32)
        * params.window_seconds.powi(r as i32 - 1);

    let combined_imitation_rate_per_year = combined_imitation_rate_per_second * SECONDS_PER_YEAR;
    if combined_imitation_rate_per_year <= 0.0 {
        return 0.0;
    }
    1.0 / combined_imitation_rate_per_year
}
