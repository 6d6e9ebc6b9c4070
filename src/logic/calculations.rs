/// Tolerance applied before rounding day counts up, so float noise such as
/// `42.000000000000007` does not become an extra rest day.
const DAY_EPSILON: f64 = 1e-9;

const CAP_EPSILON: f64 = 1e-9;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Round to two decimals without exceeding `cap`.
///
/// Falls back to truncation when rounding half-up would cross the cap by
/// more than float noise.
pub fn round2_within(value: f64, cap: f64) -> f64 {
    let rounded = round2(value);
    if rounded - cap <= CAP_EPSILON {
        rounded
    } else {
        (cap * 100.0).floor() / 100.0
    }
}

/// Ratio of tonnes grazed to tonnes available, zero when nothing is available.
pub fn grazing_pressure(graze_tonnes: f64, available_tonnes: f64) -> f64 {
    if available_tonnes > 0.0 {
        graze_tonnes / available_tonnes
    } else {
        0.0
    }
}

/// Whole rest days needed to regrow `graze_tonnes` at `regrowth_tonnes_per_day`,
/// scaled by `multiplier` and never below `min_days`.
///
/// Returns `None` when the regrowth rate is zero, negative or not finite;
/// callers fall back to `min_days` in that case.
pub fn recovery_days(
    graze_tonnes: f64,
    regrowth_tonnes_per_day: f64,
    multiplier: f64,
    min_days: u32,
) -> Option<u32> {
    if !(regrowth_tonnes_per_day.is_finite() && regrowth_tonnes_per_day > 0.0) {
        return None;
    }
    let raw = graze_tonnes / regrowth_tonnes_per_day * multiplier;
    let days = (raw - DAY_EPSILON).ceil().max(0.0) as u32;
    Some(days.max(min_days))
}
