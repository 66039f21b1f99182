//! Shared numeric helpers for the detection and scoring stages.

use chrono::{DateTime, Timelike, Utc};

/// Arithmetic mean. Returns `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation. Returns `None` for an empty slice.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Coefficient of variation (stddev / mean).
///
/// Returns `None` when the series is empty or its mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m == 0.0 {
        return None;
    }
    let sd = std_dev(values)?;
    Some(sd / m)
}

/// Span between the earliest and latest timestamp, in hours.
///
/// Returns `None` when fewer than two timestamps are present.
pub fn span_hours(timestamps: &[DateTime<Utc>]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }
    let min = timestamps.iter().min()?;
    let max = timestamps.iter().max()?;
    Some((*max - *min).num_seconds() as f64 / 3600.0)
}

/// Gaps between consecutive timestamps of a sorted series, in seconds.
pub fn inter_txn_gaps_secs(sorted: &[DateTime<Utc>]) -> Vec<f64> {
    sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64)
        .collect()
}

/// Maximum number of timestamps falling in any right-open sliding window
/// of `window_hours`. Input must be sorted ascending; ties all land in
/// the same window. Returns 0 for an empty series.
pub fn max_count_in_window(sorted: &[DateTime<Utc>], window_hours: f64) -> usize {
    if sorted.is_empty() {
        return 0;
    }
    let window_secs = (window_hours * 3600.0) as i64;
    let mut best = 0usize;
    let mut hi = 0usize;
    for lo in 0..sorted.len() {
        if hi < lo {
            hi = lo;
        }
        while hi < sorted.len() && (sorted[hi] - sorted[lo]).num_seconds() < window_secs {
            hi += 1;
        }
        best = best.max(hi - lo);
    }
    best
}

/// Hour-of-day of `ts` under the operator-declared UTC offset.
///
/// All time-of-day signals use this single fixed zone; the host's local
/// zone is never consulted.
pub fn local_hour(ts: DateTime<Utc>, utc_offset_hours: i32) -> u32 {
    (ts.hour() as i32 + utc_offset_hours).rem_euclid(24) as u32
}

/// Fraction of timestamps whose local hour satisfies `pred`.
///
/// Returns 0.0 for an empty series.
pub fn hour_fraction<F>(timestamps: &[DateTime<Utc>], utc_offset_hours: i32, pred: F) -> f64
where
    F: Fn(u32) -> bool,
{
    if timestamps.is_empty() {
        return 0.0;
    }
    let matching = timestamps
        .iter()
        .filter(|ts| pred(local_hour(**ts, utc_offset_hours)))
        .count();
    matching as f64 / timestamps.len() as f64
}

/// Clamp a score into [0, 100].
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Round to one decimal place, the precision of every emitted score.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// True when more than half of `deltas` (seconds) fall within
/// `tolerance` (fractional) of any one of `periods` (seconds).
///
/// One matching period suffices; periods are tested independently.
pub fn has_regular_interval(deltas: &[f64], periods: &[f64], tolerance: f64) -> bool {
    if deltas.is_empty() {
        return false;
    }
    for period in periods {
        let lo = period * (1.0 - tolerance);
        let hi = period * (1.0 + tolerance);
        let within = deltas.iter().filter(|d| **d >= lo && **d <= hi).count();
        if within as f64 / deltas.len() as f64 > 0.5 {
            return true;
        }
    }
    false
}

/// True when the amount carries non-zero cents (is not a whole unit).
pub fn has_nonzero_cents(amount: f64) -> bool {
    let cents = (amount * 100.0).round() as i64;
    cents % 100 != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 6, hour, min, 0).unwrap()
    }

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&[2.0, 4.0, 6.0]), Some(4.0));
        assert_eq!(mean(&[]), None);
        let sd = std_dev(&[2.0, 4.0, 6.0]).unwrap();
        assert!((sd - 1.632993).abs() < 1e-5);
    }

    #[test]
    fn test_cv_guards() {
        assert_eq!(coefficient_of_variation(&[]), None);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), None);
        let cv = coefficient_of_variation(&[100.0, 100.0, 100.0]).unwrap();
        assert_eq!(cv, 0.0);
    }

    #[test]
    fn test_span_hours() {
        assert_eq!(span_hours(&[ts(10, 0)]), None);
        let span = span_hours(&[ts(10, 0), ts(12, 30)]).unwrap();
        assert!((span - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_sliding_window_counts() {
        let stamps = vec![ts(0, 0), ts(1, 0), ts(2, 0), ts(10, 0)];
        assert_eq!(max_count_in_window(&stamps, 3.0), 3);
        assert_eq!(max_count_in_window(&stamps, 0.5), 1);
        assert_eq!(max_count_in_window(&[], 72.0), 0);
    }

    #[test]
    fn test_window_is_right_open() {
        // Two stamps exactly window-width apart must not share a window.
        let stamps = vec![ts(0, 0), ts(2, 0)];
        assert_eq!(max_count_in_window(&stamps, 2.0), 1);
    }

    #[test]
    fn test_local_hour_offset() {
        let stamp = ts(23, 0);
        assert_eq!(local_hour(stamp, 0), 23);
        assert_eq!(local_hour(stamp, 2), 1);
        assert_eq!(local_hour(stamp, -5), 18);
    }

    #[test]
    fn test_regular_interval_detection() {
        let day = 86_400.0;
        let deltas = vec![day, day * 1.05, day * 0.95, day * 3.0];
        assert!(has_regular_interval(&deltas, &[day], 0.2));
        assert!(!has_regular_interval(&deltas, &[day * 7.0], 0.2));
        assert!(!has_regular_interval(&[], &[day], 0.2));
    }

    #[test]
    fn test_nonzero_cents() {
        assert!(has_nonzero_cents(2412.33));
        assert!(!has_nonzero_cents(9500.0));
        assert!(!has_nonzero_cents(0.0));
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(89.2499), 89.2);
        assert_eq!(round1(89.25), 89.3);
        assert_eq!(round1(100.0), 100.0);
    }
}
