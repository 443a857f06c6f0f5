//! Wall-clock to block-boundary alignment
//!
//! Pure functions parameterized by the configured day-start hour and block
//! length. These are part of the observable contract: tests pin exact
//! millisecond values.

use chrono::{DateTime, Duration, Timelike, Utc};

const QUARTER_HOUR_MS: i64 = 15 * 60 * 1000;

/// The largest instant ≤ `t` whose UTC hour equals `day_start_hour` with
/// minute/second/ms all zero.
#[must_use]
pub fn block_start(t: DateTime<Utc>, day_start_hour: u32) -> DateTime<Utc> {
    let candidate = t
        .with_hour(day_start_hour)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t);
    if candidate <= t {
        candidate
    } else {
        candidate - Duration::days(1)
    }
}

/// End of the block starting at `s`.
#[must_use]
pub fn block_end(s: DateTime<Utc>, block_hours: i64) -> DateTime<Utc> {
    s + Duration::hours(block_hours)
}

/// Start of the block following the one starting at `s`.
#[must_use]
pub fn next_block_start(s: DateTime<Utc>, block_hours: i64) -> DateTime<Utc> {
    block_end(s, block_hours)
}

/// Round to the nearest quarter hour (ties round up).
#[must_use]
pub fn snap_to_15_min(t: DateTime<Utc>) -> DateTime<Utc> {
    let ms = t.timestamp_millis();
    let snapped = ((ms + QUARTER_HOUR_MS / 2).div_euclid(QUARTER_HOUR_MS)) * QUARTER_HOUR_MS;
    DateTime::from_timestamp_millis(snapped).unwrap_or(t)
}

/// Round up to the next quarter hour (identity on exact boundaries).
#[must_use]
pub fn snap_forward_to_15_min(t: DateTime<Utc>) -> DateTime<Utc> {
    let ms = t.timestamp_millis();
    let snapped = ms.div_euclid(QUARTER_HOUR_MS) * QUARTER_HOUR_MS;
    if snapped == ms {
        t
    } else {
        DateTime::from_timestamp_millis(snapped + QUARTER_HOUR_MS).unwrap_or(t)
    }
}

/// Upstream 100-ns ticks → milliseconds, rounding to nearest.
#[must_use]
pub const fn ticks_to_ms(ticks: i64) -> i64 {
    (ticks + 5_000) / 10_000
}

/// Milliseconds → Upstream 100-ns ticks.
#[must_use]
pub const fn ms_to_ticks(ms: i64) -> i64 {
    ms * 10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn block_start_same_day_after_hour() {
        assert_eq!(
            block_start(at("2026-02-11T09:30:00Z"), 4),
            at("2026-02-11T04:00:00Z")
        );
    }

    #[test]
    fn block_start_previous_day_before_hour() {
        assert_eq!(
            block_start(at("2026-02-11T02:59:59Z"), 4),
            at("2026-02-10T04:00:00Z")
        );
    }

    #[test]
    fn block_start_exact_boundary_is_identity() {
        assert_eq!(
            block_start(at("2026-02-11T04:00:00Z"), 4),
            at("2026-02-11T04:00:00Z")
        );
    }

    #[test]
    fn block_start_strips_subhour_components() {
        assert_eq!(
            block_start(at("2026-02-11T04:00:00.001Z"), 4),
            at("2026-02-11T04:00:00Z")
        );
    }

    #[test]
    fn block_start_midnight_day_start() {
        assert_eq!(
            block_start(at("2026-02-11T23:59:59Z"), 0),
            at("2026-02-11T00:00:00Z")
        );
    }

    #[test]
    fn block_end_and_next() {
        let s = at("2026-02-11T04:00:00Z");
        assert_eq!(block_end(s, 24), at("2026-02-12T04:00:00Z"));
        assert_eq!(next_block_start(s, 24), at("2026-02-12T04:00:00Z"));
        assert_eq!(block_end(s, 6), at("2026-02-11T10:00:00Z"));
    }

    #[test]
    fn snap_rounds_to_nearest_quarter() {
        assert_eq!(snap_to_15_min(at("2026-02-11T09:07:29Z")), at("2026-02-11T09:00:00Z"));
        assert_eq!(snap_to_15_min(at("2026-02-11T09:07:30Z")), at("2026-02-11T09:15:00Z"));
        assert_eq!(snap_to_15_min(at("2026-02-11T09:52:31Z")), at("2026-02-11T10:00:00Z"));
        assert_eq!(snap_to_15_min(at("2026-02-11T09:15:00Z")), at("2026-02-11T09:15:00Z"));
    }

    #[test]
    fn snap_results_land_on_quarter_marks() {
        let snapped = snap_to_15_min(at("2026-02-11T09:08:13.777Z"));
        assert_eq!(snapped.timestamp_millis() % QUARTER_HOUR_MS, 0);
        assert!(matches!(
            chrono::Timelike::minute(&snapped),
            0 | 15 | 30 | 45
        ));
    }

    #[test]
    fn snap_forward_never_goes_backward() {
        assert_eq!(
            snap_forward_to_15_min(at("2026-02-11T09:00:01Z")),
            at("2026-02-11T09:15:00Z")
        );
        assert_eq!(
            snap_forward_to_15_min(at("2026-02-11T09:15:00Z")),
            at("2026-02-11T09:15:00Z")
        );
        let t = at("2026-02-11T09:44:59.999Z");
        assert!(snap_forward_to_15_min(t) >= t);
    }

    #[test]
    fn tick_conversion_pins_exact_values() {
        assert_eq!(ticks_to_ms(72_000_000_000), 7_200_000);
        assert_eq!(ticks_to_ms(10_000), 1);
        assert_eq!(ticks_to_ms(14_999), 1);
        assert_eq!(ticks_to_ms(15_000), 2);
        assert_eq!(ticks_to_ms(0), 0);
        assert_eq!(ms_to_ticks(7_200_000), 72_000_000_000);
    }

    #[test]
    fn tick_round_trip_for_whole_ms() {
        for ms in [0_i64, 1, 999, 45 * 60_000, 7_200_000] {
            assert_eq!(ticks_to_ms(ms_to_ticks(ms)), ms);
        }
    }
}
