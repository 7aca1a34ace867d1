//! Conversions between [`Duration`] and the two POSIX subsecond layouts.
//!
//! Grounded on `fakeclock::to_timeval`/`to_timespec`/`to_duration`: truncating
//! division only, no rounding, no clamping beyond what `Duration` already
//! enforces (non-negative).

use crate::instant::Duration;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MICRO: i64 = 1_000;

/// Seconds + microseconds, the layout used by `timeval` (`gettimeofday`,
/// socket timeouts).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MicroStruct {
    pub secs: i64,
    pub micros: i64,
}

/// Seconds + nanoseconds, the layout used by `timespec` (`clock_gettime`,
/// `timerfd`/`timer_*`, `nanosleep`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NanoStruct {
    pub secs: i64,
    pub nanos: i64,
}

/// Split a duration into seconds + microseconds, truncating toward zero.
#[inline]
pub fn to_microstruct(d: Duration) -> MicroStruct {
    let total = d.as_nanos();
    MicroStruct {
        secs: total / NANOS_PER_SEC,
        micros: (total % NANOS_PER_SEC) / NANOS_PER_MICRO,
    }
}

/// Split a duration into seconds + nanoseconds, truncating toward zero.
#[inline]
pub fn to_nanostruct(d: Duration) -> NanoStruct {
    let total = d.as_nanos();
    NanoStruct {
        secs: total / NANOS_PER_SEC,
        nanos: total % NANOS_PER_SEC,
    }
}

/// Inverse of [`to_microstruct`].
#[inline]
pub fn from_microstruct(s: MicroStruct) -> Duration {
    Duration::from_nanos(s.secs * NANOS_PER_SEC + s.micros * NANOS_PER_MICRO)
}

/// Inverse of [`to_nanostruct`].
#[inline]
pub fn from_nanostruct(s: NanoStruct) -> Duration {
    Duration::from_nanos(s.secs * NANOS_PER_SEC + s.nanos)
}

/// `true` iff a `timespec`-style nanosecond field is in the valid `[0, 1e9)`
/// range per `clock_settime`/`timerfd_settime`/`timer_settime`'s EINVAL check.
#[inline]
pub const fn nanos_in_range(nanos: i64) -> bool {
    nanos >= 0 && nanos < NANOS_PER_SEC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microstruct_round_trip() {
        for nanos in [0i64, 1, 999, 1_000, 999_999_999, 1_000_000_000, 3_600_500_000_123] {
            let d = Duration::from_nanos(nanos);
            let back = from_microstruct(to_microstruct(d));
            // microsecond truncation loses sub-microsecond precision
            let expected = Duration::from_nanos((nanos / 1_000) * 1_000);
            assert_eq!(back, expected);
        }
    }

    #[test]
    fn nanostruct_round_trip() {
        for nanos in [0i64, 1, 999_999_999, 1_000_000_000, 3_600_500_000_123] {
            let d = Duration::from_nanos(nanos);
            assert_eq!(from_nanostruct(to_nanostruct(d)), d);
        }
    }

    #[test]
    fn nanostruct_splits_seconds_and_subsecond() {
        let d = Duration::from_nanos(3_200_000_001);
        let s = to_nanostruct(d);
        assert_eq!(s.secs, 3);
        assert_eq!(s.nanos, 200_000_001);
    }

    #[test]
    fn range_check() {
        assert!(nanos_in_range(0));
        assert!(nanos_in_range(999_999_999));
        assert!(!nanos_in_range(1_000_000_000));
        assert!(!nanos_in_range(-1));
    }
}
