//! POSIX interval timer table (§4.H).
//!
//! `timer_create`/`timer_settime`/`timer_gettime`/`timer_delete` operate on
//! opaque ids, not fds — there is no waitable object to hand back to the
//! user, so unlike [`crate::vtd`] this table only tracks *state*. Signal
//! delivery on expiration is an explicit non-goal: the requested
//! `sigevent` is accepted and stored but never acted on.
//!
//! Resolved against `examples/original_source/src/posix_timers.cpp`,
//! including the `timer_gettime` rearm-as-side-effect behavior (§9): an
//! expired periodic timer's stored expiration is advanced to its next
//! future firing as a side effect of *reading* it.

use std::collections::HashMap;
use std::sync::Mutex;

use vtime_core::{Duration, Instant};

/// Opaque handle returned by [`PosixTimers::create`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PosixTimerId(u64);

impl PosixTimerId {
    /// Encode as the raw bits a `timer_t` (an opaque pointer-sized handle)
    /// can carry across the FFI boundary.
    pub fn into_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct an id previously produced by [`PosixTimerId::into_raw`].
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// The two time fields POSIX functions exchange: remaining/initial value
/// and the rearm interval. Disarmed is represented by `value == Instant::DISARMED`-
/// equivalent: both fields zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TimerValue {
    pub value: Duration,
    pub interval: Duration,
}

struct Entry {
    expiration: Instant,
    interval: Duration,
    armed: bool,
}

/// In-memory registry of POSIX interval timers.
pub struct PosixTimers {
    entries: Mutex<Inner>,
}

struct Inner {
    next_id: u64,
    timers: HashMap<PosixTimerId, Entry>,
}

impl PosixTimers {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Inner {
                next_id: 1,
                timers: HashMap::new(),
            }),
        }
    }

    /// Allocate a fresh timer id, disarmed. The `sigevent`/clock id are the
    /// shim's concern (§4.F); this table only needs to exist so `settime`/
    /// `gettime`/`delete` have something to look up.
    pub fn create(&self) -> PosixTimerId {
        let mut inner = self.entries.lock().unwrap();
        let id = PosixTimerId(inner.next_id);
        inner.next_id += 1;
        inner.timers.insert(
            id,
            Entry {
                expiration: Instant::DISARMED,
                interval: Duration::ZERO,
                armed: false,
            },
        );
        id
    }

    pub fn delete(&self, id: PosixTimerId) -> bool {
        self.entries.lock().unwrap().timers.remove(&id).is_some()
    }

    /// Arm (or disarm, if `value.value.is_zero()`) a timer, returning the
    /// value it had before the call — the `old_value` output of
    /// `timer_settime`.
    pub fn set_time(&self, id: PosixTimerId, now: Instant, absolute: bool, value: TimerValue) -> Option<TimerValue> {
        let mut inner = self.entries.lock().unwrap();
        let entry = inner.timers.get_mut(&id)?;
        let old = current_value(entry, now);

        if value.value.is_zero() {
            entry.armed = false;
            return Some(old);
        }

        entry.expiration = if absolute {
            Instant::from_nanos(value.value.as_nanos())
        } else {
            now + value.value
        };
        entry.interval = value.interval;
        entry.armed = true;
        Some(old)
    }

    /// Current remaining time and interval. For an expired periodic timer,
    /// this also rearms the stored expiration to the next future firing —
    /// see the module doc comment.
    pub fn get_time(&self, id: PosixTimerId, now: Instant) -> Option<TimerValue> {
        let mut inner = self.entries.lock().unwrap();
        let entry = inner.timers.get_mut(&id)?;
        Some(current_value(entry, now))
    }
}

impl Default for PosixTimers {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared by `set_time`'s old-value snapshot and `get_time`: computes the
/// remaining time, rearming `entry.expiration` in place if it has expired
/// and is periodic.
fn current_value(entry: &mut Entry, now: Instant) -> TimerValue {
    if !entry.armed {
        return TimerValue::default();
    }
    let remaining = entry.expiration.saturating_duration_since(now);
    if (entry.expiration - now).as_nanos() > 0 {
        return TimerValue {
            value: remaining,
            interval: entry.interval,
        };
    }
    // Expired. One-shot: report zero remaining, leave disarmed-in-place
    // (caller decides whether to clear `armed`; original source leaves it
    // armed with value 0, matching a real one-shot that already fired).
    if entry.interval.is_zero() {
        return TimerValue {
            value: Duration::ZERO,
            interval: Duration::ZERO,
        };
    }
    // Periodic: advance expiration to the next future firing and report
    // the time until then.
    let elapsed = (now - entry.expiration).as_nanos();
    let periods_elapsed = elapsed / entry.interval.as_nanos();
    let next_expiration = entry.expiration + Duration::from_nanos((periods_elapsed + 1) * entry.interval.as_nanos());
    let time_until_next = next_expiration.saturating_duration_since(now);
    entry.expiration = next_expiration;
    TimerValue {
        value: time_until_next,
        interval: entry.interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_starts_disarmed() {
        let timers = PosixTimers::new();
        let id = timers.create();
        let v = timers.get_time(id, Instant::INITIAL).unwrap();
        assert_eq!(v, TimerValue::default());
    }

    #[test]
    fn absolute_one_shot_rearm_scenario() {
        // Scenario 7 from §8: timer_create, settime absolute at now+2s,
        // interval 0, advance(2s), gettime returns value 0 interval 0.
        let timers = PosixTimers::new();
        let id = timers.create();
        let now = Instant::INITIAL;
        let target = now + Duration::from_nanos(2_000_000_000);
        timers.set_time(id, now, true, TimerValue { value: Duration::from_nanos(target.as_nanos()), interval: Duration::ZERO });

        let v = timers.get_time(id, target).unwrap();
        assert_eq!(v.value, Duration::ZERO);
        assert_eq!(v.interval, Duration::ZERO);
    }

    #[test]
    fn relative_arm_reports_remaining() {
        let timers = PosixTimers::new();
        let id = timers.create();
        let now = Instant::INITIAL;
        timers.set_time(id, now, false, TimerValue { value: Duration::from_nanos(5_000_000_000), interval: Duration::ZERO });

        let v = timers.get_time(id, now + Duration::from_nanos(1_000_000_000)).unwrap();
        assert_eq!(v.value, Duration::from_nanos(4_000_000_000));
    }

    #[test]
    fn periodic_rearms_on_get() {
        let timers = PosixTimers::new();
        let id = timers.create();
        let now = Instant::INITIAL;
        let one_sec = Duration::from_nanos(1_000_000_000);
        timers.set_time(id, now, false, TimerValue { value: one_sec, interval: one_sec });

        // now + 3.5s: two periods elapsed since first expiration (now+1s),
        // next firing is now+4s, so remaining should be 0.5s.
        let later = now + Duration::from_nanos(3_500_000_000);
        let v = timers.get_time(id, later).unwrap();
        assert_eq!(v.value, Duration::from_nanos(500_000_000));
        assert_eq!(v.interval, one_sec);
    }

    #[test]
    fn disarm_with_zero_value() {
        let timers = PosixTimers::new();
        let id = timers.create();
        let now = Instant::INITIAL;
        timers.set_time(id, now, false, TimerValue { value: Duration::from_nanos(1_000_000_000), interval: Duration::ZERO });
        timers.set_time(id, now, false, TimerValue::default());
        let v = timers.get_time(id, now).unwrap();
        assert_eq!(v, TimerValue::default());
    }

    #[test]
    fn delete_removes_entry() {
        let timers = PosixTimers::new();
        let id = timers.create();
        assert!(timers.delete(id));
        assert!(timers.get_time(id, Instant::INITIAL).is_none());
        assert!(!timers.delete(id));
    }
}
