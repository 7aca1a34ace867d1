//! The virtual time simulator (§4.D): one process-wide singleton tying
//! together the current virtual instant, the client refcount, the VTD
//! registry, the socket-timeout registry and the POSIX timer table behind
//! a single `Mutex` + `Condvar`.
//!
//! Grounded on `fakeclock::ClockSimulator`: one mutex guarding `fake_time_`,
//! `clock_count_` and a `map<fd, TimerFd>`, one condvar woken on every
//! `advance`/`removeClock`, and a `waitUntil` that reacts to either the
//! target time arriving or interception switching off. The teacher's
//! `TimerRegistry` (`gvthread-runtime::timer::registry`) supplied the
//! `Arc`-free, `&'static`-singleton-via-`OnceLock` shape used here, since
//! this simulator has exactly one instance per process rather than one per
//! runtime.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Condvar, Mutex, OnceLock};

use tracing::{debug, trace};
use vtime_core::{Duration, Instant, SimError, SimResult};

use crate::client::ClientHandle;
use crate::posix_timers::PosixTimers;
use crate::socket_timeouts::SocketTimeouts;
use crate::vtd::Vtd;

struct State {
    now: Instant,
    client_count: u64,
    timers: HashMap<RawFd, Vtd>,
}

/// The process-wide virtual clock.
pub struct Simulator {
    state: Mutex<State>,
    cv: Condvar,
    socket_timeouts: SocketTimeouts,
    posix_timers: PosixTimers,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                now: Instant::INITIAL,
                client_count: 0,
                timers: HashMap::new(),
            }),
            cv: Condvar::new(),
            socket_timeouts: SocketTimeouts::new(),
            posix_timers: PosixTimers::new(),
        }
    }

    /// The single process-wide instance, created on first access.
    pub fn global() -> &'static Simulator {
        static INSTANCE: OnceLock<Simulator> = OnceLock::new();
        INSTANCE.get_or_init(Simulator::new)
    }

    /// Attach a new client, switching interception on if it was off.
    pub fn attach_client() -> ClientHandle {
        ClientHandle::attach(Simulator::global())
    }

    pub(crate) fn add_client(&self) {
        let mut state = self.state.lock().unwrap();
        state.client_count += 1;
        debug!(count = state.client_count, "client attached");
    }

    pub(crate) fn remove_client(&self) {
        let mut state = self.state.lock().unwrap();
        state.client_count = state.client_count.saturating_sub(1);
        debug!(count = state.client_count, "client detached");
        if state.client_count == 0 {
            self.cv.notify_all();
        }
    }

    /// `true` while at least one client holds a [`ClientHandle`].
    pub fn is_intercepting(&self) -> bool {
        self.state.lock().unwrap().client_count > 0
    }

    pub fn now(&self) -> Instant {
        self.state.lock().unwrap().now
    }

    /// Move virtual time forward by `delta`, firing any VTDs whose
    /// expiration falls at or before the new time, then wake every waiter.
    pub fn advance(&self, delta: Duration) -> SimResult<()> {
        let mut state = self.state.lock().unwrap();
        let new_now = state.now + delta;
        debug!(from = state.now.as_nanos(), to = new_now.as_nanos(), "advance");
        self.handle_expiring(&mut state, new_now)?;
        state.now = new_now;
        self.cv.notify_all();
        Ok(())
    }

    /// Jump virtual time to an absolute instant. Moving backwards is
    /// permitted (models `settimeofday` moving the clock back); callers
    /// must not assume `now()` is monotonic across `set_time` calls. When
    /// `t` is earlier than the current time, no timers fire on the way
    /// there.
    pub fn set_time(&self, t: Instant) -> SimResult<()> {
        let mut state = self.state.lock().unwrap();
        debug!(from = state.now.as_nanos(), to = t.as_nanos(), "set_time");
        // `handle_expiring` only fires a VTD whose expiration has been
        // reached by `t`; every currently-armed VTD has an expiration past
        // the *old* `now`, so a backward jump never satisfies that and
        // nothing fires, matching the "no timers fire going backwards"
        // requirement without needing a direction check here.
        self.handle_expiring(&mut state, t)?;
        state.now = t;
        self.cv.notify_all();
        Ok(())
    }

    /// Block the calling thread until either virtual time reaches `t` or
    /// interception is switched off (last client detached).
    pub fn wait_until(&self, t: Instant) {
        let state = self.state.lock().unwrap();
        let _guard = self
            .cv
            .wait_while(state, |s| s.client_count > 0 && s.now < t)
            .unwrap();
    }

    fn handle_expiring(&self, state: &mut State, t: Instant) -> SimResult<()> {
        state.timers.retain(|fd, vtd| {
            if vtd.user_closed() {
                trace!(fd, "evicting closed vtd");
                false
            } else {
                true
            }
        });
        for vtd in state.timers.values_mut() {
            vtd.advance_to(t)?;
        }
        Ok(())
    }

    /// Create a new virtual timer, returning the fd to hand back to the
    /// caller of `timerfd_create`.
    pub fn timerfd_create(&self) -> SimResult<RawFd> {
        let vtd = Vtd::open()?;
        let user_fd = vtd.user_fd();
        let mut state = self.state.lock().unwrap();
        state.timers.insert(user_fd, vtd);
        trace!(fd = user_fd, "vtd created");
        Ok(user_fd)
    }

    /// Arm/disarm a virtual timer, returning the value it had before the
    /// call (remaining time, interval) for `timerfd_settime`'s `old_value`.
    pub fn timerfd_set_time(
        &self,
        fd: RawFd,
        expiration: Instant,
        interval: Duration,
    ) -> SimResult<(Duration, Duration)> {
        let mut state = self.state.lock().unwrap();
        let now = state.now;
        let vtd = state.timers.get_mut(&fd).ok_or(SimError::UnknownHandle)?;
        let old = (vtd.expiration().saturating_duration_since(now), vtd.interval());
        vtd.set_time(expiration, interval);
        Ok(old)
    }

    /// Remaining time and interval for `timerfd_gettime`.
    pub fn timerfd_get_time(&self, fd: RawFd) -> SimResult<(Duration, Duration)> {
        let state = self.state.lock().unwrap();
        let vtd = state.timers.get(&fd).ok_or(SimError::UnknownHandle)?;
        Ok((vtd.expiration().saturating_duration_since(state.now), vtd.interval()))
    }

    /// Drop bookkeeping for a virtual timer fd the caller has closed.
    pub fn timerfd_forget(&self, fd: RawFd) {
        self.state.lock().unwrap().timers.remove(&fd);
    }

    pub fn socket_timeouts(&self) -> &SocketTimeouts {
        &self.socket_timeouts
    }

    pub fn posix_timers(&self) -> &PosixTimers {
        &self.posix_timers
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_without_clients_still_moves_time() {
        let sim = Simulator::new();
        let t0 = sim.now();
        sim.advance(Duration::from_nanos(3_000_000_000)).unwrap();
        assert_eq!(sim.now(), t0 + Duration::from_nanos(3_000_000_000));
    }

    #[test]
    fn set_time_allows_going_backwards() {
        let sim = Simulator::new();
        sim.advance(Duration::from_nanos(5_000_000_000)).unwrap();
        sim.set_time(Instant::INITIAL).unwrap();
        assert_eq!(sim.now(), Instant::INITIAL);
    }

    #[test]
    fn set_time_backwards_does_not_fire_future_timer() {
        let sim = Simulator::new();
        let fd = sim.timerfd_create().unwrap();
        let now = sim.now();
        sim.timerfd_set_time(fd, now + Duration::from_nanos(5_000_000_000), Duration::ZERO)
            .unwrap();
        sim.advance(Duration::from_nanos(2_000_000_000)).unwrap();
        sim.set_time(now).unwrap();

        let mut buf = [0u8; 8];
        let n = unsafe {
            libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK);
            libc::read(fd, buf.as_mut_ptr() as *mut _, 8)
        };
        assert_eq!(n, -1);
        unsafe { libc::close(fd) };
    }

    #[test]
    fn timerfd_fires_on_advance() {
        let sim = Simulator::new();
        let fd = sim.timerfd_create().unwrap();
        let now = sim.now();
        sim.timerfd_set_time(fd, now + Duration::from_nanos(3_000_000_000), Duration::ZERO)
            .unwrap();
        sim.advance(Duration::from_nanos(3_000_000_000)).unwrap();

        let mut buf = [0u8; 8];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, 8) };
        assert_eq!(n, 8);
        assert_eq!(u64::from_ne_bytes(buf), 1);
        unsafe { libc::close(fd) };
    }

    #[test]
    fn wait_until_released_by_client_drop() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration as WallDuration;

        let sim: &'static Simulator = Box::leak(Box::new(Simulator::new()));
        let handle = crate::client::ClientHandle::attach(sim);

        // Never reached by advancing; only released by the handle dropping.
        let target = sim.now() + Duration::from_nanos(3_600_000_000_000);
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let waiter_released = released.clone();
        let waiter = thread::spawn(move || {
            sim.wait_until(target);
            waiter_released.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        thread::sleep(WallDuration::from_millis(50));
        assert!(!released.load(std::sync::atomic::Ordering::SeqCst));

        drop(handle);
        waiter.join().unwrap();
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn unknown_timer_fd_is_rejected() {
        let sim = Simulator::new();
        let err = sim.timerfd_get_time(12345).unwrap_err();
        assert_eq!(err, SimError::UnknownHandle);
    }
}
