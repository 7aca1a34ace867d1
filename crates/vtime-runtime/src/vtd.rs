//! Virtual Timer Descriptor (§4.B).
//!
//! A VTD pairs two fds referencing one kernel `eventfd` counter object: a
//! *user fd* handed out to the intercepted program (readable/pollable like
//! any real timer fd) and an *internal fd*, an immediate `dup` of the user
//! fd, kept only so [`vtime_core::same_kernel_object`] can later tell
//! whether the user has closed theirs.
//!
//! Grounded on `ksvc-module`'s `EventFdNotifier`: a real eventfd wrapped in
//! a thin `RawFd` owner that writes to wake a reader. Generalized here from
//! "wake once" to "accumulate a count and optionally rearm on an interval",
//! matching `fakeclock::TimerFd`.

use std::os::unix::io::RawFd;

use vtime_core::{same_kernel_object, Duration, Instant, SimError, SimResult};

/// One virtual timer: the fd pair plus its arm state.
pub struct Vtd {
    user_fd: RawFd,
    internal_fd: RawFd,
    next_expiration: Instant,
    interval: Duration,
}

impl Vtd {
    /// Allocate a fresh eventfd pair. The user fd starts disarmed.
    pub fn open() -> SimResult<Self> {
        let user_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if user_fd < 0 {
            return Err(SimError::Os(last_errno()));
        }
        let internal_fd = unsafe { libc::dup(user_fd) };
        if internal_fd < 0 {
            let errno = last_errno();
            unsafe { libc::close(user_fd) };
            return Err(SimError::Os(errno));
        }
        Ok(Self {
            user_fd,
            internal_fd,
            next_expiration: Instant::DISARMED,
            interval: Duration::ZERO,
        })
    }

    /// The fd handed out to the intercepted program. Never read by this
    /// struct itself; only written to, to make it readable from the far
    /// side.
    #[inline]
    pub fn user_fd(&self) -> RawFd {
        self.user_fd
    }

    #[inline]
    pub fn expiration(&self) -> Instant {
        self.next_expiration
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        !self.next_expiration.is_disarmed()
    }

    /// Overwrite the arm state. Does not itself fire the timer — a
    /// subsequent `advance_to` (or the caller's own `handle_expiring`
    /// pass) does that.
    pub fn set_time(&mut self, expiration: Instant, interval: Duration) {
        self.next_expiration = expiration;
        self.interval = interval;
    }

    /// If armed and `t` has reached the expiration, fire the eventfd with
    /// the number of elapsed periods and advance (or clear) the
    /// expiration accordingly.
    pub fn advance_to(&mut self, t: Instant) -> SimResult<()> {
        if !self.is_armed() || t < self.next_expiration {
            return Ok(());
        }
        let periods: i64 = if self.interval.is_zero() {
            1
        } else {
            1 + (t - self.next_expiration).as_nanos() / self.interval.as_nanos()
        };
        self.write_count(periods as u64)?;
        if self.interval.is_zero() {
            self.next_expiration = Instant::DISARMED;
        } else {
            self.next_expiration = self.next_expiration + Duration::from_nanos(periods * self.interval.as_nanos());
        }
        Ok(())
    }

    fn write_count(&self, count: u64) -> SimResult<()> {
        let ret = unsafe {
            libc::write(
                self.user_fd,
                &count as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            return Err(SimError::Os(last_errno()));
        }
        Ok(())
    }

    /// `true` iff the intercepted program has closed its side of the fd
    /// pair, per the descriptor-equivalence probe.
    pub fn user_closed(&self) -> bool {
        !same_kernel_object(self.user_fd, self.internal_fd)
    }
}

impl Drop for Vtd {
    fn drop(&mut self) {
        // `internal_fd` is ours to close; `user_fd` belongs to whichever
        // program called timerfd_create and is its responsibility to close.
        unsafe { libc::close(self.internal_fd) };
    }
}

fn last_errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once() {
        let mut vtd = Vtd::open().unwrap();
        let t0 = Instant::INITIAL;
        vtd.set_time(t0 + Duration::from_nanos(3_000_000_000), Duration::ZERO);
        vtd.advance_to(t0 + Duration::from_nanos(3_000_000_000)).unwrap();
        assert!(vtd.expiration().is_disarmed());

        let mut buf = [0u8; 8];
        let n = unsafe { libc::read(vtd.user_fd(), buf.as_mut_ptr() as *mut _, 8) };
        assert_eq!(n, 8);
        assert_eq!(u64::from_ne_bytes(buf), 1);
        unsafe { libc::close(vtd.user_fd()) };
    }

    #[test]
    fn periodic_accumulates() {
        let mut vtd = Vtd::open().unwrap();
        let t0 = Instant::INITIAL;
        let one_sec = Duration::from_nanos(1_000_000_000);
        vtd.set_time(t0 + one_sec, one_sec);
        vtd.advance_to(t0 + Duration::from_nanos(3_000_000_000)).unwrap();
        assert!(vtd.is_armed());
        assert_eq!(vtd.expiration(), t0 + Duration::from_nanos(4_000_000_000));

        let mut buf = [0u8; 8];
        let n = unsafe { libc::read(vtd.user_fd(), buf.as_mut_ptr() as *mut _, 8) };
        assert_eq!(n, 8);
        assert!(u64::from_ne_bytes(buf) >= 3);
        unsafe { libc::close(vtd.user_fd()) };
    }

    #[test]
    fn disarmed_timer_never_fires() {
        let mut vtd = Vtd::open().unwrap();
        vtd.advance_to(Instant::INITIAL + Duration::from_nanos(1_000_000_000)).unwrap();
        assert!(vtd.expiration().is_disarmed());
    }

    #[test]
    fn detects_user_close() {
        let vtd = Vtd::open().unwrap();
        assert!(!vtd.user_closed());
        unsafe { libc::close(vtd.user_fd()) };
        assert!(vtd.user_closed());
    }
}
