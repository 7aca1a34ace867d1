//! libc-ABI-compatible override functions (§4.F).
//!
//! Each function here has the exact signature of its real libc
//! counterpart and is exported with `#[no_mangle]`, so a `cdylib` built
//! from this crate and LD_PRELOADed ahead of libc shadows the real
//! symbol for any process that loads it. Every override resolves the
//! real symbol via `dlsym(RTLD_NEXT, ..)` exactly once, caching the
//! pointer in a function-local `OnceLock`, and falls through to it
//! whenever no client is attached ([`Simulator::is_intercepting`] is
//! false).
//!
//! Resolved against `examples/original_source/src/overrides.cpp` and
//! `posix_timers.cpp` for exact errno and flag handling.

use std::os::raw::{c_int, c_long, c_uint, c_void};
use std::os::unix::io::RawFd;
use std::sync::OnceLock;

use vtime_core::{nanos_in_range, Duration, Instant};
use vtime_runtime::{PosixTimerId, Simulator, TimerValue};

macro_rules! real_fn {
    ($cache:ident, $name:expr, $ty:ty) => {{
        static $cache: OnceLock<usize> = OnceLock::new();
        let ptr = *$cache.get_or_init(|| unsafe {
            libc::dlsym(
                libc::RTLD_NEXT,
                concat!($name, "\0").as_ptr() as *const libc::c_char,
            ) as usize
        });
        unsafe { std::mem::transmute::<usize, $ty>(ptr) }
    }};
}

fn sim() -> &'static Simulator {
    Simulator::global()
}

fn set_errno(e: c_int) {
    unsafe { *libc::__errno_location() = e };
}

fn duration_from_timespec(ts: libc::timespec) -> Duration {
    Duration::from_nanos(ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64)
}

fn timespec_from_duration(d: Duration) -> libc::timespec {
    let nanos = d.as_nanos();
    libc::timespec {
        tv_sec: (nanos / 1_000_000_000) as libc::time_t,
        tv_nsec: (nanos % 1_000_000_000) as c_long,
    }
}

fn instant_to_timespec(i: Instant) -> libc::timespec {
    let nanos = i.as_nanos();
    libc::timespec {
        tv_sec: (nanos / 1_000_000_000) as libc::time_t,
        tv_nsec: (nanos % 1_000_000_000) as c_long,
    }
}

fn real_poll() -> unsafe extern "C" fn(*mut libc::pollfd, libc::nfds_t, c_int) -> c_int {
    real_fn!(
        REAL_POLL,
        "poll",
        unsafe extern "C" fn(*mut libc::pollfd, libc::nfds_t, c_int) -> c_int
    )
}

// ---------------------------------------------------------------------
// Sleeping
// ---------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn sleep(seconds: c_uint) -> c_uint {
    if !sim().is_intercepting() {
        let real = real_fn!(REAL_SLEEP, "sleep", unsafe extern "C" fn(c_uint) -> c_uint);
        return real(seconds);
    }
    let target = sim().now() + Duration::from_nanos(seconds as i64 * 1_000_000_000);
    sim().wait_until(target);
    0
}

#[no_mangle]
pub unsafe extern "C" fn usleep(usec: libc::useconds_t) -> c_int {
    if !sim().is_intercepting() {
        let real = real_fn!(REAL_USLEEP, "usleep", unsafe extern "C" fn(libc::useconds_t) -> c_int);
        return real(usec);
    }
    let target = sim().now() + Duration::from_nanos(usec as i64 * 1_000);
    sim().wait_until(target);
    0
}

#[no_mangle]
pub unsafe extern "C" fn nanosleep(req: *const libc::timespec, rem: *mut libc::timespec) -> c_int {
    if req.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_NANOSLEEP,
            "nanosleep",
            unsafe extern "C" fn(*const libc::timespec, *mut libc::timespec) -> c_int
        );
        return real(req, rem);
    }
    let target = sim().now() + duration_from_timespec(*req);
    sim().wait_until(target);
    if !rem.is_null() {
        (*rem).tv_sec = 0;
        (*rem).tv_nsec = 0;
    }
    0
}

// ---------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn gettimeofday(tv: *mut libc::timeval, tz: *mut c_void) -> c_int {
    if !sim().is_intercepting() || tv.is_null() {
        let real = real_fn!(
            REAL_GETTIMEOFDAY,
            "gettimeofday",
            unsafe extern "C" fn(*mut libc::timeval, *mut c_void) -> c_int
        );
        return real(tv, tz);
    }
    let nanos = sim().now().as_nanos();
    (*tv).tv_sec = (nanos / 1_000_000_000) as libc::time_t;
    (*tv).tv_usec = ((nanos % 1_000_000_000) / 1_000) as libc::suseconds_t;
    0
}

#[no_mangle]
pub unsafe extern "C" fn clock_gettime(clk_id: libc::clockid_t, tp: *mut libc::timespec) -> c_int {
    if !sim().is_intercepting() || tp.is_null() {
        let real = real_fn!(
            REAL_CLOCK_GETTIME,
            "clock_gettime",
            unsafe extern "C" fn(libc::clockid_t, *mut libc::timespec) -> c_int
        );
        return real(clk_id, tp);
    }
    *tp = instant_to_timespec(sim().now());
    0
}

#[no_mangle]
pub unsafe extern "C" fn time(tloc: *mut libc::time_t) -> libc::time_t {
    if !sim().is_intercepting() {
        let real = real_fn!(REAL_TIME, "time", unsafe extern "C" fn(*mut libc::time_t) -> libc::time_t);
        return real(tloc);
    }
    let secs = (sim().now().as_nanos() / 1_000_000_000) as libc::time_t;
    if !tloc.is_null() {
        *tloc = secs;
    }
    secs
}

#[no_mangle]
pub unsafe extern "C" fn settimeofday(tv: *const libc::timeval, tz: *const c_void) -> c_int {
    if !sim().is_intercepting() || tv.is_null() {
        let real = real_fn!(
            REAL_SETTIMEOFDAY,
            "settimeofday",
            unsafe extern "C" fn(*const libc::timeval, *const c_void) -> c_int
        );
        return real(tv, tz);
    }
    if (*tv).tv_usec < 0 || (*tv).tv_usec >= 1_000_000 {
        set_errno(libc::EINVAL);
        return -1;
    }
    let nanos = (*tv).tv_sec as i64 * 1_000_000_000 + (*tv).tv_usec as i64 * 1_000;
    match sim().set_time(Instant::from_nanos(nanos)) {
        Ok(()) => 0,
        Err(_) => {
            set_errno(libc::EINVAL);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn clock_settime(clk_id: libc::clockid_t, tp: *const libc::timespec) -> c_int {
    if !sim().is_intercepting() || tp.is_null() {
        let real = real_fn!(
            REAL_CLOCK_SETTIME,
            "clock_settime",
            unsafe extern "C" fn(libc::clockid_t, *const libc::timespec) -> c_int
        );
        return real(clk_id, tp);
    }
    // Only the real-time clock is backed by the simulator's settable clock.
    if clk_id != libc::CLOCK_REALTIME || (*tp).tv_nsec < 0 || (*tp).tv_nsec >= 1_000_000_000 {
        set_errno(libc::EINVAL);
        return -1;
    }
    match sim().set_time(Instant::from_nanos((*tp).tv_sec as i64 * 1_000_000_000 + (*tp).tv_nsec as i64)) {
        Ok(()) => 0,
        Err(_) => {
            set_errno(libc::EINVAL);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn clock_nanosleep(
    clockid: libc::clockid_t,
    flags: c_int,
    req: *const libc::timespec,
    rem: *mut libc::timespec,
) -> c_int {
    if req.is_null() {
        return libc::EFAULT;
    }
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_CLOCK_NANOSLEEP,
            "clock_nanosleep",
            unsafe extern "C" fn(libc::clockid_t, c_int, *const libc::timespec, *mut libc::timespec) -> c_int
        );
        return real(clockid, flags, req, rem);
    }
    if (*req).tv_nsec < 0 || (*req).tv_nsec >= 1_000_000_000 {
        return libc::EINVAL;
    }
    let absolute = flags & libc::TIMER_ABSTIME != 0;
    let target = if absolute {
        Instant::from_nanos((*req).tv_sec as i64 * 1_000_000_000 + (*req).tv_nsec as i64)
    } else {
        sim().now() + duration_from_timespec(*req)
    };
    if absolute && target <= sim().now() {
        return 0;
    }
    sim().wait_until(target);
    if !rem.is_null() {
        (*rem).tv_sec = 0;
        (*rem).tv_nsec = 0;
    }
    0
}

// ---------------------------------------------------------------------
// Virtual timer fds
// ---------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn timerfd_create(clockid: c_int, flags: c_int) -> RawFd {
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_TIMERFD_CREATE,
            "timerfd_create",
            unsafe extern "C" fn(c_int, c_int) -> RawFd
        );
        return real(clockid, flags);
    }
    // TFD_CLOEXEC is implicit (virtual timer fds are always close-on-exec);
    // TFD_NONBLOCK has no virtual equivalent and is rejected.
    if flags & libc::TFD_NONBLOCK != 0 {
        set_errno(libc::EINVAL);
        return -1;
    }
    match sim().timerfd_create() {
        Ok(fd) => fd,
        Err(_) => {
            set_errno(libc::EMFILE);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn timerfd_settime(
    fd: RawFd,
    flags: c_int,
    new_value: *const libc::itimerspec,
    old_value: *mut libc::itimerspec,
) -> c_int {
    if new_value.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_TIMERFD_SETTIME,
            "timerfd_settime",
            unsafe extern "C" fn(RawFd, c_int, *const libc::itimerspec, *mut libc::itimerspec) -> c_int
        );
        return real(fd, flags, new_value, old_value);
    }
    if flags & libc::TFD_TIMER_CANCEL_ON_SET != 0
        || !nanos_in_range((*new_value).it_value.tv_nsec as i64)
        || !nanos_in_range((*new_value).it_interval.tv_nsec as i64)
    {
        set_errno(libc::EINVAL);
        return -1;
    }
    let value = duration_from_timespec((*new_value).it_value);
    let interval = duration_from_timespec((*new_value).it_interval);
    let absolute = flags & libc::TFD_TIMER_ABSTIME != 0;
    let expiration = if value.is_zero() {
        Instant::DISARMED
    } else if absolute {
        Instant::from_nanos(value.as_nanos())
    } else {
        sim().now() + value
    };
    match sim().timerfd_set_time(fd, expiration, interval) {
        Ok((old_remaining, old_interval)) => {
            if !old_value.is_null() {
                (*old_value).it_value = timespec_from_duration(old_remaining);
                (*old_value).it_interval = timespec_from_duration(old_interval);
            }
            0
        }
        Err(_) => {
            set_errno(libc::EBADF);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn timerfd_gettime(fd: RawFd, curr_value: *mut libc::itimerspec) -> c_int {
    if curr_value.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_TIMERFD_GETTIME,
            "timerfd_gettime",
            unsafe extern "C" fn(RawFd, *mut libc::itimerspec) -> c_int
        );
        return real(fd, curr_value);
    }
    match sim().timerfd_get_time(fd) {
        Ok((remaining, interval)) => {
            (*curr_value).it_value = timespec_from_duration(remaining);
            (*curr_value).it_interval = timespec_from_duration(interval);
            0
        }
        Err(_) => {
            set_errno(libc::EBADF);
            -1
        }
    }
}

// ---------------------------------------------------------------------
// POSIX interval timers
// ---------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn timer_create(
    clockid: libc::clockid_t,
    sevp: *mut libc::sigevent,
    timerid: *mut libc::timer_t,
) -> c_int {
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_TIMER_CREATE,
            "timer_create",
            unsafe extern "C" fn(libc::clockid_t, *mut libc::sigevent, *mut libc::timer_t) -> c_int
        );
        return real(clockid, sevp, timerid);
    }
    // sevp is accepted but never acted on: signal delivery on expiration
    // is out of scope.
    let _ = sevp;
    if timerid.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let id = sim().posix_timers().create();
    *timerid = id.into_raw() as usize as libc::timer_t;
    0
}

#[no_mangle]
pub unsafe extern "C" fn timer_delete(timerid: libc::timer_t) -> c_int {
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_TIMER_DELETE,
            "timer_delete",
            unsafe extern "C" fn(libc::timer_t) -> c_int
        );
        return real(timerid);
    }
    let id = PosixTimerId::from_raw(timerid as usize as u64);
    if sim().posix_timers().delete(id) {
        0
    } else {
        set_errno(libc::EINVAL);
        -1
    }
}

#[no_mangle]
pub unsafe extern "C" fn timer_settime(
    timerid: libc::timer_t,
    flags: c_int,
    new_value: *const libc::itimerspec,
    old_value: *mut libc::itimerspec,
) -> c_int {
    if new_value.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_TIMER_SETTIME,
            "timer_settime",
            unsafe extern "C" fn(libc::timer_t, c_int, *const libc::itimerspec, *mut libc::itimerspec) -> c_int
        );
        return real(timerid, flags, new_value, old_value);
    }
    if !nanos_in_range((*new_value).it_value.tv_nsec as i64)
        || !nanos_in_range((*new_value).it_interval.tv_nsec as i64)
    {
        set_errno(libc::EINVAL);
        return -1;
    }
    let id = PosixTimerId::from_raw(timerid as usize as u64);
    let absolute = flags & libc::TIMER_ABSTIME != 0;
    let value = TimerValue {
        value: duration_from_timespec((*new_value).it_value),
        interval: duration_from_timespec((*new_value).it_interval),
    };
    match sim().posix_timers().set_time(id, sim().now(), absolute, value) {
        Some(old) => {
            if !old_value.is_null() {
                (*old_value).it_value = timespec_from_duration(old.value);
                (*old_value).it_interval = timespec_from_duration(old.interval);
            }
            0
        }
        None => {
            set_errno(libc::EINVAL);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn timer_gettime(timerid: libc::timer_t, curr_value: *mut libc::itimerspec) -> c_int {
    if curr_value.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    if !sim().is_intercepting() {
        let real = real_fn!(
            REAL_TIMER_GETTIME,
            "timer_gettime",
            unsafe extern "C" fn(libc::timer_t, *mut libc::itimerspec) -> c_int
        );
        return real(timerid, curr_value);
    }
    let id = PosixTimerId::from_raw(timerid as usize as u64);
    match sim().posix_timers().get_time(id, sim().now()) {
        Some(v) => {
            (*curr_value).it_value = timespec_from_duration(v.value);
            (*curr_value).it_interval = timespec_from_duration(v.interval);
            0
        }
        None => {
            set_errno(libc::EINVAL);
            -1
        }
    }
}

// ---------------------------------------------------------------------
// Socket timeouts
// ---------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn setsockopt(
    sockfd: RawFd,
    level: c_int,
    optname: c_int,
    optval: *const c_void,
    optlen: libc::socklen_t,
) -> c_int {
    let real = real_fn!(
        REAL_SETSOCKOPT,
        "setsockopt",
        unsafe extern "C" fn(RawFd, c_int, c_int, *const c_void, libc::socklen_t) -> c_int
    );
    let ret = real(sockfd, level, optname, optval, optlen);
    if ret == 0
        && sim().is_intercepting()
        && level == libc::SOL_SOCKET
        && (optname == libc::SO_RCVTIMEO || optname == libc::SO_SNDTIMEO)
        && !optval.is_null()
        && optlen as usize >= std::mem::size_of::<libc::timeval>()
    {
        let tv = *(optval as *const libc::timeval);
        let d = Duration::from_nanos(tv.tv_sec as i64 * 1_000_000_000 + tv.tv_usec as i64 * 1_000);
        if optname == libc::SO_RCVTIMEO {
            sim().socket_timeouts().set_recv(sockfd, d);
        } else {
            sim().socket_timeouts().set_send(sockfd, d);
        }
    }
    ret
}

#[no_mangle]
pub unsafe extern "C" fn getsockopt(
    sockfd: RawFd,
    level: c_int,
    optname: c_int,
    optval: *mut c_void,
    optlen: *mut libc::socklen_t,
) -> c_int {
    let real = real_fn!(
        REAL_GETSOCKOPT,
        "getsockopt",
        unsafe extern "C" fn(RawFd, c_int, c_int, *mut c_void, *mut libc::socklen_t) -> c_int
    );
    let ret = real(sockfd, level, optname, optval, optlen);
    if ret == 0
        && sim().is_intercepting()
        && level == libc::SOL_SOCKET
        && (optname == libc::SO_RCVTIMEO || optname == libc::SO_SNDTIMEO)
        && !optval.is_null()
        && !optlen.is_null()
        && *optlen as usize >= std::mem::size_of::<libc::timeval>()
    {
        let d = if optname == libc::SO_RCVTIMEO {
            sim().socket_timeouts().get_recv(sockfd)
        } else {
            sim().socket_timeouts().get_send(sockfd)
        };
        let nanos = d.as_nanos();
        *(optval as *mut libc::timeval) = libc::timeval {
            tv_sec: (nanos / 1_000_000_000) as libc::time_t,
            tv_usec: ((nanos % 1_000_000_000) / 1_000) as libc::suseconds_t,
        };
        *optlen = std::mem::size_of::<libc::timeval>() as libc::socklen_t;
    }
    ret
}

/// Poll `fd` for readability/writability, honoring its registered virtual
/// timeout. Shared by the `recv`/`send` overrides below.
unsafe fn wait_for(fd: RawFd, events: i16, timeout: Duration) -> bool {
    if timeout.is_zero() {
        return true;
    }
    let target = sim().now() + timeout;
    let vtd_fd = match sim().timerfd_create() {
        Ok(created) => created,
        Err(_) => return true,
    };
    if sim().timerfd_set_time(vtd_fd, target, Duration::ZERO).is_err() {
        sim().timerfd_forget(vtd_fd);
        libc::close(vtd_fd);
        return true;
    }
    let mut fds = [
        libc::pollfd { fd, events, revents: 0 },
        libc::pollfd {
            fd: vtd_fd,
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    let ret = real_poll()(fds.as_mut_ptr(), 2, -1);
    sim().timerfd_forget(vtd_fd);
    libc::close(vtd_fd);
    ret > 0 && fds[0].revents & events != 0
}

#[no_mangle]
pub unsafe extern "C" fn recv(sockfd: RawFd, buf: *mut c_void, len: usize, flags: c_int) -> isize {
    let real = real_fn!(
        REAL_RECV,
        "recv",
        unsafe extern "C" fn(RawFd, *mut c_void, usize, c_int) -> isize
    );
    if !sim().is_intercepting() {
        return real(sockfd, buf, len, flags);
    }
    let timeout = sim().socket_timeouts().get_recv(sockfd);
    if !wait_for(sockfd, libc::POLLIN, timeout) {
        set_errno(libc::EAGAIN);
        return -1;
    }
    real(sockfd, buf, len, flags)
}

#[no_mangle]
pub unsafe extern "C" fn send(sockfd: RawFd, buf: *const c_void, len: usize, flags: c_int) -> isize {
    let real = real_fn!(
        REAL_SEND,
        "send",
        unsafe extern "C" fn(RawFd, *const c_void, usize, c_int) -> isize
    );
    if !sim().is_intercepting() {
        return real(sockfd, buf, len, flags);
    }
    let timeout = sim().socket_timeouts().get_send(sockfd);
    if !wait_for(sockfd, libc::POLLOUT, timeout) {
        set_errno(libc::EAGAIN);
        return -1;
    }
    real(sockfd, buf, len, flags)
}

#[no_mangle]
pub unsafe extern "C" fn connect(sockfd: RawFd, addr: *const libc::sockaddr, addrlen: libc::socklen_t) -> c_int {
    let real = real_fn!(
        REAL_CONNECT,
        "connect",
        unsafe extern "C" fn(RawFd, *const libc::sockaddr, libc::socklen_t) -> c_int
    );
    let timeout = sim().socket_timeouts().get_send(sockfd);
    if !sim().is_intercepting() || timeout.is_zero() {
        return real(sockfd, addr, addrlen);
    }

    let orig_flags = libc::fcntl(sockfd, libc::F_GETFL, 0);
    if orig_flags < 0 {
        return real(sockfd, addr, addrlen);
    }
    if libc::fcntl(sockfd, libc::F_SETFL, orig_flags | libc::O_NONBLOCK) < 0 {
        return real(sockfd, addr, addrlen);
    }

    let ret = real(sockfd, addr, addrlen);
    let errno = *libc::__errno_location();
    let result = if ret == 0 {
        0
    } else if errno != libc::EINPROGRESS {
        ret
    } else if wait_for(sockfd, libc::POLLOUT, timeout) {
        let mut err: c_int = 0;
        let mut len = std::mem::size_of::<c_int>() as libc::socklen_t;
        let check = libc::getsockopt(
            sockfd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut c_int as *mut c_void,
            &mut len,
        );
        if check == 0 && err == 0 {
            0
        } else {
            set_errno(if err != 0 { err } else { libc::ECONNREFUSED });
            -1
        }
    } else {
        set_errno(libc::ETIMEDOUT);
        -1
    };

    libc::fcntl(sockfd, libc::F_SETFL, orig_flags);
    result
}

#[no_mangle]
pub unsafe extern "C" fn close(fd: RawFd) -> c_int {
    let real = real_fn!(REAL_CLOSE, "close", unsafe extern "C" fn(RawFd) -> c_int);
    let ret = real(fd);
    if sim().is_intercepting() {
        sim().socket_timeouts().forget(fd);
        sim().timerfd_forget(fd);
    }
    ret
}

// ---------------------------------------------------------------------
// Multiplexers: poll / select / epoll_wait
// ---------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn poll(fds: *mut libc::pollfd, nfds: libc::nfds_t, timeout: c_int) -> c_int {
    if !sim().is_intercepting() || timeout <= 0 {
        return real_poll()(fds, nfds, timeout);
    }

    let target = sim().now() + Duration::from_nanos(timeout as i64 * 1_000_000);
    let vtd_fd = match sim().timerfd_create() {
        Ok(fd) => fd,
        Err(_) => return real_poll()(fds, nfds, timeout),
    };
    if sim().timerfd_set_time(vtd_fd, target, Duration::ZERO).is_err() {
        sim().timerfd_forget(vtd_fd);
        libc::close(vtd_fd);
        return real_poll()(fds, nfds, timeout);
    }

    let n = nfds as usize;
    let mut extended: Vec<libc::pollfd> = Vec::with_capacity(n + 1);
    if n > 0 {
        extended.extend(std::slice::from_raw_parts(fds, n).iter().copied());
    }
    extended.push(libc::pollfd {
        fd: vtd_fd,
        events: libc::POLLIN,
        revents: 0,
    });

    let ret = real_poll()(extended.as_mut_ptr(), extended.len() as libc::nfds_t, -1);

    sim().timerfd_forget(vtd_fd);
    libc::close(vtd_fd);

    if ret < 0 {
        return ret;
    }
    let mut ready = 0;
    for i in 0..n {
        (*fds.add(i)).revents = extended[i].revents;
        if extended[i].revents != 0 {
            ready += 1;
        }
    }
    ready
}

#[no_mangle]
pub unsafe extern "C" fn select(
    nfds: c_int,
    readfds: *mut libc::fd_set,
    writefds: *mut libc::fd_set,
    exceptfds: *mut libc::fd_set,
    timeout: *mut libc::timeval,
) -> c_int {
    let real = real_fn!(
        REAL_SELECT,
        "select",
        unsafe extern "C" fn(c_int, *mut libc::fd_set, *mut libc::fd_set, *mut libc::fd_set, *mut libc::timeval) -> c_int
    );
    if !sim().is_intercepting() || timeout.is_null() {
        return real(nfds, readfds, writefds, exceptfds, timeout);
    }

    let d = Duration::from_nanos((*timeout).tv_sec as i64 * 1_000_000_000 + (*timeout).tv_usec as i64 * 1_000);
    if d.is_zero() {
        return real(nfds, readfds, writefds, exceptfds, timeout);
    }
    let target = sim().now() + d;
    let vtd_fd = match sim().timerfd_create() {
        Ok(fd) => fd,
        Err(_) => return real(nfds, readfds, writefds, exceptfds, timeout),
    };
    if sim().timerfd_set_time(vtd_fd, target, Duration::ZERO).is_err() {
        sim().timerfd_forget(vtd_fd);
        libc::close(vtd_fd);
        return real(nfds, readfds, writefds, exceptfds, timeout);
    }

    let mut local_read: libc::fd_set = std::mem::zeroed();
    libc::FD_ZERO(&mut local_read);
    if !readfds.is_null() {
        for fd in 0..nfds {
            if libc::FD_ISSET(fd, readfds) {
                libc::FD_SET(fd, &mut local_read);
            }
        }
    }
    libc::FD_SET(vtd_fd, &mut local_read);
    let widened_nfds = nfds.max(vtd_fd + 1);

    let ret = real(widened_nfds, &mut local_read, writefds, exceptfds, std::ptr::null_mut());

    sim().timerfd_forget(vtd_fd);
    libc::close(vtd_fd);

    if ret < 0 {
        return ret;
    }

    if !readfds.is_null() {
        libc::FD_ZERO(readfds);
        for fd in 0..nfds {
            if libc::FD_ISSET(fd, &local_read) {
                libc::FD_SET(fd, readfds);
            }
        }
    }

    let mut count = 0;
    for fd in 0..nfds {
        if !readfds.is_null() && libc::FD_ISSET(fd, readfds) {
            count += 1;
        }
        if !writefds.is_null() && libc::FD_ISSET(fd, writefds) {
            count += 1;
        }
        if !exceptfds.is_null() && libc::FD_ISSET(fd, exceptfds) {
            count += 1;
        }
    }
    count
}

#[no_mangle]
pub unsafe extern "C" fn epoll_wait(
    epfd: c_int,
    events: *mut libc::epoll_event,
    maxevents: c_int,
    timeout: c_int,
) -> c_int {
    let real = real_fn!(
        REAL_EPOLL_WAIT,
        "epoll_wait",
        unsafe extern "C" fn(c_int, *mut libc::epoll_event, c_int, c_int) -> c_int
    );
    if !sim().is_intercepting() || timeout <= 0 {
        return real(epfd, events, maxevents, timeout);
    }

    let target = sim().now() + Duration::from_nanos(timeout as i64 * 1_000_000);
    let vtd_fd = match sim().timerfd_create() {
        Ok(fd) => fd,
        Err(_) => return real(epfd, events, maxevents, timeout),
    };
    if sim().timerfd_set_time(vtd_fd, target, Duration::ZERO).is_err() {
        sim().timerfd_forget(vtd_fd);
        libc::close(vtd_fd);
        return real(epfd, events, maxevents, timeout);
    }

    let mut ev = libc::epoll_event {
        events: libc::EPOLLIN as u32,
        u64: u64::MAX,
    };
    if libc::epoll_ctl(epfd, libc::EPOLL_CTL_ADD, vtd_fd, &mut ev) != 0 {
        sim().timerfd_forget(vtd_fd);
        libc::close(vtd_fd);
        return real(epfd, events, maxevents, timeout);
    }

    let ret = real(epfd, events, maxevents, -1);

    libc::epoll_ctl(epfd, libc::EPOLL_CTL_DEL, vtd_fd, std::ptr::null_mut());
    sim().timerfd_forget(vtd_fd);
    libc::close(vtd_fd);

    if ret < 0 {
        return ret;
    }
    let mut out = 0;
    for i in 0..ret {
        let e = *events.add(i as usize);
        if e.u64 == u64::MAX {
            continue;
        }
        if out != i {
            *events.add(out as usize) = e;
        }
        out += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gettimeofday_without_client_passes_through() {
        let mut tv = libc::timeval { tv_sec: 0, tv_usec: 0 };
        let ret = unsafe { gettimeofday(&mut tv, std::ptr::null_mut()) };
        assert_eq!(ret, 0);
        assert!(tv.tv_sec > 0);
    }

    #[test]
    fn sleep_zero_with_no_client_returns_zero() {
        assert_eq!(unsafe { sleep(0) }, 0);
    }
}
