//! Descriptor-equivalence probe (§4.C).
//!
//! Decides whether two fd numbers still refer to the same kernel file
//! object. Used to detect that a [`crate`]-level consumer has closed its
//! side of a virtual timer descriptor.

use std::os::unix::io::RawFd;

// `libc` does not expose `KCMP_FILE`/`SYS_kcmp` as of 0.2 on all targets;
// the numeric values are stable ABI (see linux/kcmp.h).
const KCMP_FILE: libc::c_int = 0;

/// `true` iff `fd_a` and `fd_b` are both open and reference the same
/// kernel file object in the current process.
///
/// Tries the `kcmp` syscall first (O(1), no filesystem access); falls back
/// to comparing `/proc/self/fdinfo/<fd>` contents byte-for-byte if `kcmp`
/// is unavailable (e.g. seccomp-filtered). If either fd's fdinfo file can't
/// be opened — in particular, if the fd was closed — the descriptors are
/// reported as not equivalent.
pub fn same_kernel_object(fd_a: RawFd, fd_b: RawFd) -> bool {
    match kcmp_probe(fd_a, fd_b) {
        Some(result) => result,
        None => fdinfo_probe(fd_a, fd_b),
    }
}

fn kcmp_probe(fd_a: RawFd, fd_b: RawFd) -> Option<bool> {
    let pid = unsafe { libc::getpid() };
    let ret = unsafe {
        libc::syscall(
            libc::SYS_kcmp,
            pid as libc::c_long,
            pid as libc::c_long,
            KCMP_FILE as libc::c_long,
            fd_a as libc::c_long,
            fd_b as libc::c_long,
        )
    };
    if ret < 0 {
        let errno = unsafe { *libc::__errno_location() };
        if errno == libc::ENOSYS || errno == libc::EPERM {
            return None;
        }
        // Any other failure (e.g. EBADF because one fd is closed) means
        // they are not the same object.
        return Some(false);
    }
    Some(ret == 0)
}

fn fdinfo_probe(fd_a: RawFd, fd_b: RawFd) -> bool {
    let (a, b) = match (read_fdinfo(fd_a), read_fdinfo(fd_b)) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    a == b
}

fn read_fdinfo(fd: RawFd) -> Option<Vec<u8>> {
    std::fs::read(format!("/proc/self/fdinfo/{}", fd)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn dup_of_same_fd_is_equivalent() {
        let f = std::fs::File::open("/dev/null").unwrap();
        let dup_fd = unsafe { libc::dup(f.as_raw_fd()) };
        assert!(dup_fd >= 0);
        assert!(same_kernel_object(f.as_raw_fd(), dup_fd));
        unsafe { libc::close(dup_fd) };
    }

    #[test]
    fn independently_opened_fds_are_not_equivalent() {
        let a = std::fs::File::open("/dev/null").unwrap();
        let b = std::fs::File::open("/dev/null").unwrap();
        assert!(!same_kernel_object(a.as_raw_fd(), b.as_raw_fd()));
    }

    #[test]
    fn closed_fd_is_not_equivalent() {
        let f = std::fs::File::open("/dev/null").unwrap();
        let dup_fd = unsafe { libc::dup(f.as_raw_fd()) };
        unsafe { libc::close(dup_fd) };
        assert!(!same_kernel_object(f.as_raw_fd(), dup_fd));
    }
}
