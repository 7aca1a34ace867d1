//! Internal error type for the virtual time simulator.
//!
//! This is plumbing, not ABI: every entry point in `vtime-shim` converts a
//! `SimError` into an `errno` before returning across the FFI boundary (see
//! §7 of the spec). Nothing here is ever exposed to the intercepted program.

use core::fmt;

/// Result type for simulator-internal operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors that can occur inside the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// A virtual timer fd, POSIX timer id, or socket fd was not found in its
    /// registry. Maps to `EINVAL` at the FFI boundary.
    UnknownHandle,

    /// A subsecond field, flag bit, or clock id was out of the range the
    /// corresponding real syscall accepts. Maps to `EINVAL`.
    InvalidArgument,

    /// A required pointer was null or the memory it points to could not be
    /// read. Maps to `EFAULT`.
    BadPointer,

    /// A recv/send loop's deadline elapsed without the underlying op
    /// completing. Maps to `EAGAIN`.
    TimedOut,

    /// A `connect` loop's deadline elapsed while the connection was still
    /// in progress. Maps to `ETIMEDOUT`.
    ConnectTimedOut,

    /// The real syscall that backs a simulator operation (eventfd, dup,
    /// kcmp, ...) failed; carries the raw errno.
    Os(i32),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::UnknownHandle => write!(f, "unknown timer or socket handle"),
            SimError::InvalidArgument => write!(f, "invalid argument"),
            SimError::BadPointer => write!(f, "bad pointer"),
            SimError::TimedOut => write!(f, "operation timed out"),
            SimError::ConnectTimedOut => write!(f, "connect timed out"),
            SimError::Os(errno) => write!(f, "OS error: errno {}", errno),
        }
    }
}

impl std::error::Error for SimError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(format!("{}", SimError::UnknownHandle), "unknown timer or socket handle");
        assert_eq!(format!("{}", SimError::Os(5)), "OS error: errno 5");
    }
}
