//! Socket-timeout registry (§4.E).
//!
//! A small mutex-protected map from socket fd to (recv timeout, send
//! timeout). Populated by the `setsockopt(SO_RCVTIMEO|SO_SNDTIMEO)`
//! override *in addition to* the real setsockopt call, so blocking
//! semantics stay realistic when interception is off.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::Mutex;

use vtime_core::Duration;

#[derive(Clone, Copy, Default)]
struct Timeouts {
    recv: Duration,
    send: Duration,
}

/// Per-socket virtual receive/send timeouts.
pub struct SocketTimeouts {
    entries: Mutex<HashMap<RawFd, Timeouts>>,
}

impl SocketTimeouts {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_recv(&self, fd: RawFd, timeout: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(fd).or_default().recv = timeout;
    }

    pub fn set_send(&self, fd: RawFd, timeout: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(fd).or_default().send = timeout;
    }

    pub fn get_recv(&self, fd: RawFd) -> Duration {
        self.entries.lock().unwrap().get(&fd).map(|t| t.recv).unwrap_or(Duration::ZERO)
    }

    pub fn get_send(&self, fd: RawFd) -> Duration {
        self.entries.lock().unwrap().get(&fd).map(|t| t.send).unwrap_or(Duration::ZERO)
    }

    /// Drop all state for a closed fd. Best-effort bookkeeping only — a
    /// stale entry for a fd the kernel later recycles just means a fresh
    /// `setsockopt` overwrites it, per the "zero means no timeout" default.
    pub fn forget(&self, fd: RawFd) {
        self.entries.lock().unwrap().remove(&fd);
    }
}

impl Default for SocketTimeouts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_zero() {
        let table = SocketTimeouts::new();
        assert_eq!(table.get_recv(3), Duration::ZERO);
        assert_eq!(table.get_send(3), Duration::ZERO);
    }

    #[test]
    fn set_and_get_independent() {
        let table = SocketTimeouts::new();
        table.set_recv(3, Duration::from_nanos(1_000_000));
        table.set_send(3, Duration::from_nanos(2_000_000));
        assert_eq!(table.get_recv(3), Duration::from_nanos(1_000_000));
        assert_eq!(table.get_send(3), Duration::from_nanos(2_000_000));
    }

    #[test]
    fn forget_resets_to_default() {
        let table = SocketTimeouts::new();
        table.set_recv(3, Duration::from_nanos(1_000_000));
        table.forget(3);
        assert_eq!(table.get_recv(3), Duration::ZERO);
    }
}
