//! # vtime-shim
//!
//! libc-ABI-compatible override functions plus the administrative API a
//! test harness uses to drive them.
//!
//! Built as both an `rlib`, for harnesses that want to link the
//! administrative API directly, and a `cdylib`, whose exported `#[no_mangle]`
//! symbols are the ones an `LD_PRELOAD`-style loader shadows ahead of libc.
//! Packaging the resulting shared object for actual preloading is outside
//! this crate's concern; it only has to export the right symbols with the
//! right signatures.

pub mod overrides;

pub use vtime_core::{Duration, Instant, SimError, SimResult};
pub use vtime_runtime::Simulator;

/// RAII guard marking the calling test as an active client of the virtual
/// clock. While any handle is outstanding, every override in
/// [`overrides`] routes through the simulator instead of the real OS.
pub use vtime_runtime::ClientHandle;

/// Attach the current process as a client, switching interception on.
pub fn attach_client() -> ClientHandle {
    Simulator::attach_client()
}

/// Current virtual time, as nanoseconds since the simulator's epoch.
pub fn now() -> Instant {
    Simulator::global().now()
}

/// Advance virtual time by `nanos` nanoseconds, firing any timers that
/// expire at or before the new time.
pub fn advance(nanos: i64) -> SimResult<()> {
    Simulator::global().advance(Duration::from_nanos(nanos))
}

/// Jump virtual time to an absolute instant, given as nanoseconds since
/// the simulator's epoch. Moving backwards is permitted; `now()` is not
/// guaranteed monotonic across `set_time` calls.
pub fn set_time(nanos: i64) -> SimResult<()> {
    Simulator::global().set_time(Instant::from_nanos(nanos))
}
