//! # vtime-core
//!
//! Platform-agnostic value types for the virtual time simulator: the
//! `Instant`/`Duration` newtypes, conversions to/from the two POSIX
//! subsecond layouts, the internal error type, and the descriptor-
//! equivalence probe used to detect that a timer's user-side fd was closed.
//!
//! All OS-specific fd/syscall machinery beyond the probe lives in
//! `vtime-runtime`; all libc-ABI-compatible entry points live in
//! `vtime-shim`.

pub mod duration;
pub mod error;
pub mod fdeq;
pub mod instant;

pub use duration::{
    from_microstruct, from_nanostruct, nanos_in_range, to_microstruct, to_nanostruct, MicroStruct,
    NanoStruct,
};
pub use error::{SimError, SimResult};
pub use fdeq::same_kernel_object;
pub use instant::{Duration, Instant};
