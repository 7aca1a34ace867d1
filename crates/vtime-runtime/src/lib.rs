//! # vtime-runtime
//!
//! The fd- and syscall-owning half of the virtual time simulator: the
//! per-fd [`vtd::Vtd`] timer objects, the [`socket_timeouts::SocketTimeouts`]
//! and [`posix_timers::PosixTimers`] registries, the [`client::ClientHandle`]
//! attach/detach guard, and the [`simulator::Simulator`] singleton that ties
//! them all together behind one mutex and condvar.
//!
//! Linux-only: eventfd, `kcmp` and `/proc/self/fdinfo` have no portable
//! equivalent, and the original system this crate reimplements never
//! targeted anything else.

pub mod client;
pub mod posix_timers;
pub mod simulator;
pub mod socket_timeouts;
pub mod vtd;

pub use client::ClientHandle;
pub use posix_timers::{PosixTimerId, PosixTimers, TimerValue};
pub use simulator::Simulator;
pub use socket_timeouts::SocketTimeouts;
pub use vtd::Vtd;
