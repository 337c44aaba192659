//! Simulation-host boundary and reference host for the tempo verification engine.
//!
//! The bus engines in `tempo_bus` never talk to a simulator directly. They
//! see a [`SignalHost`] that resolves signal names to [`SignalAccess`]
//! handles, and a [`Clock`] that publishes edges. This crate defines that
//! boundary and ships an in-memory implementation, [`SimHost`], that runs on
//! a single-threaded tokio runtime with paused time.
//!
//! # Scheduling model
//!
//! All monitor, driver and test tasks interleave cooperatively on one
//! thread. Signal writes are deferred: a write made while reacting to an
//! edge becomes visible when the host commits, which happens before every
//! published phase. A monitor that samples after [`Clock::rising_edge`]
//! therefore sees exactly the values that were driven before the edge, and
//! a task that waits for [`Clock::read_only`] sees the writes made at the
//! edge itself.
//!
//! # Modules
//!
//! - `error`: Simulation error types
//! - `time`: Simulation time in host steps
//! - `signal`: The signal access traits forming the host boundary
//! - `host`: The in-memory reference host
//! - `clock`: Edge and read-only triggers
//! - `bus`: Binding logical bus signal names to host signals
//! - `task`: Owned handles of spawned tasks

#![warn(missing_docs)]

pub mod bus;
pub mod clock;
pub mod error;
pub mod host;
pub mod signal;
pub mod task;
pub mod time;

pub use bus::{Bus, Reset};
pub use clock::{Clock, Phase};
pub use error::SimError;
pub use host::SimHost;
pub use signal::{SignalAccess, SignalExt, SignalHost, SignalRef};
pub use task::TaskHandle;
pub use time::{SimTime, HALF_STEP, STEP};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the data if a panicking task poisoned it.
///
/// All shared state in the engine is only touched between suspension
/// points, so a poisoned lock still holds a consistent value.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
