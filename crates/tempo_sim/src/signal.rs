//! The signal access traits that form the simulation-host boundary.

use std::fmt;
use std::sync::Arc;

use tempo_common::LogicVec;

use crate::error::SimError;

/// Read/write access to one simulator wire.
///
/// Implementations must make `set_value` a deferred write: the new value
/// becomes visible to `value` only once the host has finished the current
/// write phase.
pub trait SignalAccess: Send + Sync {
    /// Full host path of the signal (e.g. `stream_in_valid`).
    fn name(&self) -> &str;

    /// Width in bits.
    fn width(&self) -> u32;

    /// The settled value of the signal.
    fn value(&self) -> LogicVec;

    /// Schedules a new value for the signal.
    fn set_value(&self, value: LogicVec) -> Result<(), SimError>;
}

/// Shared handle to a host signal.
pub type SignalRef = Arc<dyn SignalAccess>;

impl fmt::Debug for dyn SignalAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]={}", self.name(), self.width(), self.value())
    }
}

/// Resolves signal paths to access handles.
pub trait SignalHost: Send + Sync {
    /// Returns the signal at `path`, or `None` if the design has no such wire.
    fn lookup(&self, path: &str) -> Option<SignalRef>;
}

/// Convenience conversions on top of [`SignalAccess`].
pub trait SignalExt: SignalAccess {
    /// Schedules an unsigned integer, truncated to the signal width.
    fn set_u64(&self, value: u64) -> Result<(), SimError> {
        self.set_value(LogicVec::from_u64(value, self.width()))
    }

    /// Schedules a wide unsigned integer, truncated to the signal width.
    fn set_u128(&self, value: u128) -> Result<(), SimError> {
        self.set_value(LogicVec::from_u128(value, self.width()))
    }

    /// Schedules a 0/1 level on every bit of the signal.
    fn set_bool(&self, value: bool) -> Result<(), SimError> {
        self.set_u64(u64::from(value))
    }

    /// Settled value as an unsigned integer, or `None` if unresolvable.
    fn to_u64(&self) -> Option<u64> {
        self.value().to_u64()
    }

    /// Settled value as a wide unsigned integer, or `None` if unresolvable.
    fn to_u128(&self) -> Option<u128> {
        self.value().to_u128()
    }

    /// True if the settled value is resolvable and non-zero.
    fn is_high(&self) -> bool {
        self.value().is_high()
    }
}

impl<T: SignalAccess + ?Sized> SignalExt for T {}
