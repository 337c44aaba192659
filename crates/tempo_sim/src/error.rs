//! Simulation error types for the host boundary.
//!
//! All errors raised while binding buses, accessing signals or waiting on
//! clock triggers are represented as variants of [`SimError`].

/// Errors that can occur while talking to the simulation host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// A signal the protocol needs is not present on the host.
    #[error("bus '{bus}' has no signal '{signal}'")]
    MissingSignal {
        /// The bus prefix.
        bus: String,
        /// The logical signal name.
        signal: String,
    },

    /// A logical name was used that the protocol never declared.
    #[error("bus '{bus}' does not declare a signal named '{signal}'")]
    UnknownSignal {
        /// The bus prefix.
        bus: String,
        /// The logical signal name.
        signal: String,
    },

    /// A value of the wrong width was written to a signal.
    #[error("cannot write {actual}-bit value to '{signal}' ({expected} bits)")]
    WidthMismatch {
        /// The host signal path.
        signal: String,
        /// The signal width.
        expected: u32,
        /// The width of the value written.
        actual: u32,
    },

    /// A signal was registered twice on the reference host.
    #[error("signal '{0}' already exists")]
    DuplicateSignal(String),

    /// A clock period the host cannot split into phases.
    #[error("clock period of {0} steps is too short (need an even period >= 4)")]
    InvalidPeriod(u64),

    /// The clock that a task was waiting on has been torn down.
    #[error("clock '{0}' stopped")]
    ClockStopped(String),
}
