//! Simulation time measured in host steps.
//!
//! The reference host maps one simulation step onto two milliseconds of the
//! (paused) tokio clock. Every simulation event lands on a whole step, which
//! leaves the half step in between as a settle point: a timer that expires
//! there fires only after every task scheduled for the step has run. Nothing
//! in the engine depends on wall-clock units; periods, timeouts and waits
//! are all expressed as step counts.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Runtime duration of one simulation step.
pub const STEP: Duration = Duration::from_millis(2);

/// Offset from a step to its settle point.
pub const HALF_STEP: Duration = Duration::from_millis(1);

/// A point or span of simulation time, in steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime {
    steps: u64,
}

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime { steps: 0 };

    /// Creates a time from a step count.
    pub const fn from_steps(steps: u64) -> Self {
        Self { steps }
    }

    /// Returns the step count.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Converts to the runtime duration used for timers.
    pub fn to_duration(&self) -> Duration {
        STEP.saturating_mul(u32::try_from(self.steps).unwrap_or(u32::MAX))
    }

    /// Runtime duration to the settle point of the step `self` from now.
    pub fn to_settled_duration(&self) -> Duration {
        self.to_duration() + HALF_STEP
    }

    /// Converts a runtime duration to steps, truncating partial steps.
    pub fn from_duration(duration: Duration) -> Self {
        let steps = duration.as_millis() / STEP.as_millis();
        Self {
            steps: u64::try_from(steps).unwrap_or(u64::MAX),
        }
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime::from_steps(self.steps.saturating_add(rhs.steps))
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime::from_steps(self.steps.saturating_sub(rhs.steps))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps == 1 {
            write!(f, "1 step")
        } else {
            write!(f, "{} steps", self.steps)
        }
    }
}
