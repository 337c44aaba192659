//! The in-memory reference host.
//!
//! [`SimHost`] stores every signal as a committed value plus an optional
//! pending write. Writes land in the pending slot; [`SimHost::commit`]
//! applies all of them at once. The clock task commits before it publishes
//! each phase, which gives the engine its write-then-read ordering within an
//! edge without any further locking.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tempo_common::LogicVec;
use tokio::time::{sleep_until, Instant};

use crate::clock::{Clock, Phase};
use crate::error::SimError;
use crate::lock;
use crate::signal::{SignalAccess, SignalExt, SignalHost, SignalRef};
use crate::task::TaskHandle;
use crate::time::SimTime;

/// In-memory signal table with deferred writes.
#[derive(Clone, Default)]
pub struct SimHost {
    signals: Arc<Mutex<BTreeMap<String, Arc<HostSignal>>>>,
}

/// A wire stored in a [`SimHost`].
pub struct HostSignal {
    name: String,
    width: u32,
    state: Mutex<SignalState>,
}

struct SignalState {
    committed: LogicVec,
    pending: Option<LogicVec>,
}

impl SimHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signal whose power-on value is all `X`.
    pub fn add_signal(&self, name: &str, width: u32) -> Result<SignalRef, SimError> {
        self.add_signal_with(name, LogicVec::unknown(width))
    }

    /// Adds a signal with an explicit initial (already committed) value.
    pub fn add_signal_with(&self, name: &str, initial: LogicVec) -> Result<SignalRef, SimError> {
        let mut signals = lock(&self.signals);
        if signals.contains_key(name) {
            return Err(SimError::DuplicateSignal(name.to_string()));
        }
        let signal = Arc::new(HostSignal {
            name: name.to_string(),
            width: initial.width(),
            state: Mutex::new(SignalState {
                committed: initial,
                pending: None,
            }),
        });
        signals.insert(name.to_string(), signal.clone());
        Ok(signal)
    }

    /// Applies every pending write. Returns how many signals changed value.
    pub fn commit(&self) -> usize {
        let signals = lock(&self.signals);
        let mut changed = 0;
        for signal in signals.values() {
            let mut state = lock(&signal.state);
            if let Some(next) = state.pending.take() {
                if next != state.committed {
                    changed += 1;
                    state.committed = next;
                }
            }
        }
        changed
    }

    /// Names of every registered signal, sorted.
    pub fn signal_names(&self) -> Vec<String> {
        lock(&self.signals).keys().cloned().collect()
    }

    /// Starts a free-running clock on the 1-bit signal `name`.
    ///
    /// The clock task owns the phase sequence of every cycle:
    ///
    /// 1. commit, drive `name` high, publish [`Phase::Rising`];
    /// 2. one step later, commit, publish [`Phase::ReadOnly`];
    /// 3. at half period, commit, drive `name` low, publish [`Phase::Falling`].
    ///
    /// The first rising edge happens half a period after the call. The
    /// returned [`TaskHandle`] owns the clock task; dropping it stops the clock.
    pub fn start_clock(
        &self,
        name: &str,
        period: SimTime,
    ) -> Result<(Clock, TaskHandle<()>), SimError> {
        let steps = period.steps();
        if steps < 4 || steps % 2 != 0 {
            return Err(SimError::InvalidPeriod(steps));
        }
        let signal = match self.lookup(name) {
            Some(signal) => signal,
            None => self.add_signal(name, 1)?,
        };
        let (clock, edges) = Clock::new(name, period);
        let half = SimTime::from_steps(steps / 2).to_duration();
        let settle = SimTime::from_steps(1).to_duration();
        let host = self.clone();
        let task = TaskHandle::spawn(format!("clock:{name}"), async move {
            signal.set_bool(false).ok();
            host.commit();
            let start = Instant::now();
            let mut cycle: u32 = 0;
            loop {
                let rise = start + half + half * 2 * cycle;
                sleep_until(rise).await;
                signal.set_bool(true).ok();
                host.commit();
                edges.publish(Phase::Rising);

                sleep_until(rise + settle).await;
                host.commit();
                edges.publish(Phase::ReadOnly);

                sleep_until(rise + half).await;
                signal.set_bool(false).ok();
                host.commit();
                edges.publish(Phase::Falling);
                cycle = cycle.wrapping_add(1);
            }
        });
        log::debug!("started clock '{name}' with period {period}");
        Ok((clock, task))
    }
}

impl SignalHost for SimHost {
    fn lookup(&self, path: &str) -> Option<SignalRef> {
        lock(&self.signals)
            .get(path)
            .map(|signal| signal.clone() as SignalRef)
    }
}

impl SignalAccess for HostSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn value(&self) -> LogicVec {
        lock(&self.state).committed.clone()
    }

    fn set_value(&self, value: LogicVec) -> Result<(), SimError> {
        if value.width() != self.width {
            return Err(SimError::WidthMismatch {
                signal: self.name.clone(),
                expected: self.width,
                actual: value.width(),
            });
        }
        lock(&self.state).pending = Some(value);
        Ok(())
    }
}
