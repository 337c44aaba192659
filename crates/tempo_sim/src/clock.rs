//! Clock phase triggers.
//!
//! A [`Clock`] is a cheap, cloneable view onto the phase counters published
//! by the host's clock task. Each await subscribes afresh, so a task always
//! waits for the *next* occurrence of a phase, never one that already
//! happened in the current instant.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::SimError;
use crate::time::SimTime;

/// The points within one clock cycle that tasks can wait on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The clock signal has just gone high. Values read here are the ones
    /// committed before the edge.
    Rising,
    /// Every write scheduled on the rising edge has been committed; nothing
    /// may be written until the next phase.
    ReadOnly,
    /// The clock signal has just gone low.
    Falling,
}

/// Waitable view of a running clock.
#[derive(Clone, Debug)]
pub struct Clock {
    inner: Arc<ClockInner>,
}

#[derive(Debug)]
struct ClockInner {
    name: String,
    period: SimTime,
    epoch: Instant,
    rising: watch::Receiver<u64>,
    read_only: watch::Receiver<u64>,
    falling: watch::Receiver<u64>,
}

/// Publishing side of a clock, owned by the task that drives it.
pub(crate) struct EdgePublisher {
    rising: watch::Sender<u64>,
    read_only: watch::Sender<u64>,
    falling: watch::Sender<u64>,
}

impl EdgePublisher {
    /// Wakes every task waiting on `phase`.
    pub(crate) fn publish(&self, phase: Phase) {
        let sender = match phase {
            Phase::Rising => &self.rising,
            Phase::ReadOnly => &self.read_only,
            Phase::Falling => &self.falling,
        };
        sender.send_modify(|count| *count += 1);
    }
}

impl Clock {
    pub(crate) fn new(name: &str, period: SimTime) -> (Self, EdgePublisher) {
        let (rising_tx, rising) = watch::channel(0);
        let (read_only_tx, read_only) = watch::channel(0);
        let (falling_tx, falling) = watch::channel(0);
        let clock = Clock {
            inner: Arc::new(ClockInner {
                name: name.to_string(),
                period,
                epoch: Instant::now(),
                rising,
                read_only,
                falling,
            }),
        };
        let publisher = EdgePublisher {
            rising: rising_tx,
            read_only: read_only_tx,
            falling: falling_tx,
        };
        (clock, publisher)
    }

    /// Host path of the clock signal.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Clock period.
    pub fn period(&self) -> SimTime {
        self.inner.period
    }

    /// Simulation time elapsed since the clock was created.
    pub fn now(&self) -> SimTime {
        SimTime::from_duration(Instant::now() - self.inner.epoch)
    }

    /// Number of rising edges so far.
    pub fn edge_count(&self) -> u64 {
        *self.inner.rising.borrow()
    }

    /// Waits for the next occurrence of `phase`.
    pub async fn tick(&self, phase: Phase) -> Result<(), SimError> {
        let mut rx = match phase {
            Phase::Rising => self.inner.rising.clone(),
            Phase::ReadOnly => self.inner.read_only.clone(),
            Phase::Falling => self.inner.falling.clone(),
        };
        rx.borrow_and_update();
        rx.changed()
            .await
            .map_err(|_| SimError::ClockStopped(self.inner.name.clone()))
    }

    /// Waits for the next rising edge.
    pub async fn rising_edge(&self) -> Result<(), SimError> {
        self.tick(Phase::Rising).await
    }

    /// Waits for the next falling edge.
    pub async fn falling_edge(&self) -> Result<(), SimError> {
        self.tick(Phase::Falling).await
    }

    /// Waits until the writes of the current cycle have settled.
    pub async fn read_only(&self) -> Result<(), SimError> {
        self.tick(Phase::ReadOnly).await
    }

    /// Waits for `n` rising edges.
    pub async fn cycles(&self, n: u32) -> Result<(), SimError> {
        for _ in 0..n {
            self.rising_edge().await?;
        }
        Ok(())
    }

    /// Waits for a span of simulation time, independent of the clock.
    pub async fn timer(&self, span: SimTime) {
        tokio::time::sleep(span.to_duration()).await;
    }
}
