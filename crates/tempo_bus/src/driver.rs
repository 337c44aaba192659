//! Active transaction injection.
//!
//! Every driver serializes its callers through a [`BusLock`] and owns the
//! signals it writes. Idle insertion and backpressure come from
//! [`TimingSequence`]s: [`IdleGate`] drops `valid` between words of a
//! transaction, and [`BitDriver`] toggles a control signal such as `ready`
//! from its own task.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tempo_sim::{Clock, SignalExt, SignalRef, TaskHandle};
use tokio::sync::Notify;

use crate::error::DriverError;
use crate::timing::TimingSequence;

/// A protocol-specific transaction injector.
pub trait Driver {
    /// What a caller hands to [`Driver::send`].
    type Transaction;
    /// What a completed send returns.
    type Response;

    /// Puts `transaction` on the bus. With `sync`, the first write waits for
    /// the next rising edge.
    fn send(
        &self,
        transaction: Self::Transaction,
        sync: bool,
    ) -> impl Future<Output = Result<Self::Response, DriverError>> + Send;
}

/// Exclusive access to a bus shared by several senders.
///
/// A busy flag plus a wake-up notification. Releasing the lock wakes every
/// waiter and each one re-checks the flag, so the first task to run after
/// the release wins. That may be a newcomer rather than the longest waiter:
/// the lock is not FIFO-fair.
#[derive(Debug, Default)]
pub struct BusLock {
    busy: AtomicBool,
    released: Notify,
}

/// Holds a [`BusLock`] until dropped.
#[derive(Debug)]
pub struct BusGuard<'a> {
    lock: &'a BusLock,
}

impl BusLock {
    /// Creates a free lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the bus is free and takes it.
    pub async fn acquire(&self) -> BusGuard<'_> {
        loop {
            let released = self.released.notified();
            if !self.busy.swap(true, Ordering::AcqRel) {
                return BusGuard { lock: self };
            }
            released.await;
        }
    }

    /// Takes the bus if it is free.
    pub fn try_acquire(&self) -> Option<BusGuard<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(BusGuard { lock: self })
        }
    }

    /// True while some sender holds the bus.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for BusGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
        self.lock.released.notify_waiters();
    }
}

/// Drives signals back to their idle level if a send is abandoned.
///
/// A send that is cancelled between edges, or that fails, leaves the bus
/// with `valid` (or `select`) low instead of half-written.
pub(crate) struct IdleOnDrop {
    signals: Vec<SignalRef>,
    armed: bool,
}

impl IdleOnDrop {
    pub(crate) fn new(signals: Vec<SignalRef>) -> Self {
        Self {
            signals,
            armed: true,
        }
    }

    /// The send completed and restored the idle levels itself.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        if self.armed {
            for signal in &self.signals {
                if let Err(err) = signal.set_bool(false) {
                    log::error!("cannot idle '{}': {err}", signal.name());
                }
            }
        }
    }
}

/// Inserts idle cycles between the words of a transaction.
///
/// Follows an `(on, off)` sequence: after `on` words, `valid` drops for
/// `off` edges. Without a sequence, or once it runs out, every word is sent
/// back to back.
pub struct IdleGate {
    sequence: Option<TimingSequence>,
    on: Option<u32>,
    off: u32,
}

impl IdleGate {
    /// A gate that never inserts idle cycles.
    pub fn always_on() -> Self {
        Self {
            sequence: None,
            on: None,
            off: 0,
        }
    }

    /// A gate following `sequence`.
    pub fn new(sequence: TimingSequence) -> Self {
        let mut gate = Self {
            sequence: Some(sequence),
            on: None,
            off: 0,
        };
        gate.next_pattern();
        gate
    }

    fn next_pattern(&mut self) {
        match self.sequence.as_mut().and_then(Iterator::next) {
            Some((on, off)) => {
                self.on = Some(on);
                self.off = off;
            }
            None => {
                self.sequence = None;
                self.on = None;
                self.off = 0;
            }
        }
    }

    /// Called on the edge where the next word would be driven. Drops
    /// `valid` and waits out idle runs first while the current on-period is
    /// used up, so consecutive `(0, off)` pairs add up. A `(0, 0)` pair ends
    /// the wait.
    pub(crate) async fn before_word(
        &mut self,
        clock: &Clock,
        valid: &SignalRef,
    ) -> Result<(), DriverError> {
        while self.on == Some(0) {
            valid.set_bool(false)?;
            let idle = self.off;
            for _ in 0..idle {
                clock.rising_edge().await?;
            }
            self.next_pattern();
            if idle == 0 {
                break;
            }
        }
        if let Some(on) = self.on.as_mut() {
            *on = on.saturating_sub(1);
        }
        Ok(())
    }
}

impl std::fmt::Debug for IdleGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleGate")
            .field("patterned", &self.sequence.is_some())
            .field("on", &self.on)
            .field("off", &self.off)
            .finish()
    }
}

/// Applies an on/off pattern to a 1-bit control signal from its own task.
pub struct BitDriver {
    signal: SignalRef,
    clock: Clock,
    task: Option<TaskHandle<()>>,
}

impl BitDriver {
    /// Creates a stopped driver for `signal`.
    pub fn new(signal: SignalRef, clock: &Clock) -> Self {
        Self {
            signal,
            clock: clock.clone(),
            task: None,
        }
    }

    /// Starts (or restarts) toggling: high for `on` edges, low for `off`
    /// edges, for each pair of `sequence`. When the sequence ends the
    /// signal is left high.
    pub fn start(&mut self, sequence: TimingSequence) {
        self.stop();
        let signal = self.signal.clone();
        let clock = self.clock.clone();
        let name = format!("bit:{}", signal.name());
        self.task = Some(TaskHandle::spawn(name, async move {
            if let Err(err) = toggle_signal(&signal, &clock, sequence).await {
                log::debug!("'{}' toggling ended: {err}", signal.name());
            }
        }));
    }

    /// Stops toggling, leaving the signal at its current level.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }

    /// True while a pattern is being applied.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

async fn toggle_signal(
    signal: &SignalRef,
    clock: &Clock,
    sequence: TimingSequence,
) -> Result<(), DriverError> {
    for (on, off) in sequence {
        signal.set_bool(true)?;
        for _ in 0..on {
            clock.rising_edge().await?;
        }
        signal.set_bool(false)?;
        for _ in 0..off {
            clock.rising_edge().await?;
        }
    }
    signal.set_bool(true)?;
    Ok(())
}
