//! Passive transaction capture and dispatch.
//!
//! A [`Monitor`] owns one capture task. The protocol-specific part is a
//! [`Capture`] implementation: it watches the bus and hands every completed
//! transaction to its [`Dispatch`] handle. The monitor decides where the
//! transaction goes.
//!
//! # Dispatch policy
//!
//! Transactions go to the registered callbacks, in registration order, if
//! there is at least one. Otherwise they are appended to an unbounded
//! internal queue that can be read with [`Monitor::get`] and
//! [`Monitor::pop_front`]. The two paths are exclusive: registering a
//! callback later does not replay transactions that were already queued.
//!
//! Independently of that choice, every transaction is handed to each
//! pending [`Monitor::wait_for_next`] call and published on the optional
//! event sink given at construction. Once [`Monitor::stop`] has been called,
//! even by an earlier callback for the same transaction, nothing further is
//! delivered.

use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex};

use tempo_sim::{lock, SimTime, TaskHandle};
use tokio::sync::{broadcast, oneshot, watch};

use crate::error::MonitorError;

/// A dispatch target.
pub type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Protocol-specific capture logic run by a [`Monitor`].
pub trait Capture: Send + 'static {
    /// The transaction type this capture produces.
    type Item: Clone + Send + 'static;

    /// Watches the bus until it fails, handing each transaction to
    /// `dispatch`. Returning `Ok` ends the capture normally.
    fn run(
        self,
        dispatch: Dispatch<Self::Item>,
    ) -> impl Future<Output = Result<(), MonitorError>> + Send;
}

struct Shared<T> {
    name: String,
    state: Mutex<State<T>>,
    events: Option<broadcast::Sender<T>>,
    done: watch::Sender<bool>,
}

struct State<T> {
    callbacks: Vec<Callback<T>>,
    queue: VecDeque<T>,
    waiters: Vec<oneshot::Sender<T>>,
    received: u64,
    stopped: bool,
    failure: Option<MonitorError>,
}

/// Handle a [`Capture`] uses to deliver transactions.
pub struct Dispatch<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Dispatch<T> {
    /// Name of the monitor, for log messages.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Delivers one transaction according to the dispatch policy.
    pub fn send(&self, item: T) {
        let taken = {
            let mut state = lock(&self.shared.state);
            if state.stopped {
                return;
            }
            state.received += 1;
            if state.callbacks.is_empty() {
                state.queue.push_back(item.clone());
                None
            } else {
                Some(mem::take(&mut state.callbacks))
            }
        };
        // Callbacks run without the lock so they may query or stop the
        // monitor.
        if let Some(mut callbacks) = taken {
            for callback in callbacks.iter_mut() {
                callback(&item);
                if self.stopped() {
                    break;
                }
            }
            let mut state = lock(&self.shared.state);
            let added = mem::replace(&mut state.callbacks, callbacks);
            state.callbacks.extend(added);
        }
        let waiters = {
            let mut state = lock(&self.shared.state);
            if state.stopped {
                return;
            }
            mem::take(&mut state.waiters)
        };
        if let Some(events) = &self.shared.events {
            let _ = events.send(item.clone());
        }
        for waiter in waiters {
            let _ = waiter.send(item.clone());
        }
    }

    fn stopped(&self) -> bool {
        lock(&self.shared.state).stopped
    }
}

/// Options for starting a [`Monitor`].
pub struct MonitorBuilder<T> {
    name: String,
    callbacks: Vec<Callback<T>>,
    events: Option<broadcast::Sender<T>>,
}

impl<T: Clone + Send + 'static> MonitorBuilder<T> {
    /// Registers an initial callback.
    pub fn callback(mut self, callback: impl FnMut(&T) + Send + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Publishes every transaction on `sink` as well.
    pub fn events(mut self, sink: broadcast::Sender<T>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Starts the capture task. Observation begins immediately.
    pub fn spawn<C: Capture<Item = T>>(self, capture: C) -> Monitor<T> {
        let (done, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            name: self.name,
            state: Mutex::new(State {
                callbacks: self.callbacks,
                queue: VecDeque::new(),
                waiters: Vec::new(),
                received: 0,
                stopped: false,
                failure: None,
            }),
            events: self.events,
            done,
        });
        let dispatch = Dispatch {
            shared: shared.clone(),
        };
        let task_shared = shared.clone();
        let task = TaskHandle::spawn(format!("monitor:{}", shared.name), async move {
            let outcome = capture.run(dispatch).await;
            if let Err(err) = outcome {
                log::error!("{err}");
                lock(&task_shared.state).failure = Some(err);
            }
            task_shared.done.send_replace(true);
        });
        log::debug!("started monitor '{}'", shared.name);
        Monitor { shared, task }
    }
}

/// A running passive observer of one interface.
pub struct Monitor<T> {
    shared: Arc<Shared<T>>,
    task: TaskHandle<()>,
}

impl<T: Clone + Send + 'static> Monitor<T> {
    /// Starts describing a monitor named `name`.
    pub fn builder(name: impl Into<String>) -> MonitorBuilder<T> {
        MonitorBuilder {
            name: name.into(),
            callbacks: Vec::new(),
            events: None,
        }
    }

    /// Starts a monitor with no callbacks, so transactions are queued.
    pub fn spawn<C: Capture<Item = T>>(name: impl Into<String>, capture: C) -> Self {
        Self::builder(name).spawn(capture)
    }

    /// The monitor name (usually the bus prefix).
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Registers another callback, called after the existing ones.
    pub fn add_callback(&self, callback: impl FnMut(&T) + Send + 'static) {
        log::debug!("adding callback to monitor '{}'", self.shared.name);
        lock(&self.shared.state).callbacks.push(Box::new(callback));
    }

    /// Waits for the next dispatched transaction.
    ///
    /// The waiter is registered when this is called, so the result is the
    /// first transaction dispatched after that point however many follow
    /// before the caller is polled again. With a timeout, returns `None` if
    /// nothing was dispatched by the end of the final step. A transaction
    /// dispatched in that step is returned.
    pub async fn wait_for_next(&self, timeout: Option<SimTime>) -> Option<T> {
        let (waiter, arrival) = oneshot::channel();
        {
            let mut state = lock(&self.shared.state);
            state.waiters.retain(|w| !w.is_closed());
            state.waiters.push(waiter);
        }
        let next = async move {
            match arrival.await {
                Ok(item) => Some(item),
                Err(_) => std::future::pending().await,
            }
        };
        match timeout {
            None => next.await,
            Some(span) => tokio::time::timeout(span.to_settled_duration(), next)
                .await
                .ok()
                .flatten(),
        }
    }

    /// Stops the capture task. No transaction is dispatched afterwards, and
    /// `wait_for_next` calls without a timeout never return. Safe to call
    /// repeatedly and from inside a callback.
    pub fn stop(&self) {
        {
            let mut state = lock(&self.shared.state);
            if !state.stopped {
                log::debug!("stopping monitor '{}'", self.shared.name);
            }
            state.stopped = true;
        }
        self.task.cancel();
        self.shared.done.send_replace(true);
    }

    /// Number of transactions dispatched so far.
    pub fn received_count(&self) -> u64 {
        lock(&self.shared.state).received
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        lock(&self.shared.state).queue.len()
    }

    /// True if no transactions are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the queued transaction at `index` (0 = oldest).
    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.shared.state).queue.get(index).cloned()
    }

    /// Removes and returns the oldest queued transaction.
    pub fn pop_front(&self) -> Option<T> {
        lock(&self.shared.state).queue.pop_front()
    }

    /// The error that ended the capture task, if any.
    pub fn failure(&self) -> Option<MonitorError> {
        lock(&self.shared.state).failure.clone()
    }

    /// Waits until the capture task has ended, by failure, normal return or
    /// [`Monitor::stop`].
    pub async fn finished(&self) {
        let mut done = self.shared.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PacketSnapshot, ProtocolError};
    use tokio::sync::mpsc;

    /// Replays items from a channel, failing on `None`.
    struct Replay(mpsc::UnboundedReceiver<Option<u32>>);

    impl Capture for Replay {
        type Item = u32;

        async fn run(mut self, dispatch: Dispatch<u32>) -> Result<(), MonitorError> {
            while let Some(item) = self.0.recv().await {
                match item {
                    Some(value) => dispatch.send(value),
                    None => {
                        return Err(MonitorError::Protocol {
                            interface: dispatch.name().to_string(),
                            state: PacketSnapshot::default(),
                            source: ProtocolError::DataOutsidePacket,
                        })
                    }
                }
            }
            Ok(())
        }
    }

    fn replay() -> (mpsc::UnboundedSender<Option<u32>>, Replay) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Replay(rx))
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn queues_without_callbacks() {
        let (tx, capture) = replay();
        let monitor = Monitor::spawn("q", capture);
        tx.send(Some(1)).unwrap();
        tx.send(Some(2)).unwrap();
        settle().await;
        assert_eq!(monitor.len(), 2);
        assert_eq!(monitor.get(1), Some(2));
        assert_eq!(monitor.pop_front(), Some(1));
        assert_eq!(monitor.received_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_replace_queue_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (seen.clone(), seen.clone());
        let (tx, capture) = replay();
        let monitor = Monitor::builder("cb")
            .callback(move |v: &u32| first.lock().unwrap().push(("a", *v)))
            .spawn(capture);
        monitor.add_callback(move |v: &u32| second.lock().unwrap().push(("b", *v)));
        tx.send(Some(7)).unwrap();
        settle().await;
        assert!(monitor.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7)]);
        assert_eq!(monitor.received_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_callback_does_not_replay_queue() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (tx, capture) = replay();
        let monitor = Monitor::spawn("late", capture);
        tx.send(Some(1)).unwrap();
        settle().await;
        monitor.add_callback(move |v: &u32| sink.lock().unwrap().push(*v));
        tx.send(Some(2)).unwrap();
        settle().await;
        assert_eq!(monitor.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_next_returns_arrival() {
        let (tx, capture) = replay();
        let monitor = Monitor::spawn("w", capture);
        tokio::spawn(async move {
            tokio::time::sleep(SimTime::from_steps(3).to_duration()).await;
            tx.send(Some(5)).unwrap();
            std::future::pending::<()>().await;
        });
        assert_eq!(monitor.wait_for_next(Some(SimTime::from_steps(10))).await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_next_times_out() {
        let (_tx, capture) = replay();
        let monitor = Monitor::spawn("t", capture);
        let start = tokio::time::Instant::now();
        assert_eq!(monitor.wait_for_next(Some(SimTime::from_steps(4))).await, None);
        assert_eq!(
            SimTime::from_duration(start.elapsed()),
            SimTime::from_steps(4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn arrival_at_deadline_wins() {
        let (tx, capture) = replay();
        let monitor = Monitor::spawn("edge", capture);
        tokio::spawn(async move {
            tokio::time::sleep(SimTime::from_steps(4).to_duration()).await;
            tokio::task::yield_now().await;
            tx.send(Some(9)).unwrap();
            std::future::pending::<()>().await;
        });
        assert_eq!(monitor.wait_for_next(Some(SimTime::from_steps(4))).await, Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_without_traffic() {
        let (_tx, capture) = replay();
        let monitor = Monitor::spawn("z", capture);
        assert_eq!(monitor.wait_for_next(Some(SimTime::ZERO)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_dispatch() {
        let (tx, capture) = replay();
        let monitor = Monitor::spawn("s", capture);
        monitor.stop();
        monitor.stop();
        let _ = tx.send(Some(1));
        settle().await;
        assert_eq!(monitor.received_count(), 0);
        assert_eq!(monitor.wait_for_next(Some(SimTime::from_steps(5))).await, None);
        monitor.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_from_a_callback_ends_delivery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<std::sync::OnceLock<Arc<Monitor<u32>>>> = Arc::default();
        let (first, second) = (seen.clone(), seen.clone());
        let handle = slot.clone();
        let (sink, mut events) = broadcast::channel(8);
        let (tx, capture) = replay();
        let monitor = Arc::new(
            Monitor::builder("halt")
                .callback(move |v: &u32| {
                    first.lock().unwrap().push(("a", *v));
                    if let Some(monitor) = handle.get() {
                        monitor.stop();
                    }
                })
                .callback(move |v: &u32| second.lock().unwrap().push(("b", *v)))
                .events(sink)
                .spawn(capture),
        );
        let _ = slot.set(monitor.clone());

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_next(Some(SimTime::from_steps(10))).await })
        };
        settle().await;
        tx.send(Some(5)).unwrap();
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![("a", 5)]);
        assert_eq!(waiter.await.unwrap(), None);
        assert!(events.try_recv().is_err());
        monitor.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_next_sees_the_first_of_a_burst() {
        let (tx, capture) = replay();
        let monitor = Arc::new(Monitor::builder("burst").callback(|_: &u32| {}).spawn(capture));
        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_next(None).await })
        };
        settle().await;
        for value in 0..200 {
            tx.send(Some(value)).unwrap();
        }
        assert_eq!(waiter.await.unwrap(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_recorded() {
        let (tx, capture) = replay();
        let monitor = Monitor::spawn("f", capture);
        tx.send(None).unwrap();
        monitor.finished().await;
        let failure = monitor.failure().unwrap();
        assert_eq!(failure.protocol(), Some(&ProtocolError::DataOutsidePacket));
    }

    #[tokio::test(start_paused = true)]
    async fn event_sink_sees_every_transaction() {
        let (sink, mut events) = broadcast::channel(8);
        let (tx, capture) = replay();
        let monitor = Monitor::builder("e")
            .callback(|_: &u32| {})
            .events(sink)
            .spawn(capture);
        tx.send(Some(3)).unwrap();
        assert_eq!(events.recv().await.unwrap(), 3);
        assert_eq!(monitor.received_count(), 1);
    }
}
