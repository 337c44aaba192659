//! Checking observed transactions against expected ones.
//!
//! Each monitored interface is paired with a queue of expected
//! transactions. Every transaction the monitor dispatches is compared with
//! the front of its queue (or, with a reorder window, one of the first few
//! entries). Interfaces are independent: ordering only matters within one.
//! Every registration gets its own [`InterfaceId`], so two monitors that
//! share a name still keep separate queues.

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex};

use tempo_config::{FailurePolicy, ScoreboardConfig};
use tempo_sim::lock;
use tokio::sync::watch;

use crate::monitor::Monitor;

/// Expected transactions for one interface, shared with the test.
pub type ExpectedQueue<T> = Arc<Mutex<VecDeque<T>>>;

/// Creates an expected queue holding `items`.
pub fn expected_queue<T>(items: impl IntoIterator<Item = T>) -> ExpectedQueue<T> {
    Arc::new(Mutex::new(items.into_iter().collect()))
}

/// Handle of one registered interface, returned by
/// [`Scoreboard::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(usize);

/// One failed comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch<T> {
    /// The observed transaction differs from the expected one.
    Different {
        /// The interface it arrived on.
        interface: String,
        /// What the queue held.
        expected: T,
        /// What the monitor saw.
        observed: T,
    },
    /// A transaction arrived while the expected queue was empty.
    Unexpected {
        /// The interface it arrived on.
        interface: String,
        /// What the monitor saw.
        observed: T,
    },
}

impl<T: Debug> fmt::Display for Mismatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Different {
                interface,
                expected,
                observed,
            } => write!(f, "{interface}: expected {expected:?}, observed {observed:?}"),
            Mismatch::Unexpected {
                interface,
                observed,
            } => write!(f, "{interface}: unexpected {observed:?}"),
        }
    }
}

/// Expected transactions still queued at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leftover {
    /// The interface name.
    pub interface: String,
    /// The transactions that never arrived, formatted.
    pub remaining: Vec<String>,
}

/// A passing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Transactions that matched.
    pub matched: usize,
    /// Interfaces checked.
    pub interfaces: usize,
}

/// A failing verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", describe(.mismatches, .leftovers))]
pub struct ScoreboardFailure {
    /// Recorded mismatches, formatted, oldest first.
    pub mismatches: Vec<String>,
    /// Interfaces with expected transactions left over.
    pub leftovers: Vec<Leftover>,
}

fn describe(mismatches: &[String], leftovers: &[Leftover]) -> String {
    let mut lines = Vec::new();
    if !mismatches.is_empty() {
        lines.push(format!("{} mismatch(es):", mismatches.len()));
        lines.extend(mismatches.iter().map(|m| format!("  {m}")));
    }
    for leftover in leftovers {
        lines.push(format!(
            "{}: {} expected transaction(s) never arrived:",
            leftover.interface,
            leftover.remaining.len()
        ));
        lines.extend(leftover.remaining.iter().map(|r| format!("  {r}")));
    }
    lines.join("\n")
}

struct Registration<T> {
    name: String,
    queue: ExpectedQueue<T>,
}

struct Board<T> {
    policy: FailurePolicy,
    reorder_depth: usize,
    interfaces: Vec<Registration<T>>,
    matched: usize,
    mismatches: Vec<Mismatch<T>>,
}

struct Inner<T> {
    board: Mutex<Board<T>>,
    failed: watch::Sender<bool>,
}

/// Compares monitored transactions with per-interface expectations.
pub struct Scoreboard<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Scoreboard<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Scoreboard<T>
where
    T: PartialEq + Debug + Clone + Send + 'static,
{
    /// Creates a scoreboard. A `reorder_depth` of zero matches strictly in
    /// order.
    pub fn new(policy: FailurePolicy, reorder_depth: usize) -> Self {
        let (failed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                board: Mutex::new(Board {
                    policy,
                    reorder_depth,
                    interfaces: Vec::new(),
                    matched: 0,
                    mismatches: Vec::new(),
                }),
                failed,
            }),
        }
    }

    /// Creates a scoreboard from the `[scoreboard]` configuration section.
    pub fn from_config(config: &ScoreboardConfig) -> Self {
        Self::new(config.policy, config.reorder_depth)
    }

    /// Checks every transaction `monitor` dispatches against `expected`.
    ///
    /// This registers a callback, so the monitor stops queueing.
    pub fn add_interface(&self, monitor: &Monitor<T>, expected: ExpectedQueue<T>) -> InterfaceId {
        let id = self.register(monitor.name(), expected);
        let scoreboard = self.clone();
        monitor.add_callback(move |observed| {
            scoreboard.compare(id, observed);
        });
        id
    }

    /// Tracks `expected` without attaching a monitor; feed it with
    /// [`Scoreboard::compare`]. `name` is only used in diagnostics.
    pub fn register(&self, name: &str, expected: ExpectedQueue<T>) -> InterfaceId {
        let mut board = lock(&self.inner.board);
        if board.interfaces.iter().any(|r| r.name == name) {
            log::warn!("scoreboard: interface name '{name}' registered more than once");
        }
        log::debug!("scoreboard: checking interface '{name}'");
        board.interfaces.push(Registration {
            name: name.to_string(),
            queue: expected,
        });
        InterfaceId(board.interfaces.len() - 1)
    }

    /// Compares one observed transaction on `id`. Returns whether it matched.
    pub fn compare(&self, id: InterfaceId, observed: &T) -> bool {
        let mut board = lock(&self.inner.board);
        let Some(registration) = board.interfaces.get(id.0) else {
            log::error!("scoreboard: transaction on unregistered interface {id:?}");
            return false;
        };
        let interface = registration.name.clone();
        let queue = registration.queue.clone();
        let mismatch = {
            let mut queue = lock(&queue);
            let window = queue.len().min(board.reorder_depth + 1);
            match queue.iter().take(window).position(|e| e == observed) {
                Some(index) => {
                    queue.remove(index);
                    None
                }
                None => match queue.pop_front() {
                    Some(expected) => Some(Mismatch::Different {
                        interface: interface.clone(),
                        expected,
                        observed: observed.clone(),
                    }),
                    None => Some(Mismatch::Unexpected {
                        interface: interface.clone(),
                        observed: observed.clone(),
                    }),
                },
            }
        };

        let Some(mismatch) = mismatch else {
            board.matched += 1;
            log::debug!("{interface}: received expected transaction");
            return true;
        };
        log::error!("{mismatch}");
        let frozen = board.policy == FailurePolicy::FailImmediately && !board.mismatches.is_empty();
        if !frozen {
            board.mismatches.push(mismatch);
        }
        if board.policy == FailurePolicy::FailImmediately {
            self.inner.failed.send_replace(true);
        }
        false
    }

    /// Waits for the first mismatch under [`FailurePolicy::FailImmediately`].
    /// Never resolves under [`FailurePolicy::CollectAll`].
    pub async fn failed(&self) {
        let mut failed = self.inner.failed.subscribe();
        let _ = failed.wait_for(|failed| *failed).await;
    }

    /// Expected transactions still queued across all interfaces.
    pub fn expected_count(&self) -> usize {
        lock(&self.inner.board)
            .interfaces
            .iter()
            .map(|r| lock(&r.queue).len())
            .sum()
    }

    /// Transactions that matched so far.
    pub fn matched_count(&self) -> usize {
        lock(&self.inner.board).matched
    }

    /// Mismatches recorded so far.
    pub fn mismatch_count(&self) -> usize {
        lock(&self.inner.board).mismatches.len()
    }

    /// The recorded mismatches, oldest first.
    pub fn mismatches(&self) -> Vec<Mismatch<T>> {
        lock(&self.inner.board).mismatches.clone()
    }

    /// The verdict: success only if nothing mismatched and every expected
    /// queue is empty.
    pub fn result(&self) -> Result<Summary, ScoreboardFailure> {
        let board = lock(&self.inner.board);
        let leftovers: Vec<Leftover> = board
            .interfaces
            .iter()
            .filter_map(|registration| {
                let queue = lock(&registration.queue);
                (!queue.is_empty()).then(|| Leftover {
                    interface: registration.name.clone(),
                    remaining: queue.iter().map(|t| format!("{t:?}")).collect(),
                })
            })
            .collect();
        if board.mismatches.is_empty() && leftovers.is_empty() {
            return Ok(Summary {
                matched: board.matched,
                interfaces: board.interfaces.len(),
            });
        }
        Err(ScoreboardFailure {
            mismatches: board.mismatches.iter().map(ToString::to_string).collect(),
            leftovers,
        })
    }
}
