//! Owned handles to spawned engine tasks.

use std::future::Future;

use tokio::task::{AbortHandle, JoinError, JoinHandle};

/// A named, cancellable background task.
///
/// Dropping the handle aborts the task, so a monitor or driver never
/// outlives the object that started it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    join: Option<JoinHandle<T>>,
    abort: AbortHandle,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Spawns `future` on the current runtime.
    pub fn spawn<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let name = name.into();
        log::trace!("spawning task '{name}'");
        let join = tokio::spawn(future);
        let abort = join.abort_handle();
        Self {
            name,
            join: Some(join),
            abort,
        }
    }
}

impl<T> TaskHandle<T> {
    /// Task name, used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the task at its next suspension point. Calling this more than
    /// once is harmless.
    pub fn cancel(&self) {
        if !self.abort.is_finished() {
            log::trace!("cancelling task '{}'", self.name);
        }
        self.abort.abort();
    }

    /// True once the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// Waits for the task to finish and returns its output.
    ///
    /// Returns `None` if the task was cancelled or already joined.
    pub async fn join(&mut self) -> Option<T> {
        let handle = self.join.take()?;
        match handle.await {
            Ok(value) => Some(value),
            Err(err) => {
                report_join_error(&self.name, err);
                None
            }
        }
    }
}

fn report_join_error(name: &str, err: JoinError) {
    if err.is_panic() {
        log::error!("task '{name}' panicked");
    } else {
        log::trace!("task '{name}' was cancelled");
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        self.abort.abort();
    }
}
