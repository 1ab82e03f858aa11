//! Per-stream serial execution context.
//!
//! Every callback-driven state transition of a stream runs as a task on its
//! [`SerialContext`]. The first thread to submit while the context is idle
//! drains the queue; any submission made while a task is running (from the
//! task itself, from an inline remote call, or from another thread) is
//! appended and runs after the current task. Tasks never nest, so locks
//! taken inside a task are never re-entered.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::warn;

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Inner {
    queue: VecDeque<Task>,
    draining: bool,
}

/// A trampolining single-consumer task queue.
#[derive(Default)]
pub(crate) struct SerialContext {
    inner: Mutex<Inner>,
}

impl SerialContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after every task submitted before it.
    ///
    /// Returns once the queue is drained when the caller became the drainer,
    /// or immediately when another drain is in progress.
    pub(crate) fn execute(&self, task: impl FnOnce() + Send + 'static) {
        {
            let mut inner = self.inner.lock();
            inner.queue.push_back(Box::new(task));
            if inner.draining {
                return;
            }
            inner.draining = true;
        }

        let _guard = DrainGuard(&self.inner);
        loop {
            let next = {
                let mut inner = self.inner.lock();
                match inner.queue.pop_front() {
                    Some(task) => task,
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };
            next();
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

/// Releases the drainer role when a task unwinds, so later submissions
/// drain again instead of queueing forever.
struct DrainGuard<'a>(&'a Mutex<Inner>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut inner = self.0.lock();
            inner.draining = false;
            warn!(pending = inner.queue.len(), "serial task panicked");
        }
    }
}
