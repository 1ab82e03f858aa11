//! Execution substrates for operation handles.

use crate::handle::OperationHandle;
use std::sync::Arc;
use tracing::debug;

/// Runs submitted operations.
///
/// Implementations decide where `start()` executes; the remote callbacks
/// then fire wherever the remote operation delivers them.
pub trait OperationQueue: Send + Sync + 'static {
    /// Hands an operation to the substrate.
    fn submit(&self, operation: Arc<OperationHandle>);
}

/// Starts operations on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineQueue;

impl InlineQueue {
    /// Creates an inline queue.
    pub fn new() -> Self {
        Self
    }
}

impl OperationQueue for InlineQueue {
    fn submit(&self, operation: Arc<OperationHandle>) {
        operation.start();
    }
}

/// Starts operations on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioQueue {
    runtime: tokio::runtime::Handle,
}

impl TokioQueue {
    /// Creates a queue on the given runtime.
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }

    /// Creates a queue on the runtime the caller is running in.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl OperationQueue for TokioQueue {
    fn submit(&self, operation: Arc<OperationHandle>) {
        debug!(id = operation.id(), "submitting to blocking pool");
        self.runtime.spawn_blocking(move || {
            operation.start();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::OperationState;
    use crate::remote::ScriptedOperation;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn inline_queue_starts_immediately() {
        let handle = OperationHandle::new("inline");
        let remote = ScriptedOperation::new(|_| {});
        handle.attach(remote.clone());

        InlineQueue::new().submit(Arc::clone(&handle));
        assert!(remote.was_started());
        assert_eq!(handle.state(), OperationState::Started);
    }

    #[test]
    fn tokio_queue_starts_on_blocking_pool() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let queue = TokioQueue::new(runtime.handle().clone());

        let (tx, rx) = mpsc::channel();
        let handle = OperationHandle::new("pooled");
        handle.attach(ScriptedOperation::new(move |_| {
            tx.send(std::thread::current().id()).unwrap();
        }));

        queue.submit(handle);
        let thread = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(thread, std::thread::current().id());
    }

    #[test]
    fn current_outside_runtime() {
        assert!(TokioQueue::current().is_none());
    }
}
