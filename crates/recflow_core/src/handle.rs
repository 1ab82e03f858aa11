//! Cancellable operation handles.
//!
//! An [`OperationHandle`] wraps one in-flight [`RemoteOperation`] and owns
//! its lifecycle:
//!
//! ```text
//! Created ──start──▶ Started ──callback──▶ Completed | Failed
//!    │                  │
//!    └──────cancel──────┴──────────────────▶ Cancelled
//! ```
//!
//! `cancel()` reaches the remote call at most once and is a no-op once the
//! handle is terminal.

use crate::remote::RemoteOperation;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of an operation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Built but not yet submitted.
    Created,
    /// Submitted and running remotely.
    Started,
    /// Finished successfully.
    Completed,
    /// Cancelled before finishing.
    Cancelled,
    /// Finished with an error.
    Failed,
}

impl OperationState {
    /// Returns true for `Completed`, `Cancelled` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Cancelled | OperationState::Failed
        )
    }
}

/// Handle over one remote, cancellable unit of work.
pub struct OperationHandle {
    id: u64,
    label: &'static str,
    state: Mutex<OperationState>,
    remote: OnceLock<Arc<dyn RemoteOperation>>,
}

impl OperationHandle {
    /// Creates a handle with no remote operation attached yet.
    ///
    /// Adapters build the handle first so the callbacks wired into the
    /// remote operation can report completion back to it.
    pub fn new(label: &'static str) -> Arc<Self> {
        let handle = Arc::new(Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            label,
            state: Mutex::new(OperationState::Created),
            remote: OnceLock::new(),
        });
        debug!(id = handle.id, label, "operation created");
        handle
    }

    /// Attaches the remote operation. Only the first call has an effect.
    pub fn attach(&self, remote: Arc<dyn RemoteOperation>) {
        if self.remote.set(remote).is_err() {
            debug!(id = self.id, "remote operation already attached");
        }
    }

    /// Returns the process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the label used in logs.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Returns the current state.
    pub fn state(&self) -> OperationState {
        *self.state.lock()
    }

    /// Starts the remote operation.
    ///
    /// Returns false if the handle was not in `Created` or has nothing
    /// attached.
    pub fn start(&self) -> bool {
        let Some(remote) = self.remote.get() else {
            debug!(id = self.id, "start without a remote operation");
            return false;
        };
        {
            let mut state = self.state.lock();
            if *state != OperationState::Created {
                trace!(id = self.id, state = ?*state, "start ignored");
                return false;
            }
            *state = OperationState::Started;
        }
        debug!(id = self.id, label = self.label, "operation started");
        remote.start();
        true
    }

    /// Cancels the operation.
    ///
    /// Forwards to the remote call the first time it runs on a non-terminal
    /// handle; otherwise does nothing. Returns true if it forwarded.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                trace!(id = self.id, state = ?*state, "cancel ignored");
                return false;
            }
            *state = OperationState::Cancelled;
        }
        debug!(id = self.id, label = self.label, "operation cancelled");
        if let Some(remote) = self.remote.get() {
            remote.cancel();
        }
        true
    }

    /// Records the outcome reported by the remote callback.
    ///
    /// Only a `Started` handle moves; a cancelled handle stays cancelled.
    pub fn finish(&self, success: bool) {
        let mut state = self.state.lock();
        if *state == OperationState::Started {
            *state = if success {
                OperationState::Completed
            } else {
                OperationState::Failed
            };
            trace!(id = self.id, state = ?*state, "operation finished");
        }
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ScriptedOperation;

    fn attached(label: &'static str) -> (Arc<OperationHandle>, Arc<ScriptedOperation>) {
        let handle = OperationHandle::new(label);
        let remote = ScriptedOperation::new(|_| {});
        handle.attach(remote.clone());
        (handle, remote)
    }

    #[test]
    fn lifecycle_success() {
        let (handle, remote) = attached("fetch");
        assert_eq!(handle.state(), OperationState::Created);
        assert!(handle.start());
        assert_eq!(handle.state(), OperationState::Started);
        assert!(remote.was_started());
        handle.finish(true);
        assert_eq!(handle.state(), OperationState::Completed);
    }

    #[test]
    fn start_only_once() {
        let (handle, _remote) = attached("fetch");
        assert!(handle.start());
        assert!(!handle.start());
    }

    #[test]
    fn start_requires_remote() {
        let handle = OperationHandle::new("empty");
        assert!(!handle.start());
        assert_eq!(handle.state(), OperationState::Created);
    }

    #[test]
    fn cancel_forwards_once() {
        let (handle, remote) = attached("query");
        handle.start();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(remote.cancellations(), 1);
        assert_eq!(handle.state(), OperationState::Cancelled);

        handle.finish(true);
        assert_eq!(handle.state(), OperationState::Cancelled);
    }

    #[test]
    fn cancel_after_completion_is_noop() {
        let (handle, remote) = attached("save");
        handle.start();
        handle.finish(false);
        assert_eq!(handle.state(), OperationState::Failed);
        assert!(!handle.cancel());
        assert_eq!(remote.cancellations(), 0);
    }

    #[test]
    fn cancel_before_start_prevents_start() {
        let (handle, remote) = attached("save");
        assert!(handle.cancel());
        assert!(!handle.start());
        assert!(!remote.was_started());
    }

    #[test]
    fn ids_are_unique() {
        let a = OperationHandle::new("a");
        let b = OperationHandle::new("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.label(), "a");
    }
}
