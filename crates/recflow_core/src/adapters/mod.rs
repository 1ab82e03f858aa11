//! Adapters from callback-shaped remote calls to streams.
//!
//! Each adapter is a cold [`Publisher`](crate::stream::Publisher): every
//! subscription builds one [`OperationHandle`], wires the remote call's
//! callbacks into the stream's serial context and submits the handle to an
//! [`OperationQueue`].

mod batch;
mod single;
mod tracked;

pub use batch::{BatchItems, BatchResult};
pub use single::SingleResult;
pub use tracked::{FetchStream, ModifyStream, Modified, TrackedStream};

use crate::downstream::Downstream;
use crate::handle::OperationHandle;
use crate::queue::OperationQueue;
use crate::remote::RemoteOperation;
use crate::stream::{Control, Demand};
use std::sync::Arc;
use tracing::{debug, trace};

/// Subscription control for streams backed by one operation handle.
pub(crate) struct OperationControl<K, T> {
    downstream: Arc<Downstream<K, T>>,
    handle: Arc<OperationHandle>,
    forward_cancel: bool,
}

impl<K, T> OperationControl<K, T> {
    pub(crate) fn new(
        downstream: Arc<Downstream<K, T>>,
        handle: Arc<OperationHandle>,
        forward_cancel: bool,
    ) -> Self {
        Self {
            downstream,
            handle,
            forward_cancel,
        }
    }
}

impl<K, T> Control for OperationControl<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    fn request(&self, demand: Demand) {
        trace!(%demand, id = self.handle.id(), "demand ignored by non-paginated stream");
    }

    fn cancel(&self) {
        if !self.downstream.cancel() {
            return;
        }
        if self.forward_cancel {
            self.handle.cancel();
        } else {
            debug!(
                id = self.handle.id(),
                "background operation keeps running after cancellation"
            );
        }
    }

    fn is_cancelled(&self) -> bool {
        self.downstream.is_cancelled()
    }
}

/// Builds the remote operation on the stream's serial context and submits
/// it, unless the consumer cancelled first.
pub(crate) fn launch<K, T>(
    downstream: &Arc<Downstream<K, T>>,
    handle: Arc<OperationHandle>,
    queue: Arc<dyn OperationQueue>,
    build: impl FnOnce() -> Arc<dyn RemoteOperation> + Send + 'static,
) where
    K: Send + 'static,
    T: Send + 'static,
{
    let ds = Arc::clone(downstream);
    downstream.execute(move || {
        if !ds.is_active() {
            debug!(id = handle.id(), "stream cancelled before submission");
            return;
        }
        handle.attach(build());
        queue.submit(handle);
    });
}
