//! One-shot streams over single-result calls.

use super::{launch, OperationControl};
use crate::config::Priority;
use crate::downstream::Downstream;
use crate::error::FlowResult;
use crate::handle::OperationHandle;
use crate::queue::OperationQueue;
use crate::remote::{RemoteOperation, SingleCallback};
use crate::stream::{Emission, Publisher, Subscriber, Subscription};
use std::sync::Arc;

type MakeSingle<T> = dyn Fn(SingleCallback<T>) -> Arc<dyn RemoteOperation> + Send + Sync;

/// A stream producing exactly one item then `BatchComplete`, or
/// `BatchFailed`.
///
/// Each subscription issues the call again. With
/// [`Priority::Background`] the cancellation hook stops emissions but never
/// reaches the remote call.
pub struct SingleResult<T> {
    label: &'static str,
    priority: Priority,
    queue: Arc<dyn OperationQueue>,
    make: Arc<MakeSingle<T>>,
}

impl<T: Send + 'static> SingleResult<T> {
    /// Creates a stream over the call built by `make`.
    pub fn new(
        label: &'static str,
        priority: Priority,
        queue: Arc<dyn OperationQueue>,
        make: impl Fn(SingleCallback<T>) -> Arc<dyn RemoteOperation> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label,
            priority,
            queue,
            make: Arc::new(make),
        }
    }

    /// Returns the priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl<T: Send + 'static> Publisher for SingleResult<T> {
    type Key = ();
    type Item = T;

    fn subscribe<S>(&self, subscriber: S) -> Subscription
    where
        S: Subscriber<(), T> + 'static,
    {
        let downstream = Downstream::new(subscriber);
        let handle = OperationHandle::new(self.label);
        let control = OperationControl::new(
            Arc::clone(&downstream),
            Arc::clone(&handle),
            self.priority.forwards_cancellation(),
        );

        let make = Arc::clone(&self.make);
        let ds = Arc::clone(&downstream);
        let finished = Arc::clone(&handle);
        launch(&downstream, handle, Arc::clone(&self.queue), move || {
            make(Box::new(move |outcome: FlowResult<T>| {
                finished.finish(outcome.is_ok());
                let target = Arc::clone(&ds);
                ds.execute(move || match outcome {
                    Ok(value) => {
                        target.deliver(Emission::ItemResult(value));
                        target.deliver(Emission::BatchComplete);
                    }
                    Err(error) => {
                        target.deliver(Emission::BatchFailed(error));
                    }
                });
            }))
        });

        Subscription::new(Arc::new(control))
    }
}
