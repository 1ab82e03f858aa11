//! Streams over all-or-nothing collection callbacks.

use super::{launch, OperationControl};
use crate::config::Priority;
use crate::downstream::Downstream;
use crate::error::FlowResult;
use crate::handle::OperationHandle;
use crate::queue::OperationQueue;
use crate::remote::{BatchCallback, RemoteOperation};
use crate::stream::{Emission, Publisher, Subscriber, Subscription};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// A collection a batch callback can report.
///
/// The adapter only needs the items; keys and extra metadata are dropped.
pub trait BatchItems: Send + 'static {
    /// Item type.
    type Item: Send + 'static;

    /// Projects the collection onto its items.
    fn into_items(self) -> Vec<Self::Item>;
}

impl<T: Send + 'static> BatchItems for Vec<T> {
    type Item = T;

    fn into_items(self) -> Vec<T> {
        self
    }
}

impl<K, T, S> BatchItems for HashMap<K, T, S>
where
    K: Send + 'static,
    T: Send + 'static,
    S: Send + 'static,
{
    type Item = T;

    fn into_items(self) -> Vec<T> {
        self.into_values().collect()
    }
}

impl<T, M> BatchItems for (Vec<T>, M)
where
    T: Send + 'static,
    M: Send + 'static,
{
    type Item = T;

    fn into_items(self) -> Vec<T> {
        self.0
    }
}

type MakeBatch<C> = dyn Fn(BatchCallback<C>) -> Arc<dyn RemoteOperation> + Send + Sync;

/// A stream emitting every item of a collection callback, then
/// `BatchComplete`; or only `BatchFailed`.
///
/// Mapping-shaped collections have no defined order, so neither do their
/// emissions.
pub struct BatchResult<K, C: BatchItems> {
    label: &'static str,
    priority: Priority,
    queue: Arc<dyn OperationQueue>,
    make: Arc<MakeBatch<C>>,
    _key: PhantomData<fn() -> K>,
}

impl<K, C> BatchResult<K, C>
where
    K: Send + 'static,
    C: BatchItems,
{
    /// Creates a stream over the call built by `make`.
    pub fn new(
        label: &'static str,
        priority: Priority,
        queue: Arc<dyn OperationQueue>,
        make: impl Fn(BatchCallback<C>) -> Arc<dyn RemoteOperation> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label,
            priority,
            queue,
            make: Arc::new(make),
            _key: PhantomData,
        }
    }
}

impl<K, C> Publisher for BatchResult<K, C>
where
    K: Send + 'static,
    C: BatchItems,
{
    type Key = K;
    type Item = C::Item;

    fn subscribe<S>(&self, subscriber: S) -> Subscription
    where
        S: Subscriber<K, C::Item> + 'static,
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
            make(Box::new(move |outcome: FlowResult<C>| {
                finished.finish(outcome.is_ok());
                let target = Arc::clone(&ds);
                ds.execute(move || match outcome {
                    Ok(collection) => {
                        let items = collection.into_items();
                        trace!(count = items.len(), "batch delivered");
                        for item in items {
                            target.deliver(Emission::ItemResult(item));
                        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::Recorder;
    use crate::error::FlowError;
    use crate::queue::InlineQueue;
    use crate::remote::ScriptedOperation;

    fn batch<C>(outcome: FlowResult<C>) -> BatchResult<String, C>
    where
        C: BatchItems + Clone + Sync,
    {
        BatchResult::new(
            "fetch all",
            Priority::UserInitiated,
            Arc::new(InlineQueue),
            move |callback: BatchCallback<C>| {
                let outcome = outcome.clone();
                let operation: Arc<dyn RemoteOperation> =
                    ScriptedOperation::new(move |_| callback(outcome));
                operation
            },
        )
    }

    #[test]
    fn list_items_then_complete() {
        let stream = batch(Ok(vec!["a", "b", "c"]));
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec!["a", "b", "c"]);
        assert!(recorder.is_complete());
        assert_eq!(recorder.terminal_count(), 1);
    }

    #[test]
    fn mapping_emits_every_value() {
        let mut mapping = HashMap::new();
        mapping.insert("k1".to_string(), 1);
        mapping.insert("k2".to_string(), 2);
        let stream = batch(Ok(mapping));
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        let mut items = recorder.items();
        items.sort();
        assert_eq!(items, vec![1, 2]);
        assert!(recorder.is_complete());
    }

    #[test]
    fn list_with_metadata_drops_metadata() {
        let stream = batch(Ok((vec![10, 20], "server change token")));
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());
        assert_eq!(recorder.items(), vec![10, 20]);
    }

    #[test]
    fn empty_collection_completes_immediately() {
        let stream = batch(Ok(Vec::<u8>::new()));
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());
        assert_eq!(recorder.emissions(), vec![Emission::BatchComplete]);
    }

    #[test]
    fn error_emits_no_items() {
        let stream = batch::<Vec<u8>>(Err(FlowError::service_retryable("throttled")));
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(
            recorder.emissions(),
            vec![Emission::BatchFailed(FlowError::service_retryable("throttled"))]
        );
    }
}
