//! Streams over calls that report each item separately.
//!
//! The remote call has three callback points: per-item progress, per-item
//! completion, and batch completion. They may fire from any thread and
//! interleave freely; all of them funnel through the stream's serial
//! context, where an [`ItemTracker`] enforces:
//!
//! - progress per item is non-decreasing and never `Complete` (completion is
//!   the item's terminal emission, not a progress value)
//! - exactly one terminal emission per item
//! - in an atomic batch the first item error fails the whole stream

use super::{launch, OperationControl};
use crate::config::{OperationConfig, Priority};
use crate::downstream::Downstream;
use crate::error::FlowResult;
use crate::handle::OperationHandle;
use crate::model::Resource;
use crate::progress::Progress;
use crate::queue::OperationQueue;
use crate::remote::{ItemCallbacks, RemoteOperation};
use crate::stream::{Emission, Publisher, Subscriber, Subscription};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};

/// An item produced by a modify stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modified<T, K> {
    /// A saved resource.
    Saved(T),
    /// The id of a deleted resource.
    Deleted(K),
}

impl<T, K> Modified<T, K> {
    /// Returns the saved resource, if any.
    pub fn saved(&self) -> Option<&T> {
        match self {
            Modified::Saved(item) => Some(item),
            Modified::Deleted(_) => None,
        }
    }

    /// Returns the deleted id, if any.
    pub fn deleted(&self) -> Option<&K> {
        match self {
            Modified::Saved(_) => None,
            Modified::Deleted(id) => Some(id),
        }
    }
}

/// Stream over a modify call: saved resources, then deleted ids.
pub type ModifyStream<R> = TrackedStream<
    <R as Resource>::Id,
    R,
    Vec<<R as Resource>::Id>,
    Modified<R, <R as Resource>::Id>,
>;

/// Stream over a tracked fetch: resources as they arrive.
pub type FetchStream<R> =
    TrackedStream<<R as Resource>::Id, R, HashMap<<R as Resource>::Id, R>, R>;

struct ItemTracker<K> {
    atomic: bool,
    progress: HashMap<K, Progress>,
    finished: HashSet<K>,
}

impl<K: Eq + Hash + Clone + fmt::Debug> ItemTracker<K> {
    fn new(atomic: bool) -> Self {
        Self {
            atomic,
            progress: HashMap::new(),
            finished: HashSet::new(),
        }
    }

    /// Returns the progress to emit, if any.
    fn progress(&mut self, key: &K, fraction: f64) -> Option<Progress> {
        if self.finished.contains(key) {
            return None;
        }
        let progress = Progress::from_percent(fraction * 100.0);
        if progress.is_complete() {
            return None;
        }
        match self.progress.get(key) {
            Some(previous) if progress <= *previous => None,
            _ => {
                self.progress.insert(key.clone(), progress);
                Some(progress)
            }
        }
    }

    /// Returns the emission for one item completion, if any.
    fn finish<T>(&mut self, key: K, outcome: FlowResult<T>) -> Option<Emission<K, T>> {
        if !self.finished.insert(key.clone()) {
            debug!(?key, "duplicate item completion ignored");
            return None;
        }
        self.progress.remove(&key);
        Some(match outcome {
            Ok(item) => Emission::ItemResult(item),
            Err(error) if self.atomic => Emission::BatchFailed(error),
            Err(error) => Emission::ItemError(key, error),
        })
    }
}

type MakeTracked<K, U, B> =
    dyn Fn(ItemCallbacks<K, U, B>) -> Arc<dyn RemoteOperation> + Send + Sync;

/// A stream over a call with per-item progress and completion callbacks.
///
/// `K` keys items, `U` is what the per-item callback reports, `B` is what
/// the batch callback reports and `T` is the emitted item. Per-item results
/// are mapped with `on_item`; the batch result is projected onto trailing
/// items with `on_batch`.
pub struct TrackedStream<K, U, B, T> {
    label: &'static str,
    atomic: bool,
    priority: Priority,
    queue: Arc<dyn OperationQueue>,
    make: Arc<MakeTracked<K, U, B>>,
    on_item: fn(U) -> T,
    on_batch: fn(B) -> Vec<T>,
}

impl<R: Resource> TrackedStream<R::Id, R, Vec<R::Id>, Modified<R, R::Id>> {
    /// Creates a modify stream.
    ///
    /// Saved resources are emitted as they complete; deleted ids are emitted
    /// in the order the batch callback lists them, right before
    /// `BatchComplete`.
    pub fn modify(
        config: &OperationConfig,
        queue: Arc<dyn OperationQueue>,
        make: impl Fn(ItemCallbacks<R::Id, R, Vec<R::Id>>) -> Arc<dyn RemoteOperation>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            label: "modify",
            atomic: config.atomic,
            priority: config.priority,
            queue,
            make: Arc::new(make),
            on_item: Modified::Saved,
            on_batch: |deleted| deleted.into_iter().map(Modified::Deleted).collect(),
        }
    }
}

impl<R: Resource> TrackedStream<R::Id, R, HashMap<R::Id, R>, R> {
    /// Creates a tracked fetch stream.
    ///
    /// Resources are emitted as the per-item callback reports them; the
    /// batch mapping only decides success or failure.
    pub fn fetch(
        config: &OperationConfig,
        queue: Arc<dyn OperationQueue>,
        make: impl Fn(ItemCallbacks<R::Id, R, HashMap<R::Id, R>>) -> Arc<dyn RemoteOperation>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            label: "fetch tracked",
            atomic: config.atomic,
            priority: config.priority,
            queue,
            make: Arc::new(make),
            on_item: |item| item,
            on_batch: |_| Vec::new(),
        }
    }
}

impl<K, U, B, T> TrackedStream<K, U, B, T> {
    /// Returns true if one item error fails the stream.
    pub fn is_atomic(&self) -> bool {
        self.atomic
    }
}

impl<K, U, B, T> Publisher for TrackedStream<K, U, B, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    U: Send + 'static,
    B: Send + 'static,
    T: Send + 'static,
{
    type Key = K;
    type Item = T;

    fn subscribe<S>(&self, subscriber: S) -> Subscription
    where
        S: Subscriber<K, T> + 'static,
    {
        let downstream = Downstream::new(subscriber);
        let handle = OperationHandle::new(self.label);
        let control = OperationControl::new(
            Arc::clone(&downstream),
            Arc::clone(&handle),
            self.priority.forwards_cancellation(),
        );
        let tracker = Arc::new(Mutex::new(ItemTracker::new(self.atomic)));
        let (on_item, on_batch) = (self.on_item, self.on_batch);

        let progress_ds = Arc::clone(&downstream);
        let progress_tracker = Arc::clone(&tracker);
        let progress = move |key: K, fraction: f64| {
            let (ds, tracker) = (Arc::clone(&progress_ds), Arc::clone(&progress_tracker));
            progress_ds.execute(move || {
                if !ds.is_active() {
                    return;
                }
                let update = tracker.lock().progress(&key, fraction);
                match update {
                    Some(progress) => {
                        ds.deliver(Emission::ProgressUpdate(key, progress));
                    }
                    None => trace!(?key, fraction, "progress filtered"),
                }
            });
        };

        let item_ds = Arc::clone(&downstream);
        let item_tracker = Arc::clone(&tracker);
        let item = move |key: K, outcome: FlowResult<U>| {
            let (ds, tracker) = (Arc::clone(&item_ds), Arc::clone(&item_tracker));
            item_ds.execute(move || {
                if !ds.is_active() {
                    return;
                }
                let emission = tracker.lock().finish(key, outcome.map(on_item));
                if let Some(emission) = emission {
                    if emission.is_terminal() {
                        debug!("item failure escalated to atomic batch failure");
                    }
                    ds.deliver(emission);
                }
            });
        };

        let batch_ds = Arc::clone(&downstream);
        let finished = Arc::clone(&handle);
        let batch = move |outcome: FlowResult<B>| {
            finished.finish(outcome.is_ok());
            let ds = Arc::clone(&batch_ds);
            batch_ds.execute(move || match outcome {
                _ if !ds.is_active() => {}
                Ok(trailing) => {
                    for item in on_batch(trailing) {
                        ds.deliver(Emission::ItemResult(item));
                    }
                    ds.deliver(Emission::BatchComplete);
                }
                Err(error) => {
                    ds.deliver(Emission::BatchFailed(error));
                }
            });
        };

        let make = Arc::clone(&self.make);
        launch(&downstream, handle, Arc::clone(&self.queue), move || {
            make(ItemCallbacks {
                progress: Box::new(progress),
                item: Box::new(item),
                batch: Box::new(batch),
            })
        });

        Subscription::new(Arc::new(control))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::Recorder;
    use crate::error::FlowError;
    use crate::model::{Record, RecordId};
    use crate::queue::InlineQueue;
    use crate::remote::{ModifyCallbacks, ScriptedOperation};

    /// One scripted callback invocation.
    #[derive(Clone)]
    enum Step {
        Progress(RecordId, f64),
        Item(RecordId, FlowResult<Record>),
        Batch(FlowResult<Vec<RecordId>>),
    }

    fn scripted(config: OperationConfig, steps: Vec<Step>) -> ModifyStream<Record> {
        ModifyStream::<Record>::modify(
            &config,
            Arc::new(InlineQueue),
            move |callbacks: ModifyCallbacks<Record>| {
                let steps = steps.clone();
                let operation: Arc<dyn RemoteOperation> = ScriptedOperation::new(move |_| {
                    let ItemCallbacks {
                        mut progress,
                        mut item,
                        batch,
                    } = callbacks;
                    let mut batch = Some(batch);
                    for step in steps {
                        match step {
                            Step::Progress(id, fraction) => progress(id, fraction),
                            Step::Item(id, outcome) => item(id, outcome),
                            Step::Batch(outcome) => {
                                if let Some(batch) = batch.take() {
                                    batch(outcome);
                                }
                            }
                        }
                    }
                });
                operation
            },
        )
    }

    fn record() -> Record {
        Record::new("Note")
    }

    #[test]
    fn progress_then_item_then_deleted_then_complete() {
        let saved = record();
        let deleted = [RecordId::new(), RecordId::new()];
        let stream = scripted(
            OperationConfig::new(),
            vec![
                Step::Progress(saved.id, 0.1),
                Step::Progress(saved.id, 0.6),
                Step::Item(saved.id, Ok(saved.clone())),
                Step::Batch(Ok(deleted.to_vec())),
            ],
        );
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(
            recorder.emissions(),
            vec![
                Emission::ProgressUpdate(saved.id, Progress::from_percent(10.0)),
                Emission::ProgressUpdate(saved.id, Progress::from_percent(60.0)),
                Emission::ItemResult(Modified::Saved(saved.clone())),
                Emission::ItemResult(Modified::Deleted(deleted[0])),
                Emission::ItemResult(Modified::Deleted(deleted[1])),
                Emission::BatchComplete,
            ]
        );
        assert_eq!(recorder.final_progress(&saved.id), Progress::Complete);
    }

    #[test]
    fn decreasing_and_complete_progress_is_filtered() {
        let saved = record();
        let stream = scripted(
            OperationConfig::new(),
            vec![
                Step::Progress(saved.id, 0.5),
                Step::Progress(saved.id, 0.3),
                Step::Progress(saved.id, 0.5),
                Step::Progress(saved.id, 1.0),
                Step::Item(saved.id, Ok(saved.clone())),
                Step::Progress(saved.id, 0.9),
                Step::Batch(Ok(vec![])),
            ],
        );
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(
            recorder.progress_for(&saved.id),
            vec![Progress::from_percent(50.0)]
        );
        assert_eq!(recorder.items().len(), 1);
        assert!(recorder.is_complete());
    }

    #[test]
    fn item_error_does_not_fail_non_atomic_batch() {
        let (good, bad) = (record(), record());
        let error = FlowError::item_failed(bad.id, "server record changed");
        let stream = scripted(
            OperationConfig::new(),
            vec![
                Step::Item(good.id, Ok(good.clone())),
                Step::Item(bad.id, Err(error.clone())),
                Step::Batch(Ok(vec![])),
            ],
        );
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(
            recorder.emissions(),
            vec![
                Emission::ItemResult(Modified::Saved(good)),
                Emission::ItemError(bad.id, error),
                Emission::BatchComplete,
            ]
        );
    }

    #[test]
    fn atomic_item_error_fails_batch() {
        let (first, second) = (record(), record());
        let error = FlowError::item_failed(second.id, "constraint violated");
        let stream = scripted(
            OperationConfig::new().with_atomic(true),
            vec![
                Step::Item(first.id, Ok(first.clone())),
                Step::Item(second.id, Err(error.clone())),
                Step::Batch(Err(FlowError::service_fatal("partial failure"))),
            ],
        );
        assert!(stream.is_atomic());
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(
            recorder.emissions(),
            vec![
                Emission::ItemResult(Modified::Saved(first)),
                Emission::BatchFailed(error),
            ]
        );
    }

    #[test]
    fn batch_error_suppresses_deleted_ids() {
        let stream = scripted(
            OperationConfig::new(),
            vec![Step::Batch(Err(FlowError::service_retryable("zone busy")))],
        );
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(
            recorder.emissions(),
            vec![Emission::BatchFailed(FlowError::service_retryable("zone busy"))]
        );
    }

    #[test]
    fn duplicate_item_completion_is_ignored() {
        let saved = record();
        let stream = scripted(
            OperationConfig::new(),
            vec![
                Step::Item(saved.id, Ok(saved.clone())),
                Step::Item(saved.id, Err(FlowError::not_found(saved.id))),
                Step::Batch(Ok(vec![])),
            ],
        );
        let recorder = Recorder::new();
        let _subscription = stream.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![Modified::Saved(saved)]);
        assert_eq!(recorder.terminal_count(), 1);
    }

    #[test]
    fn modified_accessors() {
        let id = RecordId::new();
        let saved: Modified<u8, RecordId> = Modified::Saved(1);
        let deleted: Modified<u8, RecordId> = Modified::Deleted(id);
        assert_eq!(saved.saved(), Some(&1));
        assert_eq!(saved.deleted(), None);
        assert_eq!(deleted.deleted(), Some(&id));
    }
}
