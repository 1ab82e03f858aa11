//! The remote collaborator boundary.
//!
//! The remote service is reached through operations built by an
//! [`OperationFactory`] (and [`RecordOperations`] for record-only calls).
//! Each builder receives the callbacks for its completion shape and returns
//! a [`RemoteOperation`] that does nothing until started:
//!
//! - single result: one `FlowResult<T>`
//! - batch result: one `FlowResult<collection>`
//! - per-item: progress and completion per item, then one batch result
//! - paginated: zero or more items, then one `FlowResult<Option<Cursor>>`
//!
//! Nullable `(result, error)` pairs are converted with
//! [`outcome_from_parts`](crate::error::outcome_from_parts) before reaching
//! these callbacks.

use crate::config::OperationConfig;
use crate::error::FlowResult;
use crate::model::{Cursor, Query, Record, RecordId, Resource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One remote call that can be started and cancelled.
pub trait RemoteOperation: Send + Sync {
    /// Begins the remote call.
    fn start(&self);

    /// Asks the remote call to stop.
    fn cancel(&self);
}

/// Callback for a single-result call.
pub type SingleCallback<T> = Box<dyn FnOnce(FlowResult<T>) + Send>;

/// Callback for a batch-result call.
pub type BatchCallback<C> = Box<dyn FnOnce(FlowResult<C>) + Send>;

/// Callbacks for a call that reports each item separately.
pub struct ItemCallbacks<K, T, B> {
    /// Progress of one item as a fraction in `0.0..=1.0`.
    pub progress: Box<dyn FnMut(K, f64) + Send>,
    /// Completion of one item.
    pub item: Box<dyn FnMut(K, FlowResult<T>) + Send>,
    /// Completion of the whole batch.
    pub batch: BatchCallback<B>,
}

/// Callbacks of a modify call: saved items one by one, deleted ids at the end.
pub type ModifyCallbacks<R> =
    ItemCallbacks<<R as Resource>::Id, R, Vec<<R as Resource>::Id>>;

/// Callbacks of a tracked fetch: fetched items one by one, the mapping at the end.
pub type FetchCallbacks<R> =
    ItemCallbacks<<R as Resource>::Id, R, HashMap<<R as Resource>::Id, R>>;

/// Callbacks for one page of a paginated call.
pub struct PageCallbacks<T> {
    /// One fetched item.
    pub item: Box<dyn FnMut(T) + Send>,
    /// Completion of the page: the next cursor, or `None` when exhausted.
    pub complete: BatchCallback<Option<Cursor>>,
}

/// Builds remote operations for one resource type.
pub trait OperationFactory<R: Resource>: Send + Sync + 'static {
    /// Saves one resource through the convenience call.
    fn save_one(&self, resource: R, callback: SingleCallback<R>) -> Arc<dyn RemoteOperation>;

    /// Fetches one resource through the convenience call.
    fn fetch_one(&self, id: R::Id, callback: SingleCallback<R>) -> Arc<dyn RemoteOperation>;

    /// Deletes one resource through the convenience call.
    fn delete_one(&self, id: R::Id, callback: SingleCallback<R::Id>)
        -> Arc<dyn RemoteOperation>;

    /// Fetches every resource of this type.
    fn fetch_all(&self, callback: BatchCallback<Vec<R>>) -> Arc<dyn RemoteOperation>;

    /// Fetches resources by id.
    fn fetch_many(
        &self,
        ids: Vec<R::Id>,
        callback: BatchCallback<HashMap<R::Id, R>>,
    ) -> Arc<dyn RemoteOperation>;

    /// Saves and deletes resources in one batch.
    fn modify(
        &self,
        saves: Vec<R>,
        deletes: Vec<R::Id>,
        config: &OperationConfig,
        callbacks: ModifyCallbacks<R>,
    ) -> Arc<dyn RemoteOperation>;
}

/// Builds record-only remote operations.
pub trait RecordOperations: Send + Sync + 'static {
    /// Fetches records by id, reporting progress per record.
    fn fetch_records(
        &self,
        ids: Vec<RecordId>,
        callbacks: FetchCallbacks<Record>,
    ) -> Arc<dyn RemoteOperation>;

    /// Fetches one page of query results.
    fn query_page(
        &self,
        query: &Query,
        cursor: Option<Cursor>,
        limit: usize,
        callbacks: PageCallbacks<Record>,
    ) -> Arc<dyn RemoteOperation>;
}

/// Cancellation flag handed to a [`ScriptedOperation`] body.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Returns true once the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Body = Box<dyn FnOnce(CancelFlag) + Send>;

/// A remote operation backed by a closure.
///
/// The body runs on the thread that starts the operation and receives the
/// operation's [`CancelFlag`]. Starting twice runs the body once.
pub struct ScriptedOperation {
    body: Mutex<Option<Body>>,
    cancel_flag: CancelFlag,
    started: AtomicBool,
    cancellations: AtomicUsize,
}

impl ScriptedOperation {
    /// Creates an operation that runs `body` when started.
    pub fn new(body: impl FnOnce(CancelFlag) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Some(Box::new(body))),
            cancel_flag: CancelFlag::default(),
            started: AtomicBool::new(false),
            cancellations: AtomicUsize::new(0),
        })
    }

    /// Returns true once the operation was started.
    pub fn was_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns how many cancel requests reached this operation.
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl RemoteOperation for ScriptedOperation {
    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        let body = self.body.lock().take();
        if let Some(body) = body {
            body(self.cancel_flag.clone());
        }
    }

    fn cancel(&self) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        self.cancel_flag.0.store(true, Ordering::SeqCst);
    }
}
