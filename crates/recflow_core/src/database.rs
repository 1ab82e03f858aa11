//! The stream-returning database facade.

use crate::adapters::{BatchResult, FetchStream, ModifyStream, SingleResult};
use crate::config::{OperationConfig, Priority};
use crate::error::FlowResult;
use crate::model::{Query, Record, RecordId, Resource};
use crate::query::PaginatedQuery;
use crate::queue::{InlineQueue, OperationQueue};
use crate::remote::{OperationFactory, RecordOperations};
use std::collections::HashMap;
use std::sync::Arc;

/// Remote database exposed as streams.
///
/// Every method returns a cold stream: nothing reaches the remote service
/// until the stream is subscribed, and every subscription issues its own
/// call. `F` builds the remote operations; `Q` runs them.
///
/// # Example
///
/// ```rust,ignore
/// use recflow_core::{Database, Publisher, Recorder};
///
/// let db = Database::new(cloud, InlineQueue::new());
/// let recorder = Recorder::new();
/// db.fetch_one::<Record>(id).subscribe(recorder.clone());
/// ```
pub struct Database<F, Q = InlineQueue> {
    factory: Arc<F>,
    queue: Arc<Q>,
}

impl<F, Q> Clone for Database<F, Q> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<F, Q> Database<F, Q>
where
    F: Send + Sync + 'static,
    Q: OperationQueue,
{
    /// Creates a database over `factory`, running operations on `queue`.
    pub fn new(factory: F, queue: Q) -> Self {
        Self::from_shared(Arc::new(factory), Arc::new(queue))
    }

    /// Creates a database from shared parts.
    pub fn from_shared(factory: Arc<F>, queue: Arc<Q>) -> Self {
        Self { factory, queue }
    }

    /// Returns the operation factory.
    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    fn queue(&self) -> Arc<dyn OperationQueue> {
        Arc::clone(&self.queue) as Arc<dyn OperationQueue>
    }

    // ---------------------------------------------------------------------
    // Single results
    // ---------------------------------------------------------------------

    /// Saves one resource at background priority.
    ///
    /// Cancelling the stream silences it; the save itself keeps running.
    pub fn save_at_background_priority<R>(&self, resource: R) -> SingleResult<R>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        let factory = Arc::clone(&self.factory);
        SingleResult::new("save", Priority::Background, self.queue(), move |callback| {
            factory.save_one(resource.clone(), callback)
        })
    }

    /// Fetches one resource at background priority.
    pub fn fetch_at_background_priority<R>(&self, id: R::Id) -> SingleResult<R>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        let factory = Arc::clone(&self.factory);
        SingleResult::new("fetch", Priority::Background, self.queue(), move |callback| {
            factory.fetch_one(id.clone(), callback)
        })
    }

    /// Deletes one resource at background priority.
    pub fn delete_at_background_priority<R>(&self, id: R::Id) -> SingleResult<R::Id>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        let factory = Arc::clone(&self.factory);
        SingleResult::new("delete", Priority::Background, self.queue(), move |callback| {
            factory.delete_one(id.clone(), callback)
        })
    }

    /// Fetches one resource.
    pub fn fetch_one<R>(&self, id: R::Id) -> SingleResult<R>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        let factory = Arc::clone(&self.factory);
        SingleResult::new(
            "fetch one",
            Priority::UserInitiated,
            self.queue(),
            move |callback| factory.fetch_one(id.clone(), callback),
        )
    }

    // ---------------------------------------------------------------------
    // Batches
    // ---------------------------------------------------------------------

    /// Fetches every resource of type `R`.
    pub fn fetch_all<R>(&self) -> BatchResult<R::Id, Vec<R>>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        let factory = Arc::clone(&self.factory);
        BatchResult::new(
            "fetch all",
            Priority::UserInitiated,
            self.queue(),
            move |callback| factory.fetch_all(callback),
        )
    }

    /// Fetches resources by id. Missing ids are simply absent.
    pub fn fetch_many<R>(&self, ids: Vec<R::Id>) -> BatchResult<R::Id, HashMap<R::Id, R>>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        let factory = Arc::clone(&self.factory);
        BatchResult::new(
            "fetch many",
            Priority::UserInitiated,
            self.queue(),
            move |callback| factory.fetch_many(ids.clone(), callback),
        )
    }

    // ---------------------------------------------------------------------
    // Modifications
    // ---------------------------------------------------------------------

    /// Saves resources.
    pub fn save<R>(&self, resources: Vec<R>, config: &OperationConfig) -> ModifyStream<R>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        self.modify(resources, Vec::new(), config)
    }

    /// Deletes resources by id.
    pub fn delete<R>(&self, ids: Vec<R::Id>, config: &OperationConfig) -> ModifyStream<R>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        self.modify(Vec::new(), ids, config)
    }

    /// Saves and deletes resources in one batch.
    ///
    /// Saved resources stream as they complete; deleted ids follow once the
    /// whole batch has succeeded.
    pub fn modify<R>(
        &self,
        saves: Vec<R>,
        deletes: Vec<R::Id>,
        config: &OperationConfig,
    ) -> ModifyStream<R>
    where
        R: Resource,
        F: OperationFactory<R>,
    {
        let factory = Arc::clone(&self.factory);
        let remote_config = config.clone();
        ModifyStream::<R>::modify(config, self.queue(), move |callbacks| {
            factory.modify(saves.clone(), deletes.clone(), &remote_config, callbacks)
        })
    }
}

impl<F, Q> Database<F, Q>
where
    F: RecordOperations,
    Q: OperationQueue,
{
    /// Fetches records by id with per-record progress.
    pub fn fetch_records(&self, ids: Vec<RecordId>) -> FetchStream<Record> {
        let factory = Arc::clone(&self.factory);
        FetchStream::<Record>::fetch(&OperationConfig::new(), self.queue(), move |callbacks| {
            factory.fetch_records(ids.clone(), callbacks)
        })
    }

    /// Streams the records matching `query`, one page per unit of demand.
    pub fn query(&self, query: Query, config: OperationConfig) -> FlowResult<PaginatedQuery<F>> {
        PaginatedQuery::new(Arc::clone(&self.factory), query, config, self.queue())
    }
}
