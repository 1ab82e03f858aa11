//! Demand-driven paginated queries.
//!
//! A [`PaginatedQuery`] issues one page operation at a time, and only while
//! the consumer has outstanding demand. Each page's cursor is carried into
//! the next page, so resuming after a pause never refetches data.
//!
//! ```text
//! Idle --request(n>0)--> Queued --page(Some(c)), demand>0--> Queued
//!                          |    --page(Some(c)), demand=0--> Idle
//!                          |    --page(None)--> Exhausted
//!                          |    --page(Err)--> Failed
//! any non-terminal --cancel--> Cancelled
//! ```
//!
//! Every transition runs on the subscription's serial context; cancellation
//! sets its flag first and then cancels the in-flight page.

use crate::config::OperationConfig;
use crate::downstream::Downstream;
use crate::error::FlowResult;
use crate::handle::OperationHandle;
use crate::model::{Cursor, Query, Record, RecordId};
use crate::queue::OperationQueue;
use crate::remote::{PageCallbacks, RecordOperations};
use crate::stream::{Control, Demand, Emission, Publisher, Subscriber, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Phase of one query subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Queued,
    Exhausted,
    Failed,
    Cancelled,
}

impl Phase {
    fn is_terminal(self) -> bool {
        matches!(self, Phase::Exhausted | Phase::Failed | Phase::Cancelled)
    }
}

/// A cold stream over the records matching a query.
pub struct PaginatedQuery<F> {
    operations: Arc<F>,
    query: Query,
    config: OperationConfig,
    queue: Arc<dyn OperationQueue>,
}

impl<F: RecordOperations> PaginatedQuery<F> {
    /// Creates a query stream.
    ///
    /// Fails when `config` is invalid.
    pub fn new(
        operations: Arc<F>,
        query: Query,
        config: OperationConfig,
        queue: Arc<dyn OperationQueue>,
    ) -> FlowResult<Self> {
        config.validate()?;
        Ok(Self {
            operations,
            query,
            config,
            queue,
        })
    }

    /// Returns the query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the largest page a single operation may request.
    pub fn results_limit(&self) -> usize {
        self.config.results_limit
    }
}

impl<F: RecordOperations> Publisher for PaginatedQuery<F> {
    type Key = RecordId;
    type Item = Record;

    /// Subscribes without demand: nothing is fetched until the consumer
    /// calls [`Subscription::request`] or answers an item with more demand.
    fn subscribe<S>(&self, subscriber: S) -> Subscription
    where
        S: Subscriber<RecordId, Record> + 'static,
    {
        let pager = Arc::new(Pager {
            operations: Arc::clone(&self.operations),
            query: self.query.clone(),
            results_limit: self.config.results_limit,
            forward_cancel: self.config.priority.forwards_cancellation(),
            queue: Arc::clone(&self.queue),
            downstream: Downstream::new(subscriber),
            state: Mutex::new(PagerState {
                phase: Phase::Idle,
                demand: Demand::none(),
                cursor: None,
                current: None,
                pages: 0,
            }),
        });
        Subscription::new(Arc::new(QueryControl { pager }))
    }
}

struct PagerState {
    phase: Phase,
    demand: Demand,
    cursor: Option<Cursor>,
    current: Option<Arc<OperationHandle>>,
    pages: u64,
}

struct Pager<F> {
    operations: Arc<F>,
    query: Query,
    results_limit: usize,
    forward_cancel: bool,
    queue: Arc<dyn OperationQueue>,
    downstream: Arc<Downstream<RecordId, Record>>,
    state: Mutex<PagerState>,
}

impl<F: RecordOperations> Pager<F> {
    /// Folds in new demand and leaves `Idle` if there is any.
    fn add_demand(self: &Arc<Self>, demand: Demand) {
        let mut state = self.state.lock();
        if state.phase.is_terminal() {
            trace!(%demand, "demand after terminal state ignored");
            return;
        }
        state.demand += demand;
        if state.phase == Phase::Idle && state.demand.is_positive() {
            state.phase = Phase::Queued;
            drop(state);
            self.issue_page();
        }
    }

    /// Builds and submits the next page operation.
    ///
    /// Called with the phase already set to `Queued`.
    fn issue_page(self: &Arc<Self>) {
        let (cursor, limit, page) = {
            let mut state = self.state.lock();
            state.pages += 1;
            (
                state.cursor.clone(),
                state.demand.page_limit(self.results_limit),
                state.pages,
            )
        };
        debug!(
            page,
            limit,
            continued = cursor.is_some(),
            record_type = %self.query.record_type,
            "issuing query page"
        );

        let handle = OperationHandle::new("query page");
        let item_pager = Arc::clone(self);
        let page_pager = Arc::clone(self);
        let finished = Arc::clone(&handle);
        let operation = self.operations.query_page(
            &self.query,
            cursor,
            limit,
            PageCallbacks {
                item: Box::new(move |record: Record| {
                    let pager = Arc::clone(&item_pager);
                    item_pager.downstream.execute(move || pager.on_item(record));
                }),
                complete: Box::new(move |outcome: FlowResult<Option<Cursor>>| {
                    finished.finish(outcome.is_ok());
                    let pager = Arc::clone(&page_pager);
                    let id = finished.id();
                    page_pager
                        .downstream
                        .execute(move || pager.on_page(id, outcome));
                }),
            },
        );
        handle.attach(operation);

        {
            let mut state = self.state.lock();
            if state.phase != Phase::Queued {
                debug!(page, "query cancelled before page submission");
                return;
            }
            state.current = Some(Arc::clone(&handle));
        }
        self.queue.submit(handle);
    }

    fn on_item(&self, record: Record) {
        {
            let mut state = self.state.lock();
            if state.phase != Phase::Queued {
                return;
            }
            state.demand = state.demand.decremented();
        }
        if let Some(more) = self.downstream.deliver(Emission::ItemResult(record)) {
            if more.is_positive() {
                self.state.lock().demand += more;
            }
        }
    }

    fn on_page(self: &Arc<Self>, id: u64, outcome: FlowResult<Option<Cursor>>) {
        let mut state = self.state.lock();
        let current = state.current.as_ref().map(|handle| handle.id());
        if state.phase != Phase::Queued || current != Some(id) {
            trace!(id, "stale page completion ignored");
            return;
        }
        state.current = None;
        match outcome {
            Ok(None) => {
                state.phase = Phase::Exhausted;
                state.cursor = None;
                debug!(pages = state.pages, "query exhausted");
                drop(state);
                self.downstream.deliver(Emission::BatchComplete);
            }
            Ok(Some(cursor)) => {
                state.cursor = Some(cursor);
                if state.demand.is_positive() {
                    drop(state);
                    self.issue_page();
                } else {
                    trace!("page done without demand; idling");
                    state.phase = Phase::Idle;
                }
            }
            Err(error) => {
                state.phase = Phase::Failed;
                debug!(%error, "query page failed");
                drop(state);
                self.downstream.deliver(Emission::BatchFailed(error));
            }
        }
    }

    fn cancel(&self) {
        if !self.downstream.cancel() {
            return;
        }
        let current = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.phase = Phase::Cancelled;
            state.current.take()
        };
        match current {
            Some(handle) if self.forward_cancel => {
                handle.cancel();
            }
            Some(handle) => {
                debug!(id = handle.id(), "background query page keeps running");
            }
            None => trace!("query cancelled while idle"),
        }
    }
}

struct QueryControl<F> {
    pager: Arc<Pager<F>>,
}

impl<F: RecordOperations> Control for QueryControl<F> {
    fn request(&self, demand: Demand) {
        let pager = Arc::clone(&self.pager);
        self.pager
            .downstream
            .execute(move || pager.add_demand(demand));
    }

    fn cancel(&self) {
        self.pager.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.pager.downstream.is_cancelled()
    }
}
