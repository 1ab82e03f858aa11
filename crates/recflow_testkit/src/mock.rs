//! In-memory remote database.
//!
//! [`MockCloud`] implements the remote operation traits over shared
//! dictionaries of records and zones. It can park started operations until
//! the test releases them, fail chosen items, and consult a shared
//! [`DecisionSpace`] at every fault point.

use crate::decision::DecisionSpace;
use parking_lot::Mutex;
use recflow_core::{
    BatchCallback, CancelFlag, Cursor, FetchCallbacks, FlowError, FlowResult, ItemCallbacks,
    ModifyCallbacks, OperationConfig, OperationFactory, PageCallbacks, Query, Record, RecordId,
    RecordOperations, RemoteOperation, Resource, ScriptedOperation, SingleCallback, Zone,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Progress reported for an item before it completes.
pub const HALFWAY: f64 = 0.5;

/// One page request seen by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Offset decoded from the cursor; zero for the first page.
    pub offset: usize,
    /// Results limit the stream asked for.
    pub limit: usize,
}

/// Rows of one resource type, in insertion order.
#[derive(Debug)]
pub struct Table<R: Resource> {
    rows: HashMap<R::Id, (u64, R)>,
    next_seq: u64,
}

impl<R: Resource> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<R: Resource> Table<R> {
    fn upsert(&mut self, resource: R) {
        let id = resource.id().clone();
        let seq = match self.rows.get(&id) {
            Some((seq, _)) => *seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.rows.insert(id, (seq, resource));
    }

    fn get(&self, id: &R::Id) -> Option<R> {
        self.rows.get(id).map(|(_, row)| row.clone())
    }

    fn remove(&mut self, id: &R::Id) -> Option<R> {
        self.rows.remove(id).map(|(_, row)| row)
    }

    fn ordered(&self) -> Vec<R> {
        let mut rows: Vec<&(u64, R)> = self.rows.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, row)| row.clone()).collect()
    }
}

/// Every table of the mock.
#[derive(Debug, Default)]
pub struct CloudState {
    records: Table<Record>,
    zones: Table<Zone>,
}

/// Resources the mock knows how to store.
pub trait Stored: Resource {
    /// Returns the table holding this type.
    #[doc(hidden)]
    fn table(state: &mut CloudState) -> &mut Table<Self>;
}

impl Stored for Record {
    fn table(state: &mut CloudState) -> &mut Table<Self> {
        &mut state.records
    }
}

impl Stored for Zone {
    fn table(state: &mut CloudState) -> &mut Table<Self> {
        &mut state.zones
    }
}

type Work = Box<dyn FnOnce() + Send>;

struct Inner {
    state: Mutex<CloudState>,
    faults: Option<Arc<Mutex<DecisionSpace>>>,
    failing: Mutex<HashSet<String>>,
    page_size: Option<usize>,
    deferred: AtomicBool,
    pending: Mutex<VecDeque<Work>>,
    issued: Mutex<Vec<Arc<ScriptedOperation>>>,
    operations: AtomicUsize,
    pages: Mutex<Vec<PageRequest>>,
}

/// An in-memory remote database.
///
/// Clones share the same storage and counters, so a test can keep one
/// clone for inspection and hand another to a database facade.
#[derive(Clone)]
pub struct MockCloud {
    inner: Arc<Inner>,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    /// Creates an empty cloud that runs operations as soon as they start.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Creates an empty cloud that asks `space` at every fault point.
    pub fn with_faults(space: Arc<Mutex<DecisionSpace>>) -> Self {
        Self::build(Some(space), None)
    }

    /// Returns a cloud serving at most `page_size` records per page.
    ///
    /// Shares nothing with `self`.
    pub fn with_page_size(&self, page_size: usize) -> Self {
        let cloud = Self::build(self.inner.faults.clone(), Some(page_size));
        {
            let source = self.inner.state.lock();
            let mut target = cloud.inner.state.lock();
            for record in source.records.ordered() {
                target.records.upsert(record);
            }
            for zone in source.zones.ordered() {
                target.zones.upsert(zone);
            }
        }
        cloud
    }

    fn build(faults: Option<Arc<Mutex<DecisionSpace>>>, page_size: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CloudState::default()),
                faults,
                failing: Mutex::new(HashSet::new()),
                page_size,
                deferred: AtomicBool::new(false),
                pending: Mutex::new(VecDeque::new()),
                issued: Mutex::new(Vec::new()),
                operations: AtomicUsize::new(0),
                pages: Mutex::new(Vec::new()),
            }),
        }
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Stores a resource directly.
    pub fn insert<R: Stored>(&self, resource: R) {
        R::table(&mut self.inner.state.lock()).upsert(resource);
    }

    /// Returns a stored resource.
    pub fn get<R: Stored>(&self, id: &R::Id) -> Option<R> {
        R::table(&mut self.inner.state.lock()).get(id)
    }

    /// Returns every stored resource of type `R`, in insertion order.
    pub fn all<R: Stored>(&self) -> Vec<R> {
        R::table(&mut self.inner.state.lock()).ordered()
    }

    /// Returns the number of stored records.
    pub fn record_count(&self) -> usize {
        self.inner.state.lock().records.rows.len()
    }

    /// Makes every operation touching `id` fail for that item.
    pub fn fail_item(&self, id: impl ToString) {
        self.inner.failing.lock().insert(id.to_string());
    }

    /// Returns the number of remote operations built.
    pub fn operations(&self) -> usize {
        self.inner.operations.load(Ordering::SeqCst)
    }

    /// Returns the page requests seen, in order.
    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.inner.pages.lock().clone()
    }

    /// Returns how many cancel requests reached the remote operations.
    pub fn cancellations(&self) -> usize {
        self.inner
            .issued
            .lock()
            .iter()
            .map(|operation| operation.cancellations())
            .sum()
    }

    // =========================================================================
    // Deferred execution
    // =========================================================================

    /// Parks started operations until [`run_pending`](Self::run_pending).
    pub fn set_deferred(&self, deferred: bool) {
        self.inner.deferred.store(deferred, Ordering::SeqCst);
    }

    /// Returns the number of parked operations.
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Runs the oldest parked operation. Returns false if none was parked.
    pub fn run_next(&self) -> bool {
        let work = self.inner.pending.lock().pop_front();
        match work {
            Some(work) => {
                work();
                true
            }
            None => false,
        }
    }

    /// Runs parked operations, including ones parked meanwhile, until none
    /// are left. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    // =========================================================================
    // Operation plumbing
    // =========================================================================

    fn fault(&self) -> bool {
        self.inner
            .faults
            .as_ref()
            .is_some_and(|space| space.lock().decide())
    }

    fn item_error(&self, key: &str) -> Option<FlowError> {
        if self.inner.failing.lock().contains(key) {
            return Some(FlowError::item_failed(key, "rejected by server"));
        }
        self.fault()
            .then(|| FlowError::item_failed(key, "injected item fault"))
    }

    fn call_error(&self) -> Option<FlowError> {
        self.fault()
            .then(|| FlowError::service_retryable("injected service fault"))
    }

    /// Wraps `work` in a remote operation.
    ///
    /// Started operations run `work` at once, or park it in deferred mode.
    /// Work that starts after cancellation sees the flag set.
    fn operation(
        &self,
        label: &'static str,
        work: impl FnOnce(CancelFlag) + Send + 'static,
    ) -> Arc<dyn RemoteOperation> {
        self.inner.operations.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let operation = ScriptedOperation::new(move |flag| {
            if inner.deferred.load(Ordering::SeqCst) {
                trace!(label, "parking operation");
                inner.pending.lock().push_back(Box::new(move || work(flag)));
            } else {
                work(flag);
            }
        });
        self.inner.issued.lock().push(Arc::clone(&operation));
        operation
    }

    fn modify_stored<R: Stored>(
        &self,
        saves: Vec<R>,
        deletes: Vec<R::Id>,
        atomic: bool,
        callbacks: ModifyCallbacks<R>,
        flag: &CancelFlag,
    ) {
        let ItemCallbacks {
            mut progress,
            mut item,
            batch,
        } = callbacks;
        if flag.is_cancelled() {
            batch(Err(FlowError::service_fatal("operation cancelled")));
            return;
        }

        // Decisions are made for every item so each run makes the same
        // number of them.
        let save_errors: Vec<Option<FlowError>> = saves
            .iter()
            .map(|resource| self.item_error(&resource.id().to_string()))
            .collect();
        let delete_errors: Vec<Option<FlowError>> = deletes
            .iter()
            .map(|id| {
                self.item_error(&id.to_string()).or_else(|| {
                    let missing = R::table(&mut self.inner.state.lock()).get(id).is_none();
                    missing.then(|| FlowError::not_found(id))
                })
            })
            .collect();
        let batch_error = self.call_error();
        let failed = save_errors.iter().chain(&delete_errors).any(Option::is_some);

        let mut applied_saves = Vec::new();
        let mut deleted = Vec::new();
        let mut first_error: Option<FlowError> = None;
        for (resource, error) in saves.into_iter().zip(save_errors) {
            let id = resource.id().clone();
            progress(id.clone(), HALFWAY);
            let rolled_back = atomic && first_error.is_some();
            let outcome = match error {
                Some(error) => {
                    first_error.get_or_insert_with(|| error.clone());
                    Err(error)
                }
                None if rolled_back => Err(FlowError::item_failed(&id, "atomic batch rolled back")),
                None => {
                    applied_saves.push(resource.clone());
                    Ok(resource)
                }
            };
            progress(id.clone(), 1.0);
            item(id, outcome);
        }
        for (id, error) in deletes.into_iter().zip(delete_errors) {
            match error {
                Some(error) => {
                    first_error.get_or_insert_with(|| error.clone());
                    item(id, Err(error));
                }
                None => deleted.push(id),
            }
        }

        let commit = !(atomic && (failed || batch_error.is_some()));
        if commit {
            let mut state = self.inner.state.lock();
            let table = R::table(&mut state);
            for resource in applied_saves {
                table.upsert(resource);
            }
            for id in &deleted {
                table.remove(id);
            }
        } else {
            debug!("atomic modify rolled back");
        }

        match batch_error {
            Some(error) => batch(Err(error)),
            None if atomic && failed => batch(Err(first_error
                .unwrap_or_else(|| FlowError::service_fatal("atomic batch failed")))),
            None => batch(Ok(deleted)),
        }
    }
}

impl<R: Stored> OperationFactory<R> for MockCloud {
    fn save_one(&self, resource: R, callback: SingleCallback<R>) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        self.operation("save one", move |flag| {
            if flag.is_cancelled() {
                return callback(Err(FlowError::service_fatal("operation cancelled")));
            }
            let key = resource.id().to_string();
            if let Some(error) = cloud.item_error(&key).or_else(|| cloud.call_error()) {
                return callback(Err(error));
            }
            R::table(&mut cloud.inner.state.lock()).upsert(resource.clone());
            callback(Ok(resource));
        })
    }

    fn fetch_one(&self, id: R::Id, callback: SingleCallback<R>) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        self.operation("fetch one", move |flag| {
            if flag.is_cancelled() {
                return callback(Err(FlowError::service_fatal("operation cancelled")));
            }
            if let Some(error) = cloud.call_error() {
                return callback(Err(error));
            }
            let found = R::table(&mut cloud.inner.state.lock()).get(&id);
            callback(found.ok_or_else(|| FlowError::not_found(&id)));
        })
    }

    fn delete_one(
        &self,
        id: R::Id,
        callback: SingleCallback<R::Id>,
    ) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        self.operation("delete one", move |flag| {
            if flag.is_cancelled() {
                return callback(Err(FlowError::service_fatal("operation cancelled")));
            }
            if let Some(error) = cloud.call_error() {
                return callback(Err(error));
            }
            let removed = R::table(&mut cloud.inner.state.lock()).remove(&id);
            callback(match removed {
                Some(_) => Ok(id),
                None => Err(FlowError::not_found(&id)),
            });
        })
    }

    fn fetch_all(&self, callback: BatchCallback<Vec<R>>) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        self.operation("fetch all", move |flag| {
            if flag.is_cancelled() {
                return callback(Err(FlowError::service_fatal("operation cancelled")));
            }
            if let Some(error) = cloud.call_error() {
                return callback(Err(error));
            }
            let rows = R::table(&mut cloud.inner.state.lock()).ordered();
            callback(Ok(rows));
        })
    }

    fn fetch_many(
        &self,
        ids: Vec<R::Id>,
        callback: BatchCallback<HashMap<R::Id, R>>,
    ) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        self.operation("fetch many", move |flag| {
            if flag.is_cancelled() {
                return callback(Err(FlowError::service_fatal("operation cancelled")));
            }
            if let Some(error) = cloud.call_error() {
                return callback(Err(error));
            }
            let found = {
                let mut state = cloud.inner.state.lock();
                let table = R::table(&mut state);
                ids.iter()
                    .filter_map(|id| table.get(id).map(|row| (id.clone(), row)))
                    .collect()
            };
            callback(Ok(found));
        })
    }

    fn modify(
        &self,
        saves: Vec<R>,
        deletes: Vec<R::Id>,
        config: &OperationConfig,
        callbacks: ModifyCallbacks<R>,
    ) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        let atomic = config.atomic;
        self.operation("modify", move |flag| {
            cloud.modify_stored(saves, deletes, atomic, callbacks, &flag);
        })
    }
}

impl RecordOperations for MockCloud {
    fn fetch_records(
        &self,
        ids: Vec<RecordId>,
        callbacks: FetchCallbacks<Record>,
    ) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        self.operation("fetch records", move |flag| {
            let ItemCallbacks {
                mut progress,
                mut item,
                batch,
            } = callbacks;
            if flag.is_cancelled() {
                return batch(Err(FlowError::service_fatal("operation cancelled")));
            }
            let mut fetched = HashMap::new();
            for id in ids {
                let error = cloud.item_error(&id.to_string());
                progress(id, HALFWAY);
                let found = cloud.inner.state.lock().records.get(&id);
                let outcome = match (error, found) {
                    (Some(error), _) => Err(error),
                    (None, Some(record)) => Ok(record),
                    (None, None) => Err(FlowError::not_found(id)),
                };
                if let Ok(record) = &outcome {
                    fetched.insert(id, record.clone());
                }
                item(id, outcome);
            }
            match cloud.call_error() {
                Some(error) => batch(Err(error)),
                None => batch(Ok(fetched)),
            }
        })
    }

    fn query_page(
        &self,
        query: &Query,
        cursor: Option<Cursor>,
        limit: usize,
        callbacks: PageCallbacks<Record>,
    ) -> Arc<dyn RemoteOperation> {
        let cloud = self.clone();
        let query = query.clone();
        self.operation("query page", move |flag| {
            let PageCallbacks { mut item, complete } = callbacks;
            if flag.is_cancelled() {
                return complete(Err(FlowError::service_fatal("operation cancelled")));
            }
            let offset = match decode_cursor(cursor.as_ref()) {
                Ok(offset) => offset,
                Err(error) => return complete(Err(error)),
            };
            let limit = cloud.inner.page_size.map_or(limit, |size| size.min(limit));
            cloud.inner.pages.lock().push(PageRequest { offset, limit });
            if let Some(error) = cloud.call_error() {
                return complete(Err(error));
            }

            let matching: Vec<Record> = cloud
                .inner
                .state
                .lock()
                .records
                .ordered()
                .into_iter()
                .filter(|record| query.matches(record))
                .collect();
            let end = offset.saturating_add(limit).min(matching.len());
            let start = offset.min(end);
            for record in &matching[start..end] {
                if flag.is_cancelled() {
                    break;
                }
                item(record.clone());
            }
            let next = (end < matching.len()).then(|| encode_cursor(end));
            complete(Ok(next));
        })
    }
}

/// Encodes a page offset as a cursor.
pub fn encode_cursor(offset: usize) -> Cursor {
    Cursor::from_bytes((offset as u64).to_be_bytes().to_vec())
}

/// Decodes a cursor made by [`encode_cursor`]. `None` is the first page.
pub fn decode_cursor(cursor: Option<&Cursor>) -> FlowResult<usize> {
    let Some(cursor) = cursor else {
        return Ok(0);
    };
    let bytes: [u8; 8] = cursor
        .as_bytes()
        .try_into()
        .map_err(|_| FlowError::Rejected(format!("malformed cursor {cursor:?}")))?;
    usize::try_from(u64::from_be_bytes(bytes))
        .map_err(|_| FlowError::Rejected(format!("cursor out of range {cursor:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recflow_core::ZoneId;

    fn note(n: usize) -> Record {
        Record::new("Note").with_field("n", n.to_string())
    }

    #[test]
    fn cursor_round_trip_and_rejection() {
        assert_eq!(decode_cursor(None).unwrap(), 0);
        assert_eq!(decode_cursor(Some(&encode_cursor(7))).unwrap(), 7);
        assert!(matches!(
            decode_cursor(Some(&Cursor::from_bytes(vec![1, 2]))),
            Err(FlowError::Rejected(_))
        ));
    }

    #[test]
    fn insertion_order_survives_updates() {
        let cloud = MockCloud::new();
        let (a, b) = (note(1), note(2));
        cloud.insert(a.clone());
        cloud.insert(b.clone());
        cloud.insert(a.clone().with_field("n", "one"));

        let all: Vec<RecordId> = cloud.all::<Record>().iter().map(|r| r.id).collect();
        assert_eq!(all, vec![a.id, b.id]);
        assert_eq!(cloud.get::<Record>(&a.id).unwrap().field("n"), Some("one"));
    }

    #[test]
    fn deferred_operations_wait_for_release() {
        let cloud = MockCloud::new();
        cloud.set_deferred(true);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let operation = OperationFactory::<Record>::fetch_all(
            &cloud,
            Box::new(move |outcome: FlowResult<Vec<Record>>| *sink.lock() = Some(outcome)),
        );

        operation.start();
        assert_eq!(cloud.pending(), 1);
        assert!(seen.lock().is_none());

        assert_eq!(cloud.run_pending(), 1);
        assert_eq!(*seen.lock(), Some(Ok(Vec::new())));
    }

    #[test]
    fn cancelled_before_release_reports_cancellation() {
        let cloud = MockCloud::new();
        cloud.set_deferred(true);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let operation = OperationFactory::<Zone>::fetch_one(
            &cloud,
            ZoneId::new("inbox"),
            Box::new(move |outcome: FlowResult<Zone>| *sink.lock() = Some(outcome.is_err())),
        );

        operation.start();
        operation.cancel();
        cloud.run_pending();
        assert_eq!(*seen.lock(), Some(true));
        assert_eq!(cloud.cancellations(), 1);
    }

    #[test]
    fn page_size_caps_limit() {
        let cloud = MockCloud::new();
        for n in 0..5 {
            cloud.insert(note(n));
        }
        let capped = cloud.with_page_size(2);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        capped
            .query_page(
                &Query::new("Note"),
                None,
                100,
                PageCallbacks {
                    item: Box::new(move |_: Record| {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
                    complete: Box::new(|outcome: FlowResult<Option<Cursor>>| {
                        assert_eq!(outcome, Ok(Some(encode_cursor(2))));
                    }),
                },
            )
            .start();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(capped.page_requests(), vec![PageRequest { offset: 0, limit: 2 }]);
        assert_eq!(cloud.page_requests(), Vec::new());
    }
}
