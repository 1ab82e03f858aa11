//! Test fixtures and database helpers.
//!
//! Provides convenience functions for seeding a mock cloud and wiring a
//! database facade over it.

use crate::mock::MockCloud;
use recflow_core::{Database, InlineQueue, Record, RecordId, TokioQueue};
use std::sync::Arc;

/// Record type used by the fixtures.
pub const NOTE: &str = "Note";

/// Creates a note whose `n` field holds `n`.
pub fn note(n: usize) -> Record {
    Record::new(NOTE).with_field("n", n.to_string())
}

/// Creates `count` notes numbered from zero.
pub fn notes(count: usize) -> Vec<Record> {
    (0..count).map(note).collect()
}

/// Returns the `n` fields of `records`, in order.
pub fn numbers(records: &[Record]) -> Vec<usize> {
    records
        .iter()
        .filter_map(|record| record.field("n")?.parse().ok())
        .collect()
}

/// Returns the ids of `records`, in order.
pub fn ids(records: &[Record]) -> Vec<RecordId> {
    records.iter().map(|record| record.id).collect()
}

/// Creates a mock cloud holding `count` notes.
pub fn seeded_cloud(count: usize) -> MockCloud {
    let cloud = MockCloud::new();
    for record in notes(count) {
        cloud.insert(record);
    }
    cloud
}

/// A database over a mock cloud, with the cloud kept for inspection.
pub struct TestDatabase<Q = InlineQueue> {
    /// The database facade.
    pub db: Database<MockCloud, Q>,
    /// The cloud behind it.
    pub cloud: MockCloud,
}

impl TestDatabase {
    /// Creates a database that starts operations on the calling thread.
    pub fn inline(cloud: MockCloud) -> Self {
        Self {
            db: Database::new(cloud.clone(), InlineQueue::new()),
            cloud,
        }
    }
}

impl TestDatabase<TokioQueue> {
    /// Creates a database that starts operations on a runtime's blocking
    /// pool.
    pub fn pooled(cloud: MockCloud, runtime: tokio::runtime::Handle) -> Self {
        Self {
            db: Database::from_shared(Arc::new(cloud.clone()), Arc::new(TokioQueue::new(runtime))),
            cloud,
        }
    }
}

impl<Q> std::ops::Deref for TestDatabase<Q> {
    type Target = Database<MockCloud, Q>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test against an inline database seeded with `count` notes.
///
/// # Example
///
/// ```rust,ignore
/// use recflow_testkit::with_seeded_db;
///
/// #[test]
/// fn my_test() {
///     with_seeded_db(3, |db, cloud| {
///         let stream = db.fetch_all::<Record>();
///         // ... subscribe and inspect
///     });
/// }
/// ```
pub fn with_seeded_db<F, R>(count: usize, f: F) -> R
where
    F: FnOnce(&Database<MockCloud>, &MockCloud) -> R,
{
    let test_db = TestDatabase::inline(seeded_cloud(count));
    f(&test_db.db, &test_db.cloud)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_cloud_keeps_order() {
        let cloud = seeded_cloud(4);
        assert_eq!(cloud.record_count(), 4);
        assert_eq!(numbers(&cloud.all::<Record>()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn with_seeded_db_shares_the_cloud() {
        let count = with_seeded_db(2, |db, cloud| {
            assert_eq!(db.factory().record_count(), cloud.record_count());
            cloud.record_count()
        });
        assert_eq!(count, 2);
    }
}
