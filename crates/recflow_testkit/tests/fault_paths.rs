//! Every fault path through the mock ends in exactly one terminal emission.

use parking_lot::Mutex;
use recflow_core::{Demand, Emission, OperationConfig, Publisher, Query, Record, Recorder};
use recflow_testkit::prelude::*;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

fn faulty_db() -> (Arc<Mutex<DecisionSpace>>, TestDatabase) {
    let space = Arc::new(Mutex::new(DecisionSpace::new()));
    let cloud = MockCloud::with_faults(Arc::clone(&space));
    (space, TestDatabase::inline(cloud))
}

/// Checks the emission log of one finished stream.
fn assert_terminated_once<K: Clone + PartialEq + Debug, T: Clone + Debug>(
    recorder: &Recorder<K, T>,
) {
    let emissions = recorder.emissions();
    assert_eq!(recorder.terminal_count(), 1, "{emissions:?}");
    assert!(emissions.last().is_some_and(Emission::is_terminal));
}

#[test]
fn modify_paths() {
    for atomic in [false, true] {
        let (space, test_db) = faulty_db();
        let target = note(99);
        let config = OperationConfig::new().with_atomic(atomic);
        let mut paths = HashSet::new();

        let runs = explore(&space, || {
            test_db.cloud.insert(target.clone());
            let recorder = Recorder::new();
            let _subscription = test_db
                .modify(notes(2), vec![target.id], &config)
                .subscribe(recorder.clone());

            assert_terminated_once(&recorder);
            let space = space.lock();
            assert!(paths.insert(space.path().to_vec()));
            if space.has_decided_affirmatively() {
                assert!(recorder.failure().is_some() || !recorder.item_errors().is_empty());
                if atomic {
                    assert!(recorder.failure().is_some());
                    assert!(recorder.items().iter().all(|m| m.deleted().is_none()));
                }
            } else {
                assert!(recorder.is_complete());
                assert_eq!(recorder.items().len(), 3);
            }
        });

        // Two saves, one delete, one batch outcome.
        assert_eq!(runs, 16);
        assert_eq!(paths.len(), 16);
    }
}

#[test]
fn atomic_modify_never_partially_applies() {
    let space = Arc::new(Mutex::new(DecisionSpace::new()));
    let saves = notes(2);
    let runs = explore(&space, || {
        let test_db = TestDatabase::inline(MockCloud::with_faults(Arc::clone(&space)));
        let recorder = Recorder::new();
        let _subscription = test_db
            .save(saves.clone(), &OperationConfig::new().with_atomic(true))
            .subscribe(recorder.clone());

        let failed = space.lock().has_decided_affirmatively();
        assert_eq!(test_db.cloud.record_count(), if failed { 0 } else { 2 });
        assert_eq!(recorder.failure().is_some(), failed);
    });
    assert_eq!(runs, 8);
}

#[test]
fn fetch_records_paths() {
    let (space, test_db) = faulty_db();
    let seeded = notes(3);
    for record in &seeded {
        test_db.cloud.insert(record.clone());
    }

    let runs = explore(&space, || {
        let recorder = Recorder::new();
        let _subscription = test_db
            .fetch_records(ids(&seeded))
            .subscribe(recorder.clone());

        assert_terminated_once(&recorder);
        assert_eq!(
            recorder.items().len() + recorder.item_errors().len(),
            seeded.len()
        );
    });
    assert_eq!(runs, 16);
}

#[test]
fn query_paths() {
    let (space, test_db) = faulty_db();
    for record in notes(5) {
        test_db.cloud.insert(record);
    }

    let runs = explore(&space, || {
        let query = test_db
            .query(Query::new(NOTE), OperationConfig::new().with_results_limit(2))
            .unwrap();
        let recorder = Recorder::new();
        query.subscribe(recorder.clone()).request(Demand::unlimited());

        assert_terminated_once(&recorder);
        let failed = space.lock().has_decided_affirmatively();
        assert_eq!(recorder.failure().is_some(), failed);
        let count = recorder.items().len();
        assert!(count <= 5 && (failed || count == 5));
    });
    // A fault on page one, two or three, or none.
    assert_eq!(runs, 4);
}

#[test]
fn single_result_paths() {
    let (space, test_db) = faulty_db();
    let runs = explore(&space, || {
        let recorder = Recorder::new();
        let _subscription = test_db
            .save_at_background_priority(note(1))
            .subscribe(recorder.clone());
        assert_terminated_once(&recorder);
    });
    // Item fault, or no item fault followed by a service fault or none.
    assert_eq!(runs, 3);

    let runs = explore(&space, || {
        let recorder = Recorder::new();
        let _subscription = test_db.fetch_all::<Record>().subscribe(recorder.clone());
        assert_terminated_once(&recorder);
    });
    assert_eq!(runs, 2);
}
