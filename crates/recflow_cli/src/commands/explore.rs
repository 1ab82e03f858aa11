//! Explore command: drives a batch save through every injected failure path.

use parking_lot::Mutex;
use recflow_core::{Emission, OperationConfig, Publisher, Recorder};
use recflow_testkit::{explore, notes, DecisionSpace, MockCloud, TestDatabase};
use std::sync::Arc;
use tracing::{debug, info};

/// One explored path and how the save ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOutcome {
    /// Fault decisions taken, in order; `true` injected a failure.
    pub path: Vec<bool>,
    /// Records the mock holds afterwards.
    pub stored: usize,
    /// Terminal outcome of the stream.
    pub outcome: String,
}

/// Runs the explore command.
pub fn run(records: usize, atomic: bool) -> Result<(), Box<dyn std::error::Error>> {
    let outcomes = execute(records, atomic);
    info!(paths = outcomes.len(), "explored save of {records} records");

    for outcome in &outcomes {
        println!(
            "{:<width$}  stored={}  {}",
            render_path(&outcome.path),
            outcome.stored,
            outcome.outcome,
            width = records + 1,
        );
    }
    println!();
    println!("Paths: {}", outcomes.len());

    Ok(())
}

/// Saves `records` notes once per failure path and records each outcome.
pub fn execute(records: usize, atomic: bool) -> Vec<PathOutcome> {
    let space = Arc::new(Mutex::new(DecisionSpace::new()));
    let saves = notes(records);
    let config = OperationConfig::new().with_atomic(atomic);
    let mut outcomes = Vec::new();

    explore(&space, || {
        let test_db = TestDatabase::inline(MockCloud::with_faults(Arc::clone(&space)));
        let recorder = Recorder::new();
        let _subscription = test_db
            .save(saves.clone(), &config)
            .subscribe(recorder.clone());

        let item_errors = recorder.item_errors().len();
        let outcome = match recorder.emissions().last() {
            Some(Emission::BatchComplete) if item_errors > 0 => {
                format!("complete with {item_errors} item error(s)")
            }
            Some(Emission::BatchComplete) => "complete".to_string(),
            Some(Emission::BatchFailed(error)) => format!("failed: {error}"),
            _ => "no terminal emission".to_string(),
        };

        let path = space.lock().path().to_vec();
        debug!(?path, %outcome, "path explored");
        outcomes.push(PathOutcome {
            path,
            stored: test_db.cloud.record_count(),
            outcome,
        });
    });

    outcomes
}

fn render_path(path: &[bool]) -> String {
    path.iter().map(|&fail| if fail { 'X' } else { '.' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_records_have_eight_paths() {
        let outcomes = execute(2, false);
        assert_eq!(outcomes.len(), 8);
        assert_eq!(outcomes[0].path, vec![false, false, false]);
        assert_eq!(outcomes[0].outcome, "complete");
        assert_eq!(outcomes[0].stored, 2);
    }

    #[test]
    fn atomic_failures_store_nothing() {
        for outcome in execute(2, true) {
            if outcome.path.contains(&true) {
                assert!(outcome.outcome.starts_with("failed"), "{outcome:?}");
                assert_eq!(outcome.stored, 0);
            } else {
                assert_eq!(outcome.stored, 2);
            }
        }
    }

    #[test]
    fn renders_faults() {
        assert_eq!(render_path(&[false, true, false]), ".X.");
    }
}
